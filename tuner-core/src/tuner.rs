//! # Tuner Module
//!
//! The real-time tuner state machine.
//!
//! A [`Tuner`] is either in **instrument mode** (a fixed [`Tuning`] whose
//! strings are the targets) or in **chromatic mode** (any note in
//! `[LOWEST_NOTE, HIGHEST_NOTE]` is a target). Pitch samples arrive through
//! [`Tuner::process_pitch`]; every other method is an explicit user command.
//!
//! ## State
//! Each piece of state is a separate [`Observable`], so a UI thread can read
//! or watch it through a [`TunerView`] while the owning thread keeps writing.
//! All mutators take `&mut self`: commands must be funnelled to the one
//! thread that owns the `Tuner` (see [`crate::engine`]).
//!
//! ## Errors vs. no-ops
//! - Bad string indices, bad notes and commands issued in the wrong mode
//!   return [`TunerError::Validation`].
//! - Shifting past the lowest or highest note returns `Ok(false)` and changes
//!   nothing; holding "tune up" at the top of the range is normal use.

use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::TunerConfig;
use crate::error::{Result, TunerError};
use crate::notes::{self, HIGHEST_NOTE, LOWEST_NOTE};
use crate::observable::{Observable, ObservableReader};
use crate::tuning::{Tuning, TuningEntry, standard};

/// One estimate from the pitch detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchSample {
    /// Detected frequency in Hz.
    pub frequency: f64,
    /// False when the detector heard silence or noise.
    pub is_pitched: bool,
}

impl PitchSample {
    pub fn pitched(frequency: f64) -> Self {
        Self {
            frequency,
            is_pitched: true,
        }
    }

    pub fn silence() -> Self {
        Self {
            frequency: 0.0,
            is_pitched: false,
        }
    }
}

/// Which kind of targets the tuner is comparing against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerMode {
    Instrument,
    Chromatic,
}

pub struct Tuner {
    in_tune_tolerance: f64,
    entry: Observable<TuningEntry>,
    selected_string: Observable<usize>,
    selected_note: Observable<i32>,
    tuned: Observable<Vec<bool>>,
    auto_detect: Observable<bool>,
    note_offset: Observable<Option<f64>>,
    in_tune: Observable<bool>,
}

impl Tuner {
    /// Creates a tuner in instrument mode on standard guitar tuning.
    pub fn new(config: &TunerConfig) -> Self {
        let tuning = standard();
        let num_strings = tuning.num_strings();
        Self {
            in_tune_tolerance: config.in_tune_tolerance,
            entry: Observable::new(TuningEntry::Instrument(tuning)),
            selected_string: Observable::new(0),
            selected_note: Observable::new(0),
            tuned: Observable::new(vec![false; num_strings]),
            auto_detect: Observable::new(config.auto_detect),
            note_offset: Observable::new(None),
            in_tune: Observable::new(false),
        }
    }

    /// A read-only handle for other threads.
    pub fn view(&self) -> TunerView {
        TunerView {
            entry: self.entry.reader(),
            selected_string: self.selected_string.reader(),
            selected_note: self.selected_note.reader(),
            tuned: self.tuned.reader(),
            auto_detect: self.auto_detect.reader(),
            note_offset: self.note_offset.reader(),
            in_tune: self.in_tune.reader(),
        }
    }

    pub fn mode(&self) -> TunerMode {
        mode_of(&self.entry.get())
    }

    pub fn entry(&self) -> Arc<TuningEntry> {
        self.entry.get()
    }

    pub fn selected_string(&self) -> usize {
        self.selected_string.value()
    }

    pub fn selected_note(&self) -> i32 {
        self.selected_note.value()
    }

    pub fn tuned(&self) -> Arc<Vec<bool>> {
        self.tuned.get()
    }

    pub fn auto_detect(&self) -> bool {
        self.auto_detect.value()
    }

    pub fn note_offset(&self) -> Option<f64> {
        self.note_offset.value()
    }

    pub fn in_tune(&self) -> bool {
        self.in_tune.value()
    }

    /// Targets string `index` and turns auto-detect off.
    pub fn select_string(&mut self, index: usize) -> Result<()> {
        let tuning = self.require_tuning("select_string")?;
        tuning.string(index)?;
        self.selected_string.set_if_changed(index);
        self.auto_detect.set_if_changed(false);
        Ok(())
    }

    /// Targets note `index` in chromatic mode.
    pub fn select_note(&mut self, index: i32) -> Result<()> {
        if self.mode() != TunerMode::Chromatic {
            return Err(TunerError::validation("select_note requires chromatic mode"));
        }
        if !notes::in_range(index) {
            return Err(TunerError::validation(format!(
                "note {} outside [{}, {}]",
                index, LOWEST_NOTE, HIGHEST_NOTE
            )));
        }
        self.selected_note.set_if_changed(index);
        Ok(())
    }

    pub fn set_auto_detect(&mut self, enabled: bool) {
        self.auto_detect.set_if_changed(enabled);
    }

    /// Switches to instrument mode on `tuning`.
    ///
    /// A string keeps its "tuned" flag only if its root note at the same
    /// position is unchanged; every other flag is reset.
    pub fn set_tuning(&mut self, tuning: Tuning) {
        let previous = self.entry.get();
        if let TuningEntry::Instrument(old) = &*previous {
            if old.is_identical(&tuning) {
                return;
            }
        }

        let old_tuned = self.tuned.get();
        let tuned: Vec<bool> = tuning
            .strings()
            .iter()
            .enumerate()
            .map(|(i, string)| {
                let unchanged = previous
                    .tuning()
                    .and_then(|old| old.strings().get(i))
                    .is_some_and(|old_string| old_string == string);
                unchanged && old_tuned.get(i).copied().unwrap_or(false)
            })
            .collect();

        let last = tuning.num_strings() - 1;
        debug!("Tuner switched to {}", tuning);
        self.entry.set(TuningEntry::Instrument(tuning));
        self.tuned.set(tuned);
        // Only meaningful in chromatic mode.
        self.in_tune.set_if_changed(false);
        if self.selected_string.value() > last {
            self.selected_string.set(last);
        }
    }

    /// Switches to chromatic mode and clears the string selection and flags.
    pub fn set_chromatic(&mut self) {
        if self.mode() == TunerMode::Chromatic {
            return;
        }
        debug!("Tuner switched to chromatic mode");
        self.entry.set(TuningEntry::Chromatic);
        self.tuned.set(Vec::new());
        self.selected_string.set_if_changed(0);
        self.selected_note.set_if_changed(0);
        self.note_offset.set_if_changed(None);
        self.in_tune.set_if_changed(false);
    }

    /// Applies either kind of entry.
    pub fn set_entry(&mut self, entry: TuningEntry) {
        match entry {
            TuningEntry::Instrument(tuning) => self.set_tuning(tuning),
            TuningEntry::Chromatic => self.set_chromatic(),
        }
    }

    /// Shifts every string up a semitone. `Ok(false)` at the top of the range.
    pub fn tune_up(&mut self) -> Result<bool> {
        self.shift_all(1)
    }

    /// Shifts every string down a semitone. `Ok(false)` at the bottom of the range.
    pub fn tune_down(&mut self) -> Result<bool> {
        self.shift_all(-1)
    }

    pub fn tune_string_up(&mut self, index: usize) -> Result<bool> {
        self.shift_string(index, 1)
    }

    pub fn tune_string_down(&mut self, index: usize) -> Result<bool> {
        self.shift_string(index, -1)
    }

    /// Sets the "tuned" flag of string `index`.
    pub fn set_tuned(&mut self, index: usize, value: bool) -> Result<()> {
        let tuning = self.require_tuning("set_tuned")?;
        tuning.string(index)?;
        let mut tuned = self.tuned.get().as_ref().clone();
        if tuned[index] != value {
            tuned[index] = value;
            self.tuned.set(tuned);
        }
        Ok(())
    }

    /// Marks the currently selected string as tuned.
    pub fn mark_selected_tuned(&mut self) -> Result<()> {
        self.set_tuned(self.selected_string.value(), true)
    }

    /// Feeds one pitch estimate into the tuner.
    ///
    /// Unpitched samples clear the offset. Pitched samples optionally move
    /// the selection to the nearest target (auto-detect; ties go to the lower
    /// index) and publish `detected - target` in semitones, positive when
    /// sharp. In chromatic mode the "in tune" flag is refreshed as well.
    pub fn process_pitch(&mut self, sample: PitchSample) {
        if !sample.is_pitched || !(sample.frequency.is_finite() && sample.frequency > 0.0) {
            self.note_offset.set_if_changed(None);
            self.in_tune.set_if_changed(false);
            return;
        }

        let position = notes::offset_from_a4(sample.frequency);
        let auto_detect = self.auto_detect.value();
        let entry = self.entry.get();

        let offset = match &*entry {
            TuningEntry::Instrument(tuning) => {
                let selected = if auto_detect {
                    let nearest = nearest_string(tuning, position);
                    self.selected_string.set_if_changed(nearest);
                    nearest
                } else {
                    self.selected_string.value()
                };
                // selected_string is kept within the string count by every mutator.
                position - tuning.strings()[selected].root() as f64
            }
            TuningEntry::Chromatic => {
                let selected = if auto_detect {
                    let nearest = nearest_note(position);
                    self.selected_note.set_if_changed(nearest);
                    nearest
                } else {
                    self.selected_note.value()
                };
                let offset = position - selected as f64;
                self.in_tune
                    .set_if_changed(offset.abs() <= self.in_tune_tolerance);
                offset
            }
        };

        trace!(frequency = sample.frequency, offset, "pitch processed");
        self.note_offset.set(Some(offset));
    }

    /// Subscribes to changes of the active entry.
    pub fn entry_changes(&self) -> crossbeam_channel::Receiver<Arc<TuningEntry>> {
        self.entry.subscribe()
    }

    fn require_tuning(&self, operation: &str) -> Result<Tuning> {
        match &*self.entry.get() {
            TuningEntry::Instrument(tuning) => Ok(tuning.clone()),
            TuningEntry::Chromatic => Err(TunerError::validation(format!(
                "{} requires instrument mode",
                operation
            ))),
        }
    }

    fn shift_all(&mut self, delta: i32) -> Result<bool> {
        let tuning = self.require_tuning("tune_up/tune_down")?;
        if !notes::in_range(tuning.lowest_root() + delta)
            || !notes::in_range(tuning.highest_root() + delta)
        {
            debug!("Shift by {} would leave the note range, ignored", delta);
            return Ok(false);
        }
        let shifted = if delta > 0 { tuning.higher() } else { tuning.lower() };
        let num_strings = shifted.num_strings();
        self.entry.set(TuningEntry::Instrument(shifted));
        self.tuned.set(vec![false; num_strings]);
        Ok(true)
    }

    fn shift_string(&mut self, index: usize, delta: i32) -> Result<bool> {
        let tuning = self.require_tuning("tune_string_up/tune_string_down")?;
        let string = tuning.string(index)?;
        if !notes::in_range(string.root() + delta) {
            return Ok(false);
        }
        let shifted = if delta > 0 { string.higher() } else { string.lower() };
        let updated = tuning.with_string(index, shifted)?;
        let mut tuned = self.tuned.get().as_ref().clone();
        tuned[index] = false;
        self.entry.set(TuningEntry::Instrument(updated));
        self.tuned.set(tuned);
        Ok(true)
    }
}

fn mode_of(entry: &TuningEntry) -> TunerMode {
    match entry {
        TuningEntry::Instrument(_) => TunerMode::Instrument,
        TuningEntry::Chromatic => TunerMode::Chromatic,
    }
}

/// Index of the string whose root is closest to `position`; the first wins ties.
fn nearest_string(tuning: &Tuning, position: f64) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, string) in tuning.strings().iter().enumerate() {
        let distance = (string.root() as f64 - position).abs();
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

/// Nearest note in range; exact half-semitone positions go to the lower note.
fn nearest_note(position: f64) -> i32 {
    let rounded = (position - 0.5).ceil();
    rounded.clamp(LOWEST_NOTE as f64, HIGHEST_NOTE as f64) as i32
}

/// Read-only, thread-safe view of a [`Tuner`]'s state.
#[derive(Clone)]
pub struct TunerView {
    entry: ObservableReader<TuningEntry>,
    selected_string: ObservableReader<usize>,
    selected_note: ObservableReader<i32>,
    tuned: ObservableReader<Vec<bool>>,
    auto_detect: ObservableReader<bool>,
    note_offset: ObservableReader<Option<f64>>,
    in_tune: ObservableReader<bool>,
}

impl TunerView {
    pub fn mode(&self) -> TunerMode {
        mode_of(&self.entry.get())
    }

    pub fn entry(&self) -> Arc<TuningEntry> {
        self.entry.get()
    }

    pub fn selected_string(&self) -> usize {
        self.selected_string.value()
    }

    pub fn selected_note(&self) -> i32 {
        self.selected_note.value()
    }

    pub fn tuned(&self) -> Arc<Vec<bool>> {
        self.tuned.get()
    }

    pub fn auto_detect(&self) -> bool {
        self.auto_detect.value()
    }

    pub fn note_offset(&self) -> Option<f64> {
        self.note_offset.value()
    }

    pub fn in_tune(&self) -> bool {
        self.in_tune.value()
    }

    pub fn offset_changes(&self) -> crossbeam_channel::Receiver<Arc<Option<f64>>> {
        self.note_offset.subscribe()
    }

    pub fn entry_changes(&self) -> crossbeam_channel::Receiver<Arc<TuningEntry>> {
        self.entry.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::{GuitarString, Instrument, find_preset};

    fn tuner() -> Tuner {
        Tuner::new(&TunerConfig::default())
    }

    fn all_tuned(tuner: &mut Tuner) {
        for i in 0..tuner.tuned().len() {
            tuner.set_tuned(i, true).unwrap();
        }
    }

    #[test]
    fn test_initial_state() {
        let tuner = tuner();
        assert_eq!(tuner.mode(), TunerMode::Instrument);
        assert_eq!(*tuner.entry(), TuningEntry::Instrument(standard()));
        assert_eq!(*tuner.tuned(), vec![false; 6]);
        assert!(tuner.auto_detect());
        assert_eq!(tuner.note_offset(), None);
    }

    #[test]
    fn test_select_string() {
        let mut tuner = tuner();
        tuner.select_string(3).unwrap();
        assert_eq!(tuner.selected_string(), 3);
        assert!(!tuner.auto_detect());
        assert!(matches!(tuner.select_string(6), Err(TunerError::Validation(_))));
        assert_eq!(tuner.selected_string(), 3);
    }

    #[test]
    fn test_select_note_requires_chromatic_mode_and_range() {
        let mut tuner = tuner();
        assert!(matches!(tuner.select_note(0), Err(TunerError::Validation(_))));
        tuner.set_chromatic();
        tuner.select_note(-29).unwrap();
        assert_eq!(tuner.selected_note(), -29);
        assert!(tuner.select_note(HIGHEST_NOTE + 1).is_err());
        assert!(tuner.select_note(LOWEST_NOTE - 1).is_err());
        assert!(matches!(tuner.select_string(0), Err(TunerError::Validation(_))));
    }

    #[test]
    fn test_set_tuning_keeps_only_unchanged_flags() {
        let mut tuner = tuner();
        all_tuned(&mut tuner);
        tuner.set_tuning(find_preset("Drop D").unwrap().clone());
        assert_eq!(*tuner.tuned(), vec![true, true, true, true, true, false]);
    }

    #[test]
    fn test_set_tuning_resizes_flags_and_clamps_selection() {
        let mut tuner = tuner();
        all_tuned(&mut tuner);
        tuner.select_string(5).unwrap();
        let bass = find_preset("Bass Standard").unwrap().clone();
        tuner.set_tuning(bass);
        assert_eq!(*tuner.tuned(), vec![false; 4]);
        assert_eq!(tuner.selected_string(), 3);
    }

    #[test]
    fn test_set_chromatic_clears_string_state() {
        let mut tuner = tuner();
        all_tuned(&mut tuner);
        tuner.set_chromatic();
        assert_eq!(tuner.mode(), TunerMode::Chromatic);
        assert!(tuner.tuned().is_empty());
        assert!(tuner.set_tuned(0, true).is_err());
        assert!(tuner.tune_up().is_err());

        tuner.set_tuning(standard());
        assert_eq!(*tuner.tuned(), vec![false; 6]);
    }

    #[test]
    fn test_leaving_chromatic_mode_clears_in_tune() {
        let mut tuner = tuner();
        tuner.set_chromatic();
        tuner.process_pitch(PitchSample::pitched(440.0));
        assert!(tuner.in_tune());

        tuner.set_tuning(standard());
        assert!(!tuner.in_tune());
        assert!(!tuner.view().in_tune());
    }

    #[test]
    fn test_tune_up_and_down_reset_flags() {
        let mut tuner = tuner();
        all_tuned(&mut tuner);
        assert_eq!(tuner.tune_up(), Ok(true));
        assert_eq!(tuner.entry().tuning().unwrap().symbols(), "F4 C4 G#3 D#3 A#2 F2");
        assert_eq!(*tuner.tuned(), vec![false; 6]);
        assert_eq!(tuner.tune_down(), Ok(true));
        assert_eq!(*tuner.entry(), TuningEntry::Instrument(standard()));
    }

    #[test]
    fn test_tune_up_stops_at_highest_note() {
        let mut tuner = tuner();
        let top = Tuning::new(
            Instrument::Other,
            vec![GuitarString::new(HIGHEST_NOTE - 1), GuitarString::new(HIGHEST_NOTE - 5)],
        )
        .unwrap();
        tuner.set_tuning(top);
        assert_eq!(tuner.tune_up(), Ok(true));
        assert_eq!(tuner.entry().tuning().unwrap().highest_root(), HIGHEST_NOTE);
        let before = tuner.entry();
        assert_eq!(tuner.tune_up(), Ok(false));
        assert_eq!(tuner.entry(), before);
    }

    #[test]
    fn test_tune_down_stops_at_lowest_note() {
        let mut tuner = tuner();
        let bottom = Tuning::new(
            Instrument::Other,
            vec![GuitarString::new(LOWEST_NOTE + 7), GuitarString::new(LOWEST_NOTE + 1)],
        )
        .unwrap();
        tuner.set_tuning(bottom);
        all_tuned(&mut tuner);
        assert_eq!(tuner.tune_down(), Ok(true));
        assert_eq!(tuner.tune_down(), Ok(false));
        assert_eq!(tuner.entry().tuning().unwrap().lowest_root(), LOWEST_NOTE);
    }

    #[test]
    fn test_tune_single_string() {
        let mut tuner = tuner();
        all_tuned(&mut tuner);
        assert_eq!(tuner.tune_string_down(5), Ok(true));
        assert_eq!(tuner.tune_string_down(5), Ok(true));
        assert_eq!(tuner.entry().tuning().unwrap(), find_preset("Drop D").unwrap());
        assert_eq!(*tuner.tuned(), vec![true, true, true, true, true, false]);
        assert!(matches!(tuner.tune_string_up(6), Err(TunerError::Validation(_))));
    }

    #[test]
    fn test_tune_single_string_at_boundary() {
        let mut tuner = tuner();
        let tuning = Tuning::new(
            Instrument::Other,
            vec![GuitarString::new(HIGHEST_NOTE), GuitarString::new(0)],
        )
        .unwrap();
        tuner.set_tuning(tuning.clone());
        assert_eq!(tuner.tune_string_up(0), Ok(false));
        assert_eq!(tuner.tune_string_up(1), Ok(true));
        assert_eq!(tuner.entry().tuning().unwrap().string(0).unwrap().root(), HIGHEST_NOTE);
    }

    #[test]
    fn test_auto_detect_moves_selection() {
        let mut tuner = tuner();
        tuner.select_string(5).unwrap();
        tuner.set_auto_detect(true);
        tuner.process_pitch(PitchSample::pitched(440.0));
        assert_eq!(tuner.selected_string(), 0);
        assert_eq!(tuner.note_offset(), Some(5.0));
    }

    #[test]
    fn test_manual_selection_is_kept() {
        let mut tuner = tuner();
        tuner.select_string(0).unwrap();
        tuner.process_pitch(PitchSample::pitched(246.94));
        assert_eq!(tuner.selected_string(), 0);
        let offset = tuner.note_offset().unwrap();
        assert!((offset + 5.0).abs() < 0.01, "offset {}", offset);
    }

    #[test]
    fn test_auto_detect_tie_prefers_lower_index() {
        let mut tuner = tuner();
        let tuning = Tuning::new(
            Instrument::Other,
            vec![GuitarString::new(2), GuitarString::new(-2)],
        )
        .unwrap();
        tuner.set_tuning(tuning);
        tuner.select_string(1).unwrap();
        tuner.set_auto_detect(true);
        tuner.process_pitch(PitchSample::pitched(440.0));
        assert_eq!(tuner.selected_string(), 0);
        assert_eq!(tuner.note_offset(), Some(-2.0));
    }

    #[test]
    fn test_unpitched_sample_clears_offset() {
        let mut tuner = tuner();
        tuner.select_string(2).unwrap();
        tuner.process_pitch(PitchSample::pitched(200.0));
        assert!(tuner.note_offset().is_some());
        tuner.process_pitch(PitchSample::silence());
        assert_eq!(tuner.note_offset(), None);
        assert_eq!(tuner.selected_string(), 2);
    }

    #[test]
    fn test_chromatic_auto_detect_and_in_tune() {
        let mut tuner = tuner();
        tuner.set_chromatic();
        tuner.process_pitch(PitchSample::pitched(notes::pitch_of(-29)));
        assert_eq!(tuner.selected_note(), -29);
        assert!(tuner.note_offset().unwrap().abs() < 1e-9);
        assert!(tuner.in_tune());

        let sharp = notes::pitch_of(-29) * 2.0_f64.powf(0.2 / 12.0);
        tuner.process_pitch(PitchSample::pitched(sharp));
        assert_eq!(tuner.selected_note(), -29);
        assert!((tuner.note_offset().unwrap() - 0.2).abs() < 1e-9);
        assert!(!tuner.in_tune());
    }

    #[test]
    fn test_chromatic_manual_note() {
        let mut tuner = tuner();
        tuner.set_chromatic();
        tuner.set_auto_detect(false);
        tuner.select_note(0).unwrap();
        tuner.process_pitch(PitchSample::pitched(notes::pitch_of(-12)));
        assert_eq!(tuner.selected_note(), 0);
        assert!((tuner.note_offset().unwrap() + 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_chromatic_auto_detect_clamps_to_range() {
        let mut tuner = tuner();
        tuner.set_chromatic();
        tuner.process_pitch(PitchSample::pitched(10.0));
        assert_eq!(tuner.selected_note(), LOWEST_NOTE);
        assert!(tuner.note_offset().unwrap() < 0.0);
    }

    #[test]
    fn test_nearest_note_tie_goes_lower() {
        assert_eq!(nearest_note(0.5), 0);
        assert_eq!(nearest_note(-0.5), -1);
        assert_eq!(nearest_note(0.51), 1);
        assert_eq!(nearest_note(-0.49), 0);
    }

    #[test]
    fn test_view_reflects_writes() {
        let mut tuner = tuner();
        let view = tuner.view();
        let changes = view.entry_changes();
        tuner.set_chromatic();
        assert_eq!(view.mode(), TunerMode::Chromatic);
        assert_eq!(changes.try_iter().count(), 1);
    }
}
