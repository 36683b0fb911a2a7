//! # Display Module
//!
//! Text rendering of the tuner state: a cent meter, per-string status and
//! the tuning collections.

use tuner_core::notes;
use tuner_core::tuning::presets;
use tuner_core::{TunerMode, TunerView, TuningEntry, TuningListView};

/// The meter shows deviations from -50 to +50 cents.
const METER_RANGE: f64 = 50.0;

/// Characters between the meter's end caps; odd so there is a centre cell.
const METER_WIDTH: usize = 41;

pub const HELP: &str = "\
Commands:
  pitch <hz> | silence        feed a pitch estimate
  string <i> | note <sym>     select a target (string i / chromatic note)
  auto on|off                 toggle auto-detect
  tuning <name | symbols>     switch tuning (preset, custom name or e.g. 'D4 A3 F3 C3 G2 D2')
  chromatic                   chromatic mode
  up | down [i]               shift all strings, or string i, by a semitone
  tuned [i] | untuned <i>     mark a string
  fav | unfav                 (un)favourite the current tuning
  custom <name>               save the current tuning under a name
  uncustom <name>             delete a custom tuning
  play <i>                    play string i's reference note
  presets | list | status     show presets / collections / tuner state
  quit";

/// A needle on a -50..+50 cent scale, e.g. `[--------------------|---*----------------]`.
pub fn cent_meter(offset_semitones: Option<f64>) -> String {
    let mut cells = vec!['-'; METER_WIDTH];
    cells[METER_WIDTH / 2] = '|';
    if let Some(offset) = offset_semitones {
        let cents = notes::cents(offset).clamp(-METER_RANGE, METER_RANGE);
        let position = ((cents + METER_RANGE) / (2.0 * METER_RANGE) * (METER_WIDTH - 1) as f64)
            .round() as usize;
        cells[position] = '*';
    }
    format!("[{}]", cells.into_iter().collect::<String>())
}

/// Accuracy zones: within 5 cents, within 20 cents, further off.
pub fn accuracy_label(offset_semitones: f64) -> &'static str {
    let cents = notes::cents(offset_semitones).abs();
    if cents < 5.0 {
        "in tune"
    } else if cents < 20.0 {
        "close"
    } else if offset_semitones > 0.0 {
        "too high, tune down"
    } else {
        "too low, tune up"
    }
}

/// One line of guidance for the latest pitch estimate.
pub fn guidance(tuner: &TunerView) -> String {
    let Some(offset) = tuner.note_offset() else {
        return "no pitch".to_string();
    };
    let target = match tuner.mode() {
        TunerMode::Instrument => {
            let index = tuner.selected_string();
            let root = tuner
                .entry()
                .tuning()
                .and_then(|t| t.string(index).ok())
                .map(|s| notes::symbol_of(s.root()))
                .unwrap_or_default();
            format!("string {} ({})", index, root)
        }
        TunerMode::Chromatic => notes::symbol_of(tuner.selected_note()),
    };
    let label = if tuner.mode() == TunerMode::Chromatic && tuner.in_tune() {
        "in tune"
    } else {
        accuracy_label(offset)
    };
    format!(
        "{:<16} {:+7.1} cents {} {}",
        target,
        notes::cents(offset),
        cent_meter(Some(offset)),
        label
    )
}

/// Full tuner state, one string per line in instrument mode.
pub fn status(tuner: &TunerView, list: &TuningListView) -> String {
    let entry = tuner.entry();
    let mut out = format!(
        "Tuning: {}{}  auto-detect: {}\n",
        entry,
        if list.favourites().contains(&entry) { " *" } else { "" },
        if tuner.auto_detect() { "on" } else { "off" }
    );
    match entry.tuning() {
        Some(tuning) => {
            let tuned = tuner.tuned();
            for (i, string) in tuning.strings().iter().enumerate() {
                let marker = if i == tuner.selected_string() { '>' } else { ' ' };
                let done = if tuned.get(i).copied().unwrap_or(false) { "tuned" } else { "" };
                out.push_str(&format!(
                    "{} {} {:<4} {:>8.2} Hz  {}\n",
                    marker,
                    i,
                    notes::symbol_of(string.root()),
                    string.frequency(),
                    done
                ));
            }
        }
        None => {
            out.push_str(&format!("Target note: {}\n", notes::symbol_of(tuner.selected_note())));
        }
    }
    out.push_str(&guidance(tuner));
    out
}

pub fn collections(list: &TuningListView) -> String {
    let current = list.current();
    let mut out = String::from("Favourites:\n");
    for entry in list.favourites().iter() {
        out.push_str(&line(entry, &current));
    }
    out.push_str("Custom:\n");
    let custom = list.custom();
    if custom.is_empty() {
        out.push_str("  (none)\n");
    }
    for entry in custom.iter() {
        out.push_str(&line(entry, &current));
    }
    out
}

pub fn preset_list() -> String {
    presets()
        .iter()
        .map(|t| {
            let category = t.category().map(|c| format!("{:?}", c)).unwrap_or_default();
            format!(
                "  {:<18} {:<8} {:<7} {}\n",
                t.name().unwrap_or(""),
                format!("{:?}", t.instrument()),
                category,
                t.symbols()
            )
        })
        .collect()
}

fn line(entry: &TuningEntry, current: &TuningEntry) -> String {
    let marker = if entry == current { '>' } else { ' ' };
    format!("{} {}\n", marker, entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_needle_position() {
        assert_eq!(cent_meter(None).chars().filter(|&c| c == '*').count(), 0);
        let centred = cent_meter(Some(0.0));
        assert_eq!(centred.chars().nth(1 + METER_WIDTH / 2), Some('*'));
        let low = cent_meter(Some(-3.0));
        assert_eq!(low.chars().nth(1), Some('*'));
        let high = cent_meter(Some(3.0));
        assert_eq!(high.chars().nth(METER_WIDTH), Some('*'));
    }

    #[test]
    fn test_accuracy_labels() {
        assert_eq!(accuracy_label(0.01), "in tune");
        assert_eq!(accuracy_label(-0.1), "close");
        assert_eq!(accuracy_label(0.5), "too high, tune down");
        assert_eq!(accuracy_label(-5.0), "too low, tune up");
    }
}
