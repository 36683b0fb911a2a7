//! # Tuning Module
//!
//! Immutable value types describing how an instrument is tuned.
//!
//! ## Features
//! - `GuitarString`: a single open-string root note
//! - `Tuning`: an ordered set of strings for one instrument, optionally named
//!   and categorised
//! - `TuningEntry`: either a fixed instrument tuning or the chromatic mode
//! - Built-in preset catalogue (guitar, bass, ukulele)
//!
//! ## Equality
//! Two tunings are equal when they share the instrument and the ordered root
//! notes. Name and category are labels only, so "Standard" and an unnamed
//! `E4 B3 G3 D3 A2 E2` guitar tuning are the same entry in any collection.
//! Use [`Tuning::is_identical`] to compare labels too.
//!
//! String 0 is the highest-pitched string, matching the order strings are
//! listed in a tuning name ("E4 B3 G3 D3 A2 E2").

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Result, TunerError};
use crate::notes;

/// The kind of instrument a tuning is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Instrument {
    #[default]
    Guitar,
    Bass,
    Ukulele,
    Other,
}

impl Instrument {
    /// General MIDI program (0-based) used when playing reference notes.
    pub fn midi_program(self) -> u8 {
        match self {
            Instrument::Guitar => 25, // Acoustic Guitar (steel)
            Instrument::Bass => 33,   // Electric Bass (finger)
            Instrument::Ukulele | Instrument::Other => 24, // Acoustic Guitar (nylon)
        }
    }
}

/// Grouping used when presenting presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Common,
    Power,
    Open,
    Misc,
}

/// A single string, identified by the note index of its open (root) pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuitarString {
    root: i32,
}

impl GuitarString {
    pub fn new(root: i32) -> Self {
        Self { root }
    }

    pub fn root(self) -> i32 {
        self.root
    }

    /// The same string tuned one semitone up. Bounds are the caller's concern.
    pub fn higher(self) -> Self {
        Self::new(self.root + 1)
    }

    /// The same string tuned one semitone down. Bounds are the caller's concern.
    pub fn lower(self) -> Self {
        Self::new(self.root - 1)
    }

    /// Root frequency in Hz.
    pub fn frequency(self) -> f64 {
        notes::pitch_of(self.root)
    }
}

impl fmt::Display for GuitarString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&notes::symbol_of(self.root))
    }
}

/// An ordered, non-empty set of strings for one instrument.
#[derive(Debug, Clone)]
pub struct Tuning {
    strings: Vec<GuitarString>,
    instrument: Instrument,
    name: Option<String>,
    category: Option<Category>,
}

impl Tuning {
    /// Creates an unnamed, uncategorised tuning.
    ///
    /// Fails with [`TunerError::Validation`] if `strings` is empty.
    pub fn new(instrument: Instrument, strings: Vec<GuitarString>) -> Result<Self> {
        if strings.is_empty() {
            return Err(TunerError::validation("a tuning needs at least one string"));
        }
        Ok(Self {
            strings,
            instrument,
            name: None,
            category: None,
        })
    }

    /// Builds a tuning from space-separated note symbols, e.g. `"E4 B3 G3 D3 A2 E2"`.
    ///
    /// Fails with [`TunerError::Format`] if any symbol is malformed or lies
    /// outside the supported note range, or if there are no symbols at all.
    pub fn parse(
        name: Option<&str>,
        instrument: Instrument,
        category: Option<Category>,
        strings: &str,
    ) -> Result<Self> {
        let strings = strings
            .split_whitespace()
            .map(|symbol| {
                let root = notes::index_of_symbol(symbol)?;
                if !notes::in_range(root) {
                    return Err(TunerError::format(format!(
                        "note '{}' is outside the supported range",
                        symbol
                    )));
                }
                Ok(GuitarString::new(root))
            })
            .collect::<Result<Vec<_>>>()?;

        if strings.is_empty() {
            return Err(TunerError::format("tuning has no strings"));
        }

        Ok(Self {
            strings,
            instrument,
            name: name.map(str::to_owned),
            category,
        })
    }

    /// Returns a copy carrying `name`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns an unnamed, uncategorised copy with the same strings.
    pub fn without_label(&self) -> Self {
        Self {
            strings: self.strings.clone(),
            instrument: self.instrument,
            name: None,
            category: None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn strings(&self) -> &[GuitarString] {
        &self.strings
    }

    pub fn num_strings(&self) -> usize {
        self.strings.len()
    }

    /// The string at position `index`.
    pub fn string(&self, index: usize) -> Result<GuitarString> {
        self.strings.get(index).copied().ok_or_else(|| {
            TunerError::validation(format!(
                "string index {} out of range for {} strings",
                index,
                self.strings.len()
            ))
        })
    }

    pub fn lowest_root(&self) -> i32 {
        self.strings.iter().map(|s| s.root).min().unwrap_or(0)
    }

    pub fn highest_root(&self) -> i32 {
        self.strings.iter().map(|s| s.root).max().unwrap_or(0)
    }

    /// Every string one semitone up. Bounds are the caller's concern.
    ///
    /// The result is unlabelled: a preset name no longer describes it.
    pub fn higher(&self) -> Self {
        self.map_strings(GuitarString::higher)
    }

    /// Every string one semitone down. Bounds are the caller's concern.
    pub fn lower(&self) -> Self {
        self.map_strings(GuitarString::lower)
    }

    /// An unlabelled copy with the string at `index` replaced.
    pub fn with_string(&self, index: usize, string: GuitarString) -> Result<Self> {
        self.string(index)?;
        let mut strings = self.strings.clone();
        strings[index] = string;
        Ok(Self {
            strings,
            instrument: self.instrument,
            name: None,
            category: None,
        })
    }

    /// Compares labels as well as strings.
    pub fn is_identical(&self, other: &Tuning) -> bool {
        self == other && self.name == other.name && self.category == other.category
    }

    /// Space-separated root symbols, highest string first.
    pub fn symbols(&self) -> String {
        self.strings
            .iter()
            .map(|s| notes::symbol_of(s.root))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn map_strings(&self, f: impl Fn(GuitarString) -> GuitarString) -> Self {
        Self {
            strings: self.strings.iter().copied().map(f).collect(),
            instrument: self.instrument,
            name: None,
            category: None,
        }
    }
}

impl PartialEq for Tuning {
    fn eq(&self, other: &Self) -> bool {
        self.instrument == other.instrument && self.strings == other.strings
    }
}

impl Eq for Tuning {}

impl Hash for Tuning {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.instrument.hash(state);
        self.strings.hash(state);
    }
}

impl fmt::Display for Tuning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.symbols()),
            None => f.write_str(&self.symbols()),
        }
    }
}

/// One selectable item in a tuning collection.
///
/// `Chromatic` is a singleton that never equals any instrument tuning.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TuningEntry {
    Instrument(Tuning),
    Chromatic,
}

impl TuningEntry {
    pub fn tuning(&self) -> Option<&Tuning> {
        match self {
            TuningEntry::Instrument(tuning) => Some(tuning),
            TuningEntry::Chromatic => None,
        }
    }

    pub fn is_chromatic(&self) -> bool {
        matches!(self, TuningEntry::Chromatic)
    }

    pub fn name(&self) -> Option<&str> {
        self.tuning().and_then(Tuning::name)
    }

    /// Structural equality plus equal labels.
    pub fn is_identical(&self, other: &TuningEntry) -> bool {
        match (self, other) {
            (TuningEntry::Instrument(a), TuningEntry::Instrument(b)) => a.is_identical(b),
            (TuningEntry::Chromatic, TuningEntry::Chromatic) => true,
            _ => false,
        }
    }
}

impl From<Tuning> for TuningEntry {
    fn from(tuning: Tuning) -> Self {
        TuningEntry::Instrument(tuning)
    }
}

impl fmt::Display for TuningEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TuningEntry::Instrument(tuning) => tuning.fmt(f),
            TuningEntry::Chromatic => f.write_str("Chromatic"),
        }
    }
}

/// Built-in presets, computed once on first use.
///
/// The first entry is the standard guitar tuning.
static PRESETS: Lazy<Vec<Tuning>> = Lazy::new(|| {
    use Category::*;
    use Instrument::*;

    const TABLE: &[(&str, Instrument, Category, &str)] = &[
        ("Standard", Guitar, Common, "E4 B3 G3 D3 A2 E2"),
        ("Drop D", Guitar, Common, "E4 B3 G3 D3 A2 D2"),
        ("Half Step Down", Guitar, Common, "D#4 A#3 F#3 C#3 G#2 D#2"),
        ("Full Step Down", Guitar, Common, "D4 A3 F3 C3 G2 D2"),
        ("Drop C", Guitar, Common, "D4 A3 F3 C3 G2 C2"),
        ("Power C", Guitar, Power, "C4 C4 G3 C3 G2 C2"),
        ("Open G", Guitar, Open, "D4 B3 G3 D3 G2 D2"),
        ("Open D", Guitar, Open, "D4 A3 F#3 D3 A2 D2"),
        ("Open E", Guitar, Open, "E4 B3 G#3 E3 B2 E2"),
        ("Open C", Guitar, Open, "E4 C4 G3 C3 G2 C2"),
        ("DADGAD", Guitar, Misc, "D4 A3 G3 D3 A2 D2"),
        ("Bass Standard", Bass, Common, "G2 D2 A1 E1"),
        ("Bass 5-String", Bass, Common, "G2 D2 A1 E1 B0"),
        ("Bass Drop D", Bass, Common, "G2 D2 A1 D1"),
        ("Ukulele Standard", Ukulele, Common, "A4 E4 C4 G4"),
        ("Ukulele Baritone", Ukulele, Common, "E4 B3 G3 D3"),
    ];

    TABLE
        .iter()
        .map(|(name, instrument, category, strings)| {
            // The table above is fixed data covered by the preset tests.
            Tuning::parse(Some(name), *instrument, Some(*category), strings)
                .expect("built-in preset must parse")
        })
        .collect()
});

/// All built-in presets.
pub fn presets() -> &'static [Tuning] {
    &PRESETS
}

/// Standard six-string guitar tuning, E4 B3 G3 D3 A2 E2.
pub fn standard() -> Tuning {
    PRESETS[0].clone()
}

/// Finds a built-in preset by name, ignoring case.
pub fn find_preset(name: &str) -> Option<&'static Tuning> {
    PRESETS
        .iter()
        .find(|t| t.name().is_some_and(|n| n.eq_ignore_ascii_case(name)))
}
