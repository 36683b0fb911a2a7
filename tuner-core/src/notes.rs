//! # Notes Module
//!
//! Pure pitch arithmetic on the 12-tone equal-tempered scale.
//!
//! Every note is identified by its **note index**: the signed number of
//! semitones from A4 (440 Hz). A4 is `0`, E2 is `-29`, C#5 is `4`.
//!
//! ## Features
//! - Note index to frequency and back
//! - Unrounded semitone offsets for sub-semitone display
//! - Sharp-only note symbols ("E2", "C#5") and a strict symbol parser

use crate::error::{Result, TunerError};

/// Reference pitch of A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;

/// Lowest note index the tuner accepts (A0).
pub const LOWEST_NOTE: i32 = -48;

/// Highest note index the tuner accepts (A8).
pub const HIGHEST_NOTE: i32 = 48;

/// MIDI note number of A4.
const A4_MIDI: i32 = 69;

/// Note names of one octave, starting at C since octave numbers change at C.
const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Semitones from C up to A within the same octave.
const C_TO_A: i32 = 9;

/// Frequency in Hz of the note `index` semitones away from A4.
///
/// `f = 440 * 2^(index / 12)`
pub fn pitch_of(index: i32) -> f64 {
    A4_FREQUENCY * 2.0_f64.powf(index as f64 / 12.0)
}

/// Continuous, unrounded semitone position of `frequency` relative to A4.
///
/// Positive values lie above A4, negative values below it.
pub fn offset_from_a4(frequency: f64) -> f64 {
    12.0 * (frequency / A4_FREQUENCY).log2()
}

/// Index of the note nearest to `frequency`.
///
/// Exact half-semitone positions round away from zero (`f64::round`).
pub fn index_of_frequency(frequency: f64) -> i32 {
    offset_from_a4(frequency).round() as i32
}

/// Converts a semitone distance to cents (1 semitone = 100 cents).
pub fn cents(semitones: f64) -> f64 {
    semitones * 100.0
}

/// MIDI note number for a note index (A4 = 69).
pub fn midi_number(index: i32) -> i32 {
    index + A4_MIDI
}

/// Returns true if `index` lies within `[LOWEST_NOTE, HIGHEST_NOTE]`.
pub fn in_range(index: i32) -> bool {
    (LOWEST_NOTE..=HIGHEST_NOTE).contains(&index)
}

/// Note symbol for `index`, e.g. `-29` → `"E2"`, `4` → `"C#5"`.
///
/// Only sharps are produced, never flats.
pub fn symbol_of(index: i32) -> String {
    let from_c4 = index + C_TO_A;
    let octave = 4 + from_c4.div_euclid(12);
    let name = NOTE_NAMES[from_c4.rem_euclid(12) as usize];
    format!("{}{}", name, octave)
}

/// Parses a note symbol produced by [`symbol_of`] back into a note index.
///
/// The grammar is `<A-G>[#]<octave digits>`. Flats, lowercase letters,
/// sharps that do not exist in the sharp-only naming (`E#`, `B#`), missing
/// octaves and trailing characters are all rejected with
/// [`TunerError::Format`].
pub fn index_of_symbol(symbol: &str) -> Result<i32> {
    let mut chars = symbol.chars().peekable();

    let letter = chars
        .next()
        .ok_or_else(|| TunerError::format("empty note symbol"))?;
    let mut semitone = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => {
            return Err(TunerError::format(format!(
                "invalid note letter '{}' in '{}'",
                letter, symbol
            )));
        }
    };

    match chars.peek() {
        Some('#') => {
            if letter == 'E' || letter == 'B' {
                return Err(TunerError::format(format!(
                    "'{}#' is not a sharp note name in '{}'",
                    letter, symbol
                )));
            }
            semitone += 1;
            chars.next();
        }
        Some('b') | Some('♭') => {
            return Err(TunerError::format(format!(
                "flats are not accepted: '{}'",
                symbol
            )));
        }
        _ => {}
    }

    let octave_text: String = chars.collect();
    if octave_text.is_empty() {
        return Err(TunerError::format(format!("missing octave in '{}'", symbol)));
    }
    if !octave_text.chars().all(|c| c.is_ascii_digit()) {
        return Err(TunerError::format(format!(
            "invalid octave '{}' in '{}'",
            octave_text, symbol
        )));
    }
    let out_of_range = || TunerError::format(format!("octave out of range in '{}'", symbol));
    let octave: i32 = octave_text.parse().map_err(|_| out_of_range())?;

    octave
        .checked_sub(4)
        .and_then(|o| o.checked_mul(12))
        .and_then(|n| n.checked_add(semitone - C_TO_A))
        .ok_or_else(out_of_range)
}

/// Like [`index_of_symbol`], but distinguishes "no symbol at all" from a
/// malformed one by returning [`TunerError::MissingValue`] for `None`.
pub fn require_index(symbol: Option<&str>) -> Result<i32> {
    match symbol {
        Some(symbol) => index_of_symbol(symbol),
        None => Err(TunerError::MissingValue("note symbol".to_string())),
    }
}
