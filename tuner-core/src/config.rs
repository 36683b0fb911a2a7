//! # Configuration Module
//!
//! Tunable constants of the engine, loadable from a JSON file. Every field
//! has a default, so a partial file (or no file at all) is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{Result, TunerError};

/// Default "in tune" window for chromatic mode, in semitones (5 cents).
pub const DEFAULT_IN_TUNE_TOLERANCE: f64 = 0.05;

/// Store key holding the user's custom tunings.
pub const CUSTOM_TUNINGS_KEY: &str = "custom_tunings";

/// Store key holding the user's favourite tunings.
pub const FAVOURITE_TUNINGS_KEY: &str = "favourite_tunings";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Chromatic mode reports "in tune" when `|offset| <= in_tune_tolerance` semitones.
    pub in_tune_tolerance: f64,
    /// Whether auto-detect starts enabled.
    pub auto_detect: bool,
    pub custom_key: String,
    pub favourites_key: String,
    /// Length of reference notes played for a string.
    pub note_duration_ms: u64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            in_tune_tolerance: DEFAULT_IN_TUNE_TOLERANCE,
            auto_detect: true,
            custom_key: CUSTOM_TUNINGS_KEY.to_string(),
            favourites_key: FAVOURITE_TUNINGS_KEY.to_string(),
            note_duration_ms: 2000,
        }
    }
}

impl TunerConfig {
    /// Loads a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .map_err(|e| TunerError::format(format!("cannot read {}: {}", path.display(), e)))?;
        let config: TunerConfig = serde_json::from_str(&text)
            .map_err(|e| TunerError::format(format!("invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.in_tune_tolerance.is_finite() && self.in_tune_tolerance >= 0.0) {
            return Err(TunerError::validation(format!(
                "in_tune_tolerance must be a non-negative number, got {}",
                self.in_tune_tolerance
            )));
        }
        if self.custom_key == self.favourites_key {
            return Err(TunerError::validation(
                "custom_key and favourites_key must differ",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"in_tune_tolerance": 0.1}}"#).unwrap();
        let config = TunerConfig::load(file.path()).unwrap();
        assert_eq!(config.in_tune_tolerance, 0.1);
        assert_eq!(config.custom_key, CUSTOM_TUNINGS_KEY);
        assert!(config.auto_detect);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = TunerConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, TunerConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"in_tune_tolerance": -1.0}}"#).unwrap();
        assert!(matches!(
            TunerConfig::load(file.path()),
            Err(TunerError::Validation(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(TunerConfig::load(file.path()), Err(TunerError::Format(_))));
    }
}
