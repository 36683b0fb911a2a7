// tuner-core/src/lib.rs

//! The core logic for the string instrument tuner.
//! This crate turns pitch estimates into per-string tuning guidance and
//! manages the user's tuning presets. It is completely headless: pitch
//! detection, sound output and storage are supplied by the caller.

pub mod config;
pub mod engine;
pub mod error;
pub mod notes;
pub mod observable;
pub mod persistence;
pub mod sound;
pub mod store;
pub mod sync;
pub mod tuner;
pub mod tuning;
pub mod tuning_list;

pub use config::TunerConfig;
pub use engine::{Command, Engine, EngineHandle, Outcome};
pub use error::{Result, StoreError, TunerError};
pub use tuner::{PitchSample, Tuner, TunerMode, TunerView};
pub use tuning::{Category, GuitarString, Instrument, Tuning, TuningEntry};
pub use tuning_list::{TuningList, TuningListView, TuningSet};
