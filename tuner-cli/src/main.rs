//! # Tuner CLI - Headless String Instrument Tuner
//!
//! Drives the tuning engine from a line-based prompt. Pitch estimates are
//! typed in (or piped from a pitch detector) as `pitch <hz>` lines, which
//! stands in for a live capture pipeline.
//!
//! ## Architecture
//! - **Main Thread**: reads stdin, resolves names, prints guidance
//! - **Engine Thread**: owns the tuner and tuning list (see `tuner_core::engine`)
//! - **Communication**: crossbeam channels for pitch samples and commands
//! - **Storage**: favourites and custom tunings as JSON files in the data directory

mod display;
mod input;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use input::Input;
use tuner_core::sound::{NotePlayer, PlayingNote, SoundOutput};
use tuner_core::store::FileStore;
use tuner_core::tuning::find_preset;
use tuner_core::{
    Command, Engine, EngineHandle, Instrument, Outcome, Tuner, TunerConfig, Tuning, TuningEntry,
    TuningList,
};

/// How long to wait for the engine to publish a new offset after a pitch line.
const OFFSET_WAIT: Duration = Duration::from_millis(250);

/// Capacity of the pitch sample queue; the engine only uses the newest sample.
const PITCH_QUEUE: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "tuner-cli")]
#[command(about = "Headless string instrument tuner")]
#[command(version)]
struct Args {
    /// Directory holding favourite and custom tunings
    #[arg(short, long, default_value = "tuner-data", env = "TUNER_DATA_DIR")]
    data_dir: PathBuf,

    /// Optional JSON config file
    #[arg(short, long, env = "TUNER_CONFIG")]
    config: Option<PathBuf>,

    /// Override the chromatic "in tune" window, in cents
    #[arg(long)]
    tolerance_cents: Option<f64>,
}

/// Logs note events instead of driving a synthesizer.
struct LogOutput;

impl SoundOutput for LogOutput {
    fn play_note(&mut self, string_index: usize, note_number: i32, duration_ms: u64, instrument_code: u8) {
        info!(
            "note on: channel {} note {} program {} for {} ms",
            string_index, note_number, instrument_code, duration_ms
        );
    }

    fn stop_note(&mut self, string_index: usize, note_number: i32) {
        info!("note off: channel {} note {}", string_index, note_number);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tuner_core=info,tuner_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TunerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TunerConfig::default(),
    };
    if let Some(cents) = args.tolerance_cents {
        config.in_tune_tolerance = cents / 100.0;
        config.validate()?;
    }

    let store = FileStore::new(args.data_dir.clone())
        .with_context(|| format!("opening data directory {}", args.data_dir.display()))?;
    info!("Storing tunings in {}", store.dir().display());

    let list = TuningList::new(Arc::new(store), &config);
    let tuner = Tuner::new(&config);
    let (pitch_tx, pitch_rx) = crossbeam_channel::bounded(PITCH_QUEUE);
    let engine = Engine::new(tuner, list).spawn(pitch_rx);

    let mut session = Session {
        offsets: engine.tuner().offset_changes(),
        engine,
        player: NotePlayer::new(LogOutput),
        playing: HashMap::new(),
        note_duration: Duration::from_millis(config.note_duration_ms),
    };

    println!("{}", display::HELP);
    println!("{}", display::status(session.engine.tuner(), session.engine.list()));

    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let input = match input::parse(&line) {
            Ok(input) => input,
            Err(e) => {
                eprintln!("{:#}", e);
                continue;
            }
        };

        match input {
            Input::Quit => break,
            Input::Pitch(sample) => {
                // Drop offsets published before this sample.
                let _ = session.offsets.try_iter().count();
                if pitch_tx.try_send(sample).is_err() {
                    warn!("Pitch queue full, sample dropped");
                }
                let _ = session.offsets.recv_timeout(OFFSET_WAIT);
                println!("{}", display::guidance(session.engine.tuner()));
            }
            other => {
                if let Err(e) = session.handle(other) {
                    eprintln!("{:#}", e);
                }
            }
        }

        for e in session.engine.persistence_errors().try_iter() {
            warn!("{}", e);
        }
    }

    drop(pitch_tx);
    session.playing.clear();
    session.engine.shutdown();
    Ok(())
}

struct Session {
    engine: EngineHandle,
    offsets: Receiver<Arc<Option<f64>>>,
    player: NotePlayer<LogOutput>,
    playing: HashMap<usize, PlayingNote>,
    note_duration: Duration,
}

impl Session {
    fn handle(&mut self, input: Input) -> Result<()> {
        match input {
            Input::Engine(command) => self.run(command),
            Input::UseTuning(name) => {
                let command = self.resolve_tuning(&name)?;
                self.run(command)
            }
            Input::Favourite(on) => {
                let current = self.engine.list().current().as_ref().clone();
                self.run(Command::SetFavourited(current, on))
            }
            Input::SaveCustom(name) => {
                let entry = self.engine.tuner().entry();
                let tuning = entry
                    .tuning()
                    .ok_or_else(|| anyhow!("chromatic mode has no strings to save"))?;
                self.run(Command::AddCustom(name, tuning.without_label()))
            }
            Input::DeleteCustom(name) => {
                let entry = self
                    .engine
                    .list()
                    .find_custom(&name)
                    .ok_or_else(|| anyhow!("no custom tuning named '{}'", name))?;
                self.run(Command::RemoveCustom(entry))
            }
            Input::Play(index) => self.play(index),
            Input::Presets => {
                print!("{}", display::preset_list());
                Ok(())
            }
            Input::List => {
                print!("{}", display::collections(self.engine.list()));
                Ok(())
            }
            Input::Status => {
                println!("{}", display::status(self.engine.tuner(), self.engine.list()));
                Ok(())
            }
            Input::Help => {
                println!("{}", display::HELP);
                Ok(())
            }
            Input::Pitch(_) | Input::Quit => Ok(()),
        }
    }

    fn run(&self, command: Command) -> Result<()> {
        match self.engine.execute(command)? {
            Outcome::Shifted(false) => println!("Already at the end of the note range"),
            Outcome::Added(entry) => println!("Saved {}", entry),
            Outcome::Removed(true) => println!("Removed"),
            Outcome::Removed(false) => println!("Nothing to remove"),
            Outcome::Done | Outcome::Shifted(true) => {
                println!("{}", display::status(self.engine.tuner(), self.engine.list()));
            }
        }
        Ok(())
    }

    /// Custom names win over preset names; anything else is read as note symbols.
    fn resolve_tuning(&self, name: &str) -> Result<Command> {
        if let Some(entry) = self.engine.list().find_custom(name) {
            return Ok(Command::SetCurrent(entry));
        }
        if let Some(preset) = find_preset(name) {
            return Ok(Command::SetCurrent(TuningEntry::Instrument(preset.clone())));
        }
        if name.eq_ignore_ascii_case("chromatic") {
            return Ok(Command::SetChromatic);
        }
        let instrument = self
            .engine
            .tuner()
            .entry()
            .tuning()
            .map(Tuning::instrument)
            .unwrap_or(Instrument::Guitar);
        let tuning = Tuning::parse(None, instrument, None, name)
            .with_context(|| format!("'{}' is neither a known tuning nor note symbols", name))?;
        Ok(Command::SetTuning(tuning))
    }

    fn play(&mut self, index: usize) -> Result<()> {
        let entry = self.engine.tuner().entry();
        let tuning = entry
            .tuning()
            .ok_or_else(|| anyhow!("chromatic mode has no strings to play"))?;
        let string = tuning.string(index)?;
        // Replacing a handle stops the previous note on that string.
        let note = self
            .player
            .play(index, string.root(), self.note_duration, tuning.instrument());
        self.playing.insert(index, note);
        self.playing.retain(|_, note| !note.is_finished());
        Ok(())
    }
}
