//! # Engine Module
//!
//! Runs the [`Tuner`], the [`TuningList`] and the [`TuningSync`] between them
//! on one dedicated thread, so every write to either component happens in a
//! single place.
//!
//! ## Architecture
//! - **Engine thread**: owns all state, selects over pitch samples, commands
//!   and a shutdown signal
//! - **Callers**: send [`Command`]s through an [`EngineHandle`] and read state
//!   through [`TunerView`] / [`TuningListView`] without blocking the engine
//! - **Pitch source**: any producer of [`PitchSample`]s on a crossbeam channel
//!
//! When samples pile up faster than they are processed, only the newest one
//! is used.

use crossbeam_channel::{Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::error::{Result, TunerError};
use crate::tuner::{PitchSample, Tuner, TunerView};
use crate::tuning::{Tuning, TuningEntry};
use crate::tuning_list::{TuningList, TuningListView};
use crate::sync::TuningSync;

/// A user command for the tuner or the tuning list.
#[derive(Debug, Clone)]
pub enum Command {
    // Tuner
    SelectString(usize),
    SelectNote(i32),
    SetAutoDetect(bool),
    SetTuning(Tuning),
    SetChromatic,
    TuneUp,
    TuneDown,
    TuneStringUp(usize),
    TuneStringDown(usize),
    SetTuned(usize, bool),
    MarkSelectedTuned,

    // Tuning list
    SetCurrent(TuningEntry),
    SetFavourited(TuningEntry, bool),
    AddCustom(String, Tuning),
    RemoveCustom(TuningEntry),

    /// Waits for pending saves to reach the store.
    Flush,
}

/// What a successful command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done,
    /// Result of a shift; `false` means the note range boundary was hit.
    Shifted(bool),
    Added(TuningEntry),
    Removed(bool),
}

/// The engine's state, usable directly on the current thread or moved onto
/// its own thread with [`Engine::spawn`].
pub struct Engine {
    tuner: Tuner,
    list: TuningList,
    sync: TuningSync,
}

impl Engine {
    /// Wires up the sync; the tuner starts on the list's current selection.
    pub fn new(mut tuner: Tuner, list: TuningList) -> Self {
        let sync = TuningSync::attach(&mut tuner, &list);
        Self { tuner, list, sync }
    }

    pub fn tuner(&self) -> &Tuner {
        &self.tuner
    }

    pub fn list(&self) -> &TuningList {
        &self.list
    }

    pub fn process_pitch(&mut self, sample: PitchSample) {
        self.tuner.process_pitch(sample);
    }

    /// Applies one command, then propagates any change of the active tuning.
    pub fn apply(&mut self, command: Command) -> Result<Outcome> {
        let tuner = &mut self.tuner;
        let list = &mut self.list;
        let outcome = match command {
            Command::SelectString(index) => tuner.select_string(index).map(|_| Outcome::Done),
            Command::SelectNote(note) => tuner.select_note(note).map(|_| Outcome::Done),
            Command::SetAutoDetect(enabled) => {
                tuner.set_auto_detect(enabled);
                Ok(Outcome::Done)
            }
            Command::SetTuning(tuning) => {
                tuner.set_tuning(tuning);
                Ok(Outcome::Done)
            }
            Command::SetChromatic => {
                tuner.set_chromatic();
                Ok(Outcome::Done)
            }
            Command::TuneUp => tuner.tune_up().map(Outcome::Shifted),
            Command::TuneDown => tuner.tune_down().map(Outcome::Shifted),
            Command::TuneStringUp(index) => tuner.tune_string_up(index).map(Outcome::Shifted),
            Command::TuneStringDown(index) => tuner.tune_string_down(index).map(Outcome::Shifted),
            Command::SetTuned(index, value) => tuner.set_tuned(index, value).map(|_| Outcome::Done),
            Command::MarkSelectedTuned => tuner.mark_selected_tuned().map(|_| Outcome::Done),
            Command::SetCurrent(entry) => {
                list.set_current(entry);
                Ok(Outcome::Done)
            }
            Command::SetFavourited(entry, favourite) => {
                list.set_favourited(&entry, favourite);
                Ok(Outcome::Done)
            }
            Command::AddCustom(name, tuning) => Ok(Outcome::Added(list.add_custom(&name, tuning))),
            Command::RemoveCustom(entry) => Ok(Outcome::Removed(list.remove_custom(&entry))),
            Command::Flush => {
                list.flush();
                Ok(Outcome::Done)
            }
        };
        self.sync.pump(&mut self.tuner, &mut self.list);
        outcome
    }

    /// Moves the engine onto its own thread, fed by `pitch_samples`.
    pub fn spawn(self, pitch_samples: Receiver<PitchSample>) -> EngineHandle {
        let tuner_view = self.tuner.view();
        let list_view = self.list.view();
        let errors = self.list.persistence_errors();
        let (command_tx, command_rx) = crossbeam_channel::unbounded::<Request>();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);

        let thread_handle = thread::Builder::new()
            .name("tuner-engine".into())
            .spawn(move || run(self, pitch_samples, command_rx, shutdown_rx))
            .ok();
        if thread_handle.is_none() {
            warn!("Could not start the engine thread");
        }

        EngineHandle {
            commands: command_tx,
            shutdown_tx,
            thread_handle,
            tuner: tuner_view,
            list: list_view,
            errors,
        }
    }
}

struct Request {
    command: Command,
    reply: Option<Sender<Result<Outcome>>>,
}

fn run(
    mut engine: Engine,
    pitch_samples: Receiver<PitchSample>,
    commands: Receiver<Request>,
    shutdown: Receiver<()>,
) {
    info!("Engine thread started");
    let closed = crossbeam_channel::never::<PitchSample>();
    let mut pitch_open = true;
    loop {
        let source = if pitch_open { &pitch_samples } else { &closed };
        crossbeam_channel::select! {
            recv(source) -> msg => match msg {
                Ok(sample) => {
                    let newest = source.try_iter().last().unwrap_or(sample);
                    engine.process_pitch(newest);
                }
                Err(_) => {
                    debug!("Pitch source closed");
                    pitch_open = false;
                }
            },
            recv(commands) -> msg => match msg {
                Ok(Request { command, reply }) => {
                    debug!("Engine command: {:?}", command);
                    let outcome = engine.apply(command);
                    if let Err(e) = &outcome {
                        debug!("Command failed: {}", e);
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(outcome);
                    }
                }
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
        }
    }
    engine.list.flush();
    info!("Engine thread finished");
}

/// Control handle for an engine running on its own thread.
pub struct EngineHandle {
    commands: Sender<Request>,
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
    tuner: TunerView,
    list: TuningListView,
    errors: Receiver<TunerError>,
}

impl EngineHandle {
    /// Sends `command` and waits for its outcome.
    pub fn execute(&self, command: Command) -> Result<Outcome> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(Request {
                command,
                reply: Some(reply_tx),
            })
            .map_err(|_| TunerError::Stopped)?;
        reply_rx.recv().map_err(|_| TunerError::Stopped)?
    }

    /// Sends `command` without waiting.
    pub fn submit(&self, command: Command) -> Result<()> {
        self.commands
            .send(Request {
                command,
                reply: None,
            })
            .map_err(|_| TunerError::Stopped)
    }

    pub fn tuner(&self) -> &TunerView {
        &self.tuner
    }

    pub fn list(&self) -> &TuningListView {
        &self.list
    }

    /// Background save failures.
    pub fn persistence_errors(&self) -> &Receiver<TunerError> {
        &self.errors
    }

    /// Stops the engine thread after flushing pending saves.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("Engine thread panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
