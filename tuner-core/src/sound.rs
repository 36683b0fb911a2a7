//! # Sound Module
//!
//! Plays reference notes for strings through a MIDI-like [`SoundOutput`].
//!
//! Each string plays on its own channel, and several strings may sound at
//! once, so all writes to the output go through one mutex, one lock per
//! note-on or note-off. The note-off is sent by a drop guard: it goes out
//! whether the sustain runs to the end, is cancelled, or the playing thread
//! unwinds.

use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use crate::notes;
use crate::tuning::Instrument;

/// A note sink, e.g. a MIDI synthesizer.
pub trait SoundOutput: Send + 'static {
    fn play_note(&mut self, string_index: usize, note_number: i32, duration_ms: u64, instrument_code: u8);
    fn stop_note(&mut self, string_index: usize, note_number: i32);
}

/// Serializes note events from concurrently playing strings onto one output.
pub struct NotePlayer<S> {
    output: Arc<Mutex<S>>,
}

impl<S> Clone for NotePlayer<S> {
    fn clone(&self) -> Self {
        Self {
            output: Arc::clone(&self.output),
        }
    }
}

impl<S: SoundOutput> NotePlayer<S> {
    pub fn new(output: S) -> Self {
        Self {
            output: Arc::new(Mutex::new(output)),
        }
    }

    /// Starts playing `note_index` on string `string_index` for `duration`.
    ///
    /// Dropping or cancelling the returned handle ends the note early.
    pub fn play(
        &self,
        string_index: usize,
        note_index: i32,
        duration: Duration,
        instrument: Instrument,
    ) -> PlayingNote {
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);
        let output = Arc::clone(&self.output);
        let note_number = notes::midi_number(note_index);
        let duration_ms = duration.as_millis() as u64;

        let handle = thread::spawn(move || {
            lock(&output).play_note(string_index, note_number, duration_ms, instrument.midi_program());
            let _note_off = NoteOff {
                output,
                string_index,
                note_number,
            };
            // Returns on timeout, on cancel, or when the handle is dropped.
            let _ = cancel_rx.recv_timeout(duration);
        });

        debug!("Playing {} on string {}", notes::symbol_of(note_index), string_index);
        PlayingNote {
            cancel_tx,
            handle: Some(handle),
        }
    }
}

fn lock<S>(output: &Mutex<S>) -> std::sync::MutexGuard<'_, S> {
    output.lock().unwrap_or_else(PoisonError::into_inner)
}

struct NoteOff<S: SoundOutput> {
    output: Arc<Mutex<S>>,
    string_index: usize,
    note_number: i32,
}

impl<S: SoundOutput> Drop for NoteOff<S> {
    fn drop(&mut self) {
        lock(&self.output).stop_note(self.string_index, self.note_number);
    }
}

/// Handle to a sounding note.
pub struct PlayingNote {
    cancel_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl PlayingNote {
    /// Stops the note now and waits for its note-off to be sent.
    pub fn cancel(mut self) {
        let _ = self.cancel_tx.try_send(());
        self.join();
    }

    /// Waits for the note to finish on its own.
    pub fn wait(mut self) {
        self.join();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Note thread panicked");
            }
        }
    }
}

impl Drop for PlayingNote {
    fn drop(&mut self) {
        let _ = self.cancel_tx.try_send(());
        self.join();
    }
}
