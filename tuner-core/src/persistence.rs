//! # Persistence Module
//!
//! JSON encoding of tuning collections and the background thread that writes
//! them to a [`KeyValueStore`].
//!
//! ## Format
//! ```json
//! {"tunings":[{"name":"Drop D","instrument":"GUITAR","category":"COMMON","strings":"E4 B3 G3 D3 A2 D2"}]}
//! ```
//! `name` and `category` are omitted when absent and decode back to absent.
//! A missing `instrument` means GUITAR; `"CHROMATIC"` is the chromatic entry.
//!
//! ## Writer
//! Every save is a full snapshot of both collections, never a delta, so the
//! writer may coalesce queued snapshots and keep only the newest. Dropping the
//! [`Persister`] abandons anything still queued and joins the thread.

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::error::{Result, TunerError};
use crate::store::KeyValueStore;
use crate::tuning::{Category, Instrument, Tuning, TuningEntry};

#[derive(Debug, Serialize, Deserialize)]
struct TuningFile {
    tunings: Vec<TuningRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TuningRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instrument: Option<InstrumentTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<Category>,
    #[serde(default)]
    strings: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum InstrumentTag {
    Guitar,
    Bass,
    Ukulele,
    Other,
    Chromatic,
}

impl From<Instrument> for InstrumentTag {
    fn from(instrument: Instrument) -> Self {
        match instrument {
            Instrument::Guitar => InstrumentTag::Guitar,
            Instrument::Bass => InstrumentTag::Bass,
            Instrument::Ukulele => InstrumentTag::Ukulele,
            Instrument::Other => InstrumentTag::Other,
        }
    }
}

impl TuningRecord {
    fn from_entry(entry: &TuningEntry) -> Self {
        match entry {
            TuningEntry::Instrument(tuning) => Self {
                name: tuning.name().map(str::to_owned),
                instrument: Some(tuning.instrument().into()),
                category: tuning.category(),
                strings: Some(tuning.symbols()),
            },
            TuningEntry::Chromatic => Self {
                name: None,
                instrument: Some(InstrumentTag::Chromatic),
                category: None,
                strings: Some(String::new()),
            },
        }
    }

    fn into_entry(self) -> Result<TuningEntry> {
        let instrument = match self.instrument.unwrap_or(InstrumentTag::Guitar) {
            InstrumentTag::Chromatic => return Ok(TuningEntry::Chromatic),
            InstrumentTag::Guitar => Instrument::Guitar,
            InstrumentTag::Bass => Instrument::Bass,
            InstrumentTag::Ukulele => Instrument::Ukulele,
            InstrumentTag::Other => Instrument::Other,
        };
        let strings = self
            .strings
            .ok_or_else(|| TunerError::MissingValue("tuning record has no strings".to_string()))?;
        let tuning = Tuning::parse(self.name.as_deref(), instrument, self.category, &strings)?;
        Ok(TuningEntry::Instrument(tuning))
    }
}

/// Encodes entries in the persisted JSON format.
pub fn encode(entries: &[TuningEntry]) -> Result<String> {
    let file = TuningFile {
        tunings: entries.iter().map(TuningRecord::from_entry).collect(),
    };
    serde_json::to_string(&file).map_err(|e| TunerError::format(e.to_string()))
}

/// Decodes the persisted JSON format.
///
/// Fails with [`TunerError::Format`] on malformed JSON or note symbols and
/// [`TunerError::MissingValue`] when a record has no `strings`.
pub fn decode(text: &str) -> Result<Vec<TuningEntry>> {
    let file: TuningFile =
        serde_json::from_str(text).map_err(|e| TunerError::format(e.to_string()))?;
    file.tunings.into_iter().map(TuningRecord::into_entry).collect()
}

/// Reads and decodes `key`, falling back to `fallback()` when the key is
/// absent or its contents cannot be decoded. Decode errors are logged, never
/// returned.
pub fn load_or_else(
    store: &dyn KeyValueStore,
    key: &str,
    fallback: impl FnOnce() -> Vec<TuningEntry>,
) -> Vec<TuningEntry> {
    let Some(text) = store.read(key) else {
        debug!("No stored value for '{}', using defaults", key);
        return fallback();
    };
    match decode(&text) {
        Ok(entries) => {
            info!("Loaded {} tunings from '{}'", entries.len(), key);
            entries
        }
        Err(e) => {
            warn!("Could not decode '{}' ({}), using defaults", key, e);
            fallback()
        }
    }
}

/// The collections written on every save.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub custom: Vec<TuningEntry>,
    pub favourites: Vec<TuningEntry>,
}

enum Job {
    Write(Snapshot),
    Flush(Sender<()>),
}

/// Background writer owned by a [`TuningList`](crate::tuning_list::TuningList).
pub struct Persister {
    jobs: Sender<Job>,
    shutdown_tx: Sender<()>,
    errors: Receiver<TunerError>,
    thread_handle: Option<JoinHandle<()>>,
}

impl Persister {
    /// Starts the writer thread.
    pub fn spawn(store: Arc<dyn KeyValueStore>, custom_key: &str, favourites_key: &str) -> Self {
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded::<Job>();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let (errors_tx, errors_rx) = crossbeam_channel::unbounded();
        let keys = Keys {
            custom: custom_key.to_string(),
            favourites: favourites_key.to_string(),
        };

        let thread_handle = thread::Builder::new()
            .name("tuning-persister".into())
            .spawn(move || run_writer(store, keys, jobs_rx, shutdown_rx, errors_tx))
            .ok();
        if thread_handle.is_none() {
            warn!("Could not start persistence thread, changes will not be saved");
        }

        Self {
            jobs: jobs_tx,
            shutdown_tx,
            errors: errors_rx,
            thread_handle,
        }
    }

    /// Queues a snapshot. Never blocks.
    pub fn save(&self, snapshot: Snapshot) {
        let _ = self.jobs.send(Job::Write(snapshot));
    }

    /// Blocks until every snapshot queued so far has been written (or the
    /// writer has stopped).
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self.jobs.send(Job::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Failed writes are reported here.
    pub fn errors(&self) -> Receiver<TunerError> {
        self.errors.clone()
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("Persistence thread panicked");
            }
        }
    }
}

struct Keys {
    custom: String,
    favourites: String,
}

fn run_writer(
    store: Arc<dyn KeyValueStore>,
    keys: Keys,
    jobs: Receiver<Job>,
    shutdown: Receiver<()>,
    errors: Sender<TunerError>,
) {
    debug!("Persistence thread started");
    loop {
        crossbeam_channel::select! {
            recv(jobs) -> job => match job {
                Ok(job) => {
                    let mut pending = None;
                    let mut acks = Vec::new();
                    for job in std::iter::once(job).chain(jobs.try_iter()) {
                        match job {
                            Job::Write(snapshot) => pending = Some(snapshot),
                            Job::Flush(ack) => acks.push(ack),
                        }
                    }
                    if shutdown.try_recv().is_ok() {
                        debug!("Persistence thread cancelled with writes pending");
                        break;
                    }
                    if let Some(snapshot) = pending {
                        write_snapshot(store.as_ref(), &keys, &snapshot, &errors);
                    }
                    for ack in acks {
                        let _ = ack.send(());
                    }
                }
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
        }
    }
    debug!("Persistence thread finished");
}

fn write_snapshot(
    store: &dyn KeyValueStore,
    keys: &Keys,
    snapshot: &Snapshot,
    errors: &Sender<TunerError>,
) {
    for (key, entries) in [
        (&keys.custom, &snapshot.custom),
        (&keys.favourites, &snapshot.favourites),
    ] {
        let result = encode(entries).and_then(|text| Ok(store.write(key, &text)?));
        if let Err(e) = result {
            warn!("Saving '{}' failed: {}", key, e);
            let _ = errors.send(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use crate::tuning::{find_preset, standard};
    use std::collections::HashSet;

    fn sample_entries() -> Vec<TuningEntry> {
        vec![
            TuningEntry::Instrument(standard()),
            TuningEntry::Instrument(find_preset("Drop D").unwrap().clone()),
            TuningEntry::Instrument(
                Tuning::parse(None, Instrument::Guitar, None, "G3 D3 A2 E2").unwrap(),
            ),
        ]
    }

    #[test]
    fn test_encode_decode_preserves_entries() {
        let entries = sample_entries();
        let decoded = decode(&encode(&entries).unwrap()).unwrap();
        let original: HashSet<_> = entries.iter().cloned().collect();
        let restored: HashSet<_> = decoded.iter().cloned().collect();
        assert_eq!(original, restored);
        for (a, b) in entries.iter().zip(&decoded) {
            assert!(a.is_identical(b));
        }
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let unnamed = vec![TuningEntry::Instrument(
            Tuning::parse(None, Instrument::Bass, None, "G2 D2").unwrap(),
        )];
        let text = encode(&unnamed).unwrap();
        assert!(!text.contains("name"));
        assert!(!text.contains("category"));
        let decoded = decode(&text).unwrap();
        let tuning = decoded[0].tuning().unwrap();
        assert_eq!(tuning.name(), None);
        assert_eq!(tuning.category(), None);
        assert_eq!(tuning.instrument(), Instrument::Bass);
    }

    #[test]
    fn test_decode_is_field_order_independent() {
        let text = r#"{"tunings":[
            {"strings":"E4 B3 G3 D3 A2 D2","category":"COMMON","name":"Drop D"},
            {"instrument":"CHROMATIC"}
        ]}"#;
        let decoded = decode(text).unwrap();
        assert_eq!(decoded.len(), 2);
        let drop_d = decoded[0].tuning().unwrap();
        assert_eq!(drop_d.instrument(), Instrument::Guitar);
        assert!(drop_d.is_identical(find_preset("Drop D").unwrap()));
        assert_eq!(decoded[1], TuningEntry::Chromatic);
    }

    #[test]
    fn test_chromatic_round_trip() {
        let text = encode(&[TuningEntry::Chromatic]).unwrap();
        assert_eq!(decode(&text).unwrap(), vec![TuningEntry::Chromatic]);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode("{not json"), Err(TunerError::Format(_))));
        assert!(matches!(
            decode(r#"{"tunings":[{"strings":"E4 Xb"}]}"#),
            Err(TunerError::Format(_))
        ));
        assert!(matches!(
            decode(r#"{"tunings":[{"name":"empty"}]}"#),
            Err(TunerError::MissingValue(_))
        ));
    }

    #[test]
    fn test_overflowing_octave_is_a_format_error() {
        assert!(matches!(
            decode(r#"{"tunings":[{"strings":"E4 C999999999"}]}"#),
            Err(TunerError::Format(_))
        ));
        let store = MemoryStore::new()
            .with_entry("custom", r#"{"tunings":[{"strings":"C999999999"}]}"#);
        assert!(load_or_else(&store, "custom", Vec::new).is_empty());
    }

    #[test]
    fn test_load_falls_back() {
        let store = MemoryStore::new().with_entry("bad", "garbage");
        let fallback = || vec![TuningEntry::Instrument(standard())];
        assert_eq!(load_or_else(&store, "bad", fallback).len(), 1);
        assert_eq!(load_or_else(&store, "absent", Vec::new).len(), 0);
    }

    #[test]
    fn test_persister_writes_latest_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let persister = Persister::spawn(store.clone(), "custom", "favourites");
        for n in 1..=3 {
            persister.save(Snapshot {
                custom: sample_entries()[..n].to_vec(),
                favourites: vec![TuningEntry::Chromatic],
            });
        }
        persister.flush();
        assert_eq!(decode(&store.read("custom").unwrap()).unwrap().len(), 3);
        assert_eq!(
            decode(&store.read("favourites").unwrap()).unwrap(),
            vec![TuningEntry::Chromatic]
        );
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn read(&self, _key: &str) -> Option<String> {
            None
        }

        fn write(&self, key: &str, _text: &str) -> std::result::Result<(), StoreError> {
            Err(StoreError {
                key: key.to_string(),
                reason: "disk full".to_string(),
            })
        }
    }

    #[test]
    fn test_persister_reports_failures() {
        let persister = Persister::spawn(Arc::new(FailingStore), "custom", "favourites");
        let errors = persister.errors();
        persister.save(Snapshot {
            custom: Vec::new(),
            favourites: Vec::new(),
        });
        persister.flush();
        let reported: Vec<_> = errors.try_iter().collect();
        assert_eq!(reported.len(), 2);
        assert!(matches!(reported[0], TunerError::Persistence(_)));
    }

    #[test]
    fn test_dropping_persister_stops_thread() {
        let store = Arc::new(MemoryStore::new());
        let persister = Persister::spawn(store, "custom", "favourites");
        drop(persister);
    }
}
