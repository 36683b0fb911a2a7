//! # Tuning List Module
//!
//! The user's current selection plus their favourite and custom tunings.
//!
//! Collections are ordered sets keyed by structural equality (instrument and
//! root notes), so adding "the same" tuning twice never stores two entries.
//! When an equivalent entry is already stored, lookups hand back that stored
//! instance, which keeps user-given names attached to the live selection.
//!
//! Favourites and custom tunings are loaded from the store on construction
//! and saved after every change on a background thread; callers never wait
//! for the write.

use crossbeam_channel::Receiver;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::TunerConfig;
use crate::error::TunerError;
use crate::observable::{Observable, ObservableReader};
use crate::persistence::{self, Persister, Snapshot};
use crate::store::KeyValueStore;
use crate::tuning::{Tuning, TuningEntry, standard};

/// Insertion-ordered set of entries without structural duplicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TuningSet {
    entries: Vec<TuningEntry>,
}

impl TuningSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored entry equivalent to `entry`, if any.
    pub fn find(&self, entry: &TuningEntry) -> Option<&TuningEntry> {
        self.entries.iter().find(|stored| *stored == entry)
    }

    /// The entry named `name`, ignoring case.
    pub fn find_by_name(&self, name: &str) -> Option<&TuningEntry> {
        self.iter()
            .find(|entry| entry.name().is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }

    pub fn contains(&self, entry: &TuningEntry) -> bool {
        self.find(entry).is_some()
    }

    /// Appends `entry` unless an equivalent one is stored. Returns whether it was added.
    pub fn insert(&mut self, entry: TuningEntry) -> bool {
        if self.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Swaps an equivalent stored entry for `entry` in place, or appends it.
    pub fn upsert(&mut self, entry: TuningEntry) {
        match self.entries.iter_mut().find(|stored| **stored == entry) {
            Some(stored) => *stored = entry,
            None => self.entries.push(entry),
        }
    }

    /// Removes and returns the stored entry equivalent to `entry`.
    pub fn remove(&mut self, entry: &TuningEntry) -> Option<TuningEntry> {
        let position = self.entries.iter().position(|stored| stored == entry)?;
        Some(self.entries.remove(position))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TuningEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<TuningEntry> {
        self.entries.clone()
    }
}

impl FromIterator<TuningEntry> for TuningSet {
    fn from_iter<I: IntoIterator<Item = TuningEntry>>(iter: I) -> Self {
        let mut set = TuningSet::new();
        for entry in iter {
            set.insert(entry);
        }
        set
    }
}

pub struct TuningList {
    current: Observable<TuningEntry>,
    favourites: Observable<TuningSet>,
    custom: Observable<TuningSet>,
    persister: Persister,
}

impl TuningList {
    /// Loads favourites and custom tunings from `store` and starts the writer.
    ///
    /// Missing or unreadable data falls back to an empty custom set and a
    /// favourites set holding only the standard tuning.
    pub fn new(store: Arc<dyn KeyValueStore>, config: &TunerConfig) -> Self {
        let custom: TuningSet =
            persistence::load_or_else(store.as_ref(), &config.custom_key, Vec::new)
                .into_iter()
                .collect();
        let favourites: TuningSet =
            persistence::load_or_else(store.as_ref(), &config.favourites_key, || {
                vec![TuningEntry::Instrument(standard())]
            })
            .into_iter()
            .map(|entry| custom.find(&entry).cloned().unwrap_or(entry))
            .collect();

        let default_entry = TuningEntry::Instrument(standard());
        let current = favourites
            .find(&default_entry)
            .or_else(|| custom.find(&default_entry))
            .cloned()
            .unwrap_or(default_entry);

        info!(
            "Tuning list ready: {} favourites, {} custom",
            favourites.len(),
            custom.len()
        );

        Self {
            current: Observable::new(current),
            favourites: Observable::new(favourites),
            custom: Observable::new(custom),
            persister: Persister::spawn(store, &config.custom_key, &config.favourites_key),
        }
    }

    pub fn view(&self) -> TuningListView {
        TuningListView {
            current: self.current.reader(),
            favourites: self.favourites.reader(),
            custom: self.custom.reader(),
        }
    }

    pub fn current(&self) -> Arc<TuningEntry> {
        self.current.get()
    }

    pub fn favourites(&self) -> Arc<TuningSet> {
        self.favourites.get()
    }

    pub fn custom(&self) -> Arc<TuningSet> {
        self.custom.get()
    }

    pub fn is_favourite(&self, entry: &TuningEntry) -> bool {
        self.favourites.get().contains(entry)
    }

    /// Finds a custom tuning by name, ignoring case.
    pub fn find_custom(&self, name: &str) -> Option<TuningEntry> {
        self.custom.get().find_by_name(name).cloned()
    }

    /// Selects `entry`, preferring an equivalent stored favourite or custom entry.
    pub fn set_current(&mut self, entry: TuningEntry) {
        let entry = self.canonical(&entry).unwrap_or(entry);
        if self.current.get().is_identical(&entry) {
            return;
        }
        debug!("Current tuning set to {}", entry);
        self.current.set(entry);
        self.save();
    }

    /// Adds `entry` to or removes it from the favourites.
    pub fn set_favourited(&mut self, entry: &TuningEntry, favourite: bool) {
        let mut favourites = self.favourites.get().as_ref().clone();
        let changed = if favourite {
            let entry = self.custom.get().find(entry).cloned().unwrap_or_else(|| entry.clone());
            favourites.insert(entry)
        } else {
            favourites.remove(entry).is_some()
        };
        if changed {
            debug!("Favourite {} -> {}", entry, favourite);
            self.favourites.set(favourites);
            self.save();
        }
    }

    /// Stores `tuning` as a custom tuning called `name` and returns the new entry.
    ///
    /// An equivalent custom tuning is renamed in place. If the current
    /// selection is equivalent to `tuning`, it moves to the named entry.
    pub fn add_custom(&mut self, name: &str, tuning: Tuning) -> TuningEntry {
        let named = TuningEntry::Instrument(tuning.with_name(name));

        let mut custom = self.custom.get().as_ref().clone();
        custom.upsert(named.clone());
        self.custom.set(custom);

        let favourites = self.favourites.get();
        if favourites.contains(&named) {
            let mut favourites = favourites.as_ref().clone();
            favourites.upsert(named.clone());
            self.favourites.set(favourites);
        }

        if *self.current.get() == named {
            self.current.set(named.clone());
        }

        info!("Added custom tuning {}", named);
        self.save();
        named
    }

    /// Removes a custom tuning from the custom set and the favourites.
    ///
    /// If it was the current selection, the selection falls back to the same
    /// strings without a name. Returns whether anything was removed.
    pub fn remove_custom(&mut self, entry: &TuningEntry) -> bool {
        let mut custom = self.custom.get().as_ref().clone();
        let Some(removed) = custom.remove(entry) else {
            return false;
        };
        self.custom.set(custom);

        let mut favourites = self.favourites.get().as_ref().clone();
        if favourites.remove(&removed).is_some() {
            self.favourites.set(favourites);
        }

        if self.current.get().is_identical(&removed) {
            let unnamed = match &removed {
                TuningEntry::Instrument(tuning) => TuningEntry::Instrument(tuning.without_label()),
                TuningEntry::Chromatic => TuningEntry::Chromatic,
            };
            self.current.set(unnamed);
        }

        info!("Removed custom tuning {}", removed);
        self.save();
        true
    }

    /// Subscribes to changes of the current selection.
    pub fn current_changes(&self) -> Receiver<Arc<TuningEntry>> {
        self.current.subscribe()
    }

    /// Blocks until pending saves have been written.
    pub fn flush(&self) {
        self.persister.flush();
    }

    /// Failed background saves are reported on this channel.
    pub fn persistence_errors(&self) -> Receiver<TunerError> {
        self.persister.errors()
    }

    fn canonical(&self, entry: &TuningEntry) -> Option<TuningEntry> {
        let favourites = self.favourites.get();
        if let Some(found) = favourites.find(entry) {
            return Some(found.clone());
        }
        self.custom.get().find(entry).cloned()
    }

    fn save(&self) {
        self.persister.save(Snapshot {
            custom: self.custom.get().to_vec(),
            favourites: self.favourites.get().to_vec(),
        });
    }
}

/// Read-only, thread-safe view of a [`TuningList`].
#[derive(Clone)]
pub struct TuningListView {
    current: ObservableReader<TuningEntry>,
    favourites: ObservableReader<TuningSet>,
    custom: ObservableReader<TuningSet>,
}

impl TuningListView {
    pub fn current(&self) -> Arc<TuningEntry> {
        self.current.get()
    }

    pub fn favourites(&self) -> Arc<TuningSet> {
        self.favourites.get()
    }

    pub fn custom(&self) -> Arc<TuningSet> {
        self.custom.get()
    }

    /// Finds a custom tuning by name, ignoring case.
    pub fn find_custom(&self, name: &str) -> Option<TuningEntry> {
        self.custom.get().find_by_name(name).cloned()
    }

    pub fn current_changes(&self) -> Receiver<Arc<TuningEntry>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CUSTOM_TUNINGS_KEY, FAVOURITE_TUNINGS_KEY};
    use crate::store::MemoryStore;
    use crate::tuning::{Instrument, find_preset};

    fn raw(strings: &str) -> Tuning {
        Tuning::parse(None, Instrument::Guitar, None, strings).unwrap()
    }

    fn list_with(store: Arc<MemoryStore>) -> TuningList {
        TuningList::new(store, &TunerConfig::default())
    }

    fn empty_list() -> TuningList {
        list_with(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_defaults() {
        let list = empty_list();
        assert_eq!(*list.current(), TuningEntry::Instrument(standard()));
        assert_eq!(list.favourites().len(), 1);
        assert!(list.custom().is_empty());
    }

    #[test]
    fn test_set_current_uses_stored_instance() {
        let mut list = empty_list();
        list.set_current(TuningEntry::Instrument(raw("E4 B3 G3 D3 A2 D2")));
        assert_eq!(list.current().name(), None);

        list.set_current(TuningEntry::Instrument(raw("E4 B3 G3 D3 A2 E2")));
        assert_eq!(list.current().name(), Some("Standard"));

        list.set_current(TuningEntry::Chromatic);
        assert_eq!(*list.current(), TuningEntry::Chromatic);
    }

    #[test]
    fn test_set_favourited() {
        let mut list = empty_list();
        let drop_d = TuningEntry::Instrument(find_preset("Drop D").unwrap().clone());
        list.set_favourited(&drop_d, true);
        list.set_favourited(&TuningEntry::Instrument(raw("E4 B3 G3 D3 A2 D2")), true);
        assert_eq!(list.favourites().len(), 2);
        assert!(list.is_favourite(&drop_d));
        assert!(list.custom().is_empty());

        list.set_favourited(&drop_d, false);
        assert!(!list.is_favourite(&drop_d));
        assert_eq!(list.favourites().len(), 1);
    }

    #[test]
    fn test_favouriting_a_custom_tuning_keeps_its_name() {
        let mut list = empty_list();
        list.add_custom("Mine", raw("D4 A3 G3 D3 G2 C2"));
        list.set_favourited(&TuningEntry::Instrument(raw("D4 A3 G3 D3 G2 C2")), true);
        let favourites = list.favourites();
        let stored = favourites.iter().last().unwrap();
        assert_eq!(stored.name(), Some("Mine"));
    }

    #[test]
    fn test_add_and_remove_custom_rebinds_current() {
        let mut list = empty_list();
        let t = raw("C4 G3 D#3 C3 G2 C2");
        list.set_current(TuningEntry::Instrument(t.clone()));

        let named = list.add_custom("New", t.clone());
        assert!(list.current().is_identical(&named));
        assert_eq!(list.current().name(), Some("New"));

        assert!(list.remove_custom(&named));
        assert!(list.current().is_identical(&TuningEntry::Instrument(t)));
        assert!(list.custom().is_empty());
    }

    #[test]
    fn test_add_custom_does_not_touch_unrelated_current() {
        let mut list = empty_list();
        list.add_custom("Low", raw("C4 G3 D#3 C3 G2 C2"));
        assert_eq!(list.current().name(), Some("Standard"));
    }

    #[test]
    fn test_add_custom_renames_equivalent_entry() {
        let mut list = empty_list();
        list.add_custom("First", raw("C4 G3 D#3 C3 G2 C2"));
        list.add_custom("Second", raw("C4 G3 D#3 C3 G2 C2"));
        assert_eq!(list.custom().len(), 1);
        assert!(list.find_custom("second").is_some());
        assert!(list.find_custom("first").is_none());
    }

    #[test]
    fn test_view_finds_custom_by_name() {
        let mut list = empty_list();
        let view = list.view();
        assert_eq!(view.find_custom("open low"), None);
        let named = list.add_custom("Open Low", raw("D4 A3 F#3 D3 A2 D2"));
        assert!(view.find_custom("open low").unwrap().is_identical(&named));
        assert_eq!(view.find_custom("Standard"), None);
    }

    #[test]
    fn test_remove_custom_also_unfavourites() {
        let mut list = empty_list();
        let named = list.add_custom("Fav", raw("C4 G3 D#3 C3 G2 C2"));
        list.set_favourited(&named, true);
        assert!(list.is_favourite(&named));
        list.remove_custom(&named);
        assert!(!list.is_favourite(&named));
        assert!(!list.remove_custom(&named));
    }

    #[test]
    fn test_changes_are_persisted_and_reloaded() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut list = list_with(store.clone());
            let named = list.add_custom("Low C", raw("C4 G3 D#3 C3 G2 C2"));
            list.set_favourited(&named, true);
            list.set_favourited(&TuningEntry::Chromatic, true);
            list.flush();
        }
        let list = list_with(store);
        assert_eq!(list.custom().len(), 1);
        assert_eq!(list.favourites().len(), 3);
        assert!(list.is_favourite(&TuningEntry::Chromatic));
        assert_eq!(list.find_custom("low c").unwrap().name(), Some("Low C"));
    }

    #[test]
    fn test_malformed_storage_falls_back() {
        let store = MemoryStore::new()
            .with_entry(CUSTOM_TUNINGS_KEY, "{oops")
            .with_entry(FAVOURITE_TUNINGS_KEY, r#"{"tunings":[{"strings":"Eb2"}]}"#);
        let list = list_with(Arc::new(store));
        assert!(list.custom().is_empty());
        assert_eq!(list.favourites().to_vec(), vec![TuningEntry::Instrument(standard())]);
    }

    #[test]
    fn test_tuning_set_dedups() {
        let set: TuningSet = [
            TuningEntry::Instrument(standard()),
            TuningEntry::Instrument(raw("E4 B3 G3 D3 A2 E2")),
            TuningEntry::Chromatic,
            TuningEntry::Chromatic,
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().next().unwrap().name(), Some("Standard"));
    }
}
