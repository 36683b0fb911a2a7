//! # Sync Module
//!
//! Keeps the tuner's active tuning and the tuning list's current selection
//! in agreement without either component knowing about the other.
//!
//! [`TuningSync`] subscribes to both "current tuning" signals. Each call to
//! [`TuningSync::pump`] forwards the newest change from one side to the
//! other. A value is only forwarded when it differs structurally from what
//! the target already holds; that check is what stops a change from
//! bouncing back and forth forever.

use crossbeam_channel::Receiver;
use std::sync::Arc;
use tracing::debug;

use crate::tuner::Tuner;
use crate::tuning::TuningEntry;
use crate::tuning_list::TuningList;

pub struct TuningSync {
    from_tuner: Receiver<Arc<TuningEntry>>,
    from_list: Receiver<Arc<TuningEntry>>,
}

impl TuningSync {
    /// Subscribes to both sides and aligns the tuner with the list's
    /// current selection, which is the side restored from storage.
    pub fn attach(tuner: &mut Tuner, list: &TuningList) -> Self {
        let sync = Self {
            from_tuner: tuner.entry_changes(),
            from_list: list.current_changes(),
        };
        let current = list.current();
        if *tuner.entry() != *current {
            tuner.set_entry(current.as_ref().clone());
        }
        // Drain the notification caused by the initial alignment.
        let _ = sync.from_tuner.try_iter().count();
        sync
    }

    /// Forwards pending changes until both sides are quiet.
    ///
    /// When both sides changed since the last pump, the list's selection
    /// wins. The notification caused by each forwarded write is drained so
    /// it is not mistaken for a new change. Returns the number of values
    /// forwarded.
    pub fn pump(&mut self, tuner: &mut Tuner, list: &mut TuningList) -> usize {
        let mut forwarded = 0;
        loop {
            let tuner_changed = self.from_tuner.try_iter().count() > 0;
            let list_changed = self.from_list.try_iter().count() > 0;

            if list_changed {
                let entry = list.current();
                if *tuner.entry() != *entry {
                    debug!("Sync: list -> tuner {}", entry);
                    tuner.set_entry(entry.as_ref().clone());
                    let _ = self.from_tuner.try_iter().count();
                    forwarded += 1;
                }
            } else if tuner_changed {
                let entry = tuner.entry();
                if *list.current() != *entry {
                    debug!("Sync: tuner -> list {}", entry);
                    list.set_current(entry.as_ref().clone());
                    let _ = self.from_list.try_iter().count();
                    forwarded += 1;
                }
            } else {
                return forwarded;
            }
        }
    }
}
