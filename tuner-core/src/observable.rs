//! # Observable Module
//!
//! A value that can be read from any thread and watched for changes.
//!
//! Writers replace the whole value at once, so a reader always gets one
//! complete snapshot (an `Arc<T>`), never a half-updated one. Readers only
//! hold the lock long enough to clone the `Arc`.
//!
//! Subscribers receive every new snapshot over a crossbeam channel, in the
//! order the writes happened. Dropped receivers are pruned on the next write.

use crossbeam_channel::{Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// A shared, watchable value. Cloning shares the same underlying value.
#[derive(Debug)]
pub struct Observable<T> {
    inner: Arc<Shared<T>>,
}

#[derive(Debug)]
struct Shared<T> {
    value: RwLock<Arc<T>>,
    subscribers: Mutex<Vec<Sender<Arc<T>>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Shared {
                value: RwLock::new(Arc::new(value)),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The current snapshot.
    pub fn get(&self) -> Arc<T> {
        let guard = self.inner.value.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replaces the value and notifies subscribers.
    pub fn set(&self, value: T) {
        let snapshot = Arc::new(value);
        {
            let mut guard = self.inner.value.write().unwrap_or_else(PoisonError::into_inner);
            *guard = Arc::clone(&snapshot);
        }
        self.notify(snapshot);
    }

    /// A channel that receives every value written after this call.
    pub fn subscribe(&self) -> Receiver<Arc<T>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// A read-only handle onto the same value.
    pub fn reader(&self) -> ObservableReader<T> {
        ObservableReader {
            inner: self.clone(),
        }
    }

    fn notify(&self, snapshot: Arc<T>) {
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(Arc::clone(&snapshot)).is_ok());
    }
}

impl<T: PartialEq> Observable<T> {
    /// Replaces the value only if it differs from the current one.
    ///
    /// Returns whether a write (and notification) happened.
    pub fn set_if_changed(&self, value: T) -> bool {
        if *self.get() == value {
            return false;
        }
        self.set(value);
        true
    }
}

impl<T: Copy> Observable<T> {
    /// The current value, copied out of the snapshot.
    pub fn value(&self) -> T {
        *self.get()
    }
}

/// Read-only view of an [`Observable`], handed to other threads.
#[derive(Debug)]
pub struct ObservableReader<T> {
    inner: Observable<T>,
}

impl<T> Clone for ObservableReader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ObservableReader<T> {
    pub fn get(&self) -> Arc<T> {
        self.inner.get()
    }

    pub fn subscribe(&self) -> Receiver<Arc<T>> {
        self.inner.subscribe()
    }
}

impl<T: Copy> ObservableReader<T> {
    pub fn value(&self) -> T {
        self.inner.value()
    }
}
