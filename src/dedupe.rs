//! Duplicate request merging.
//!
//! The registry guarantees at most one in-flight execution per signature.
//! The first caller to [`join`](InFlightRegistry::join) becomes the leader
//! and runs the transport call; everyone else becomes a waiter on an
//! explicit waiter list. When the leader settles, the registry entry is
//! removed first and the outcome is then broadcast to every waiter, so a
//! later request with the same signature starts fresh. This is strictly
//! in-flight deduplication — response reuse over time is the cache's job.

use crate::signature::RequestSignature;
use crate::util::lock_unpoisoned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, Notify};

struct Entry<T> {
    waiters: Vec<oneshot::Sender<T>>,
    cancel: Arc<Notify>,
}

/// Result of joining the registry for a signature.
pub(crate) enum Joined<T> {
    /// No execution is in flight for this signature; the caller must run it
    /// and [`settle`](InFlightRegistry::settle). `cancel` fires when the
    /// request is cancelled; `rx` delivers the settled outcome like any
    /// other waiter's receiver.
    Leader {
        rx: oneshot::Receiver<T>,
        cancel: Arc<Notify>,
    },
    /// An execution is already in flight; `rx` delivers its outcome.
    Waiter { rx: oneshot::Receiver<T> },
}

/// Registry of in-flight executions keyed by request signature.
pub(crate) struct InFlightRegistry<T> {
    entries: Mutex<HashMap<RequestSignature, Entry<T>>>,
}

impl<T: Clone> InFlightRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Registers interest in `signature`, becoming the leader if nothing is
    /// in flight for it.
    pub(crate) fn join(&self, signature: &RequestSignature) -> Joined<T> {
        let mut entries = lock_unpoisoned(&self.entries);
        let (tx, rx) = oneshot::channel();
        match entries.get_mut(signature) {
            Some(entry) => {
                tracing::debug!(signature = %signature, "merged into in-flight request");
                entry.waiters.push(tx);
                Joined::Waiter { rx }
            }
            None => {
                let cancel = Arc::new(Notify::new());
                entries.insert(
                    signature.clone(),
                    Entry {
                        waiters: vec![tx],
                        cancel: Arc::clone(&cancel),
                    },
                );
                Joined::Leader { rx, cancel }
            }
        }
    }

    /// Settles the in-flight execution for `signature`, broadcasting the
    /// outcome to every waiter. The entry is removed before the broadcast.
    pub(crate) fn settle(&self, signature: &RequestSignature, outcome: T) {
        let entry = lock_unpoisoned(&self.entries).remove(signature);
        if let Some(entry) = entry {
            for waiter in entry.waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
    }

    /// Signals cancellation of the in-flight execution for `signature`.
    ///
    /// The leader observes the signal and settles with a cancelled outcome;
    /// returns `false` if nothing was in flight.
    pub(crate) fn cancel(&self, signature: &RequestSignature) -> bool {
        let entries = lock_unpoisoned(&self.entries);
        match entries.get(signature) {
            Some(entry) => {
                entry.cancel.notify_one();
                true
            }
            None => false,
        }
    }

    /// Signals cancellation of every in-flight execution. Returns how many
    /// were signalled.
    pub(crate) fn cancel_all(&self) -> usize {
        let entries = lock_unpoisoned(&self.entries);
        for entry in entries.values() {
            entry.cancel.notify_one();
        }
        entries.len()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        lock_unpoisoned(&self.entries).len()
    }
}
