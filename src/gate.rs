//! Concurrency gate limiting the number of in-flight transport calls.
//!
//! Callers [`acquire`](ConcurrencyGate::acquire) a [`Permit`] before running
//! a transport exchange; at the limit they park in a FIFO queue. Releasing a
//! permit hands the freed slot to the head of the queue inside the same lock
//! region, so a newly arriving `acquire` can never jump ahead of a parked
//! waiter and no slot is ever leaked.

use crate::util::lock_unpoisoned;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

struct GateState {
    limit: usize,
    in_flight: usize,
    waiters: VecDeque<oneshot::Sender<Permit>>,
}

struct GateInner {
    state: Mutex<GateState>,
}

impl GateInner {
    fn release(self: &Arc<Self>) {
        let mut state = lock_unpoisoned(&self.state);
        // Hand the slot to the longest-waiting caller unless the limit was
        // lowered below the current in-flight count. The permit itself
        // travels through the channel: if the receiver is dropped before
        // polling it, the in-channel permit's own drop releases the slot
        // again, so an abandoned handoff can never leak.
        while state.in_flight <= state.limit {
            let Some(waiter) = state.waiters.pop_front() else {
                break;
            };
            let permit = Permit {
                gate: Arc::clone(self),
            };
            match waiter.send(permit) {
                Ok(()) => return,
                Err(permit) => {
                    // The receiver was already gone; the slot is still ours.
                    // Dropping the permit here would re-enter this lock.
                    std::mem::forget(permit);
                }
            }
        }
        state.in_flight -= 1;
    }
}

/// FIFO-fair limiter on concurrent transport calls.
///
/// Cloning is cheap and all clones share the same state.
#[derive(Clone)]
pub struct ConcurrencyGate {
    inner: Arc<GateInner>,
}

/// A held slot in the gate. Dropping it releases the slot exactly once.
pub struct Permit {
    gate: Arc<GateInner>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit").finish()
    }
}

impl ConcurrencyGate {
    /// Creates a gate allowing `limit` concurrent holders.
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(GateInner {
                state: Mutex::new(GateState {
                    limit,
                    in_flight: 0,
                    waiters: VecDeque::new(),
                }),
            }),
        }
    }

    /// Acquires a slot, suspending in FIFO order when the gate is full.
    pub async fn acquire(&self) -> Permit {
        loop {
            let rx = {
                let mut state = lock_unpoisoned(&self.inner.state);
                if state.in_flight < state.limit {
                    state.in_flight += 1;
                    return Permit {
                        gate: Arc::clone(&self.inner),
                    };
                }
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                rx
            };
            // A handed-off permit arrives here; the in-flight count already
            // accounts for us. A closed channel means the gate never sent
            // one, so go around and queue again.
            if let Ok(permit) = rx.await {
                return permit;
            }
        }
    }

    /// Changes the limit.
    ///
    /// Raising it resumes eligible queued waiters immediately; lowering it
    /// never preempts requests already executing — the gate simply stops
    /// handing out slots until enough holders release.
    pub fn set_limit(&self, limit: usize) {
        let mut state = lock_unpoisoned(&self.inner.state);
        state.limit = limit;
        while state.in_flight < state.limit {
            let Some(waiter) = state.waiters.pop_front() else {
                break;
            };
            state.in_flight += 1;
            let permit = Permit {
                gate: Arc::clone(&self.inner),
            };
            if let Err(permit) = waiter.send(permit) {
                state.in_flight -= 1;
                // See release(): dropping would re-enter the held lock.
                std::mem::forget(permit);
            }
        }
    }

    /// The configured limit.
    pub fn limit(&self) -> usize {
        lock_unpoisoned(&self.inner.state).limit
    }

    /// Number of slots currently held.
    pub fn in_flight(&self) -> usize {
        lock_unpoisoned(&self.inner.state).in_flight
    }

    /// Number of callers parked waiting for a slot.
    pub fn queued(&self) -> usize {
        lock_unpoisoned(&self.inner.state).waiters.len()
    }
}
