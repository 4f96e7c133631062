//! Duplicate-load suppression.
//!
//! Consecutive planning passes can want the same sector or mesh file while
//! an earlier load is still in flight. The coalescer tracks in-flight loads
//! by key so only one fetch + decode runs per key; every later request waits
//! on a broadcast of the same outcome instead of repeating the work.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

/// A single outcome is ever broadcast per channel; the capacity only has to
/// absorb subscriber churn.
const RESULT_CHANNEL_CAPACITY: usize = 4;

/// What `register` decided for a request.
pub enum Registration<T> {
    /// First request for this key. The caller performs the load and must
    /// call [`LoadCoalescer::complete`] with the outcome, success or not.
    Lead,
    /// A load for this key is already running; await the shared outcome.
    /// A closed channel means the lead went away without completing.
    Wait(broadcast::Receiver<T>),
}

impl<T> Registration<T> {
    pub fn is_lead(&self) -> bool {
        matches!(self, Registration::Lead)
    }
}

/// Counters for judging how much duplicate work coalescing absorbed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Requests seen in total.
    pub requests: u64,
    /// Requests that waited on an in-flight load.
    pub coalesced: u64,
    /// Requests that started a load of their own.
    pub started: u64,
}

impl CoalescerStats {
    /// Fraction of requests absorbed by an in-flight load, 0.0 to 1.0.
    pub fn coalesced_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.coalesced as f64 / self.requests as f64
        }
    }
}

/// Tracks in-flight loads keyed by `K`, broadcasting each outcome `T` to
/// every request that arrived while the load ran.
pub struct LoadCoalescer<K, T> {
    in_flight: DashMap<K, broadcast::Sender<T>>,
    requests: AtomicU64,
    coalesced: AtomicU64,
    started: AtomicU64,
}

impl<K, T> LoadCoalescer<K, T>
where
    K: Eq + Hash + Clone + Display,
    T: Clone,
{
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
            requests: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            started: AtomicU64::new(0),
        }
    }

    /// Register a request for `key`.
    ///
    /// The entry API makes the check-and-insert atomic, so exactly one of
    /// any number of concurrent registrations for the same key leads.
    pub fn register(&self, key: K) -> Registration<T> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        match self.in_flight.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let rx = entry.get().subscribe();
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(key = %entry.key(), "coalescing onto in-flight load");
                Registration::Wait(rx)
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let (tx, _rx) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
                entry.insert(tx);
                self.started.fetch_add(1, Ordering::Relaxed);
                Registration::Lead
            }
        }
    }

    /// Broadcast the outcome of `key`'s load and clear its in-flight entry.
    ///
    /// Returns how many waiters were notified. Dropped waiters are ignored.
    pub fn complete(&self, key: &K, outcome: T) -> usize {
        match self.in_flight.remove(key) {
            Some((key, tx)) => {
                let waiters = tx.receiver_count();
                let _ = tx.send(outcome);
                if waiters > 0 {
                    debug!(key = %key, waiters, "broadcast load outcome to waiters");
                }
                waiters
            }
            None => 0,
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            requests: self.requests.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
        }
    }
}

impl<K, T> Default for LoadCoalescer<K, T>
where
    K: Eq + Hash + Clone + Display,
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
