//! Single-flight execution keyed by fingerprint.
//!
//! The first caller for a key runs the work; callers arriving while it runs
//! block and receive a clone of the same outcome. If the leader panics the
//! flight is abandoned and one of the waiters takes over.

use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

enum State<T> {
    Pending,
    Done(T),
    Abandoned,
}

struct Flight<T> {
    state: Mutex<State<T>>,
    changed: Condvar,
}

impl<T: Clone> Flight<T> {
    fn new() -> Self {
        Flight {
            state: Mutex::new(State::Pending),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn settle(&self, state: State<T>) {
        *self.lock() = state;
        self.changed.notify_all();
    }

    /// Block until the leader settles. `None` means the flight was abandoned.
    fn wait(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            match &*state {
                State::Pending => {
                    state = self
                        .changed
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                }
                State::Done(value) => return Some(value.clone()),
                State::Abandoned => return None,
            }
        }
    }
}

/// Marks the flight abandoned unless the leader completes it.
struct LeaderGuard<'a, K: Eq + Hash, T: Clone> {
    flights: &'a DashMap<K, Arc<Flight<T>>>,
    key: &'a K,
    flight: Arc<Flight<T>>,
    completed: bool,
}

impl<K: Eq + Hash, T: Clone> LeaderGuard<'_, K, T> {
    fn complete(&mut self, value: T) {
        self.flight.settle(State::Done(value));
        self.completed = true;
        self.retire();
    }

    fn retire(&self) {
        self.flights
            .remove_if(self.key, |_, f| Arc::ptr_eq(f, &self.flight));
    }
}

impl<K: Eq + Hash, T: Clone> Drop for LeaderGuard<'_, K, T> {
    fn drop(&mut self) {
        if !self.completed {
            self.flight.settle(State::Abandoned);
            self.retire();
        }
    }
}

/// Deduplicates concurrent work per key.
pub struct SingleFlight<K: Eq + Hash, T> {
    flights: DashMap<K, Arc<Flight<T>>>,
}

impl<K: Eq + Hash + Clone, T: Clone> SingleFlight<K, T> {
    pub fn new() -> Self {
        SingleFlight {
            flights: DashMap::new(),
        }
    }

    /// Run `work` for `key` unless a run is already in flight, in which case
    /// wait for it. Returns the outcome and whether this caller ran `work`.
    pub fn run<F>(&self, key: &K, work: F) -> (T, bool)
    where
        F: FnOnce() -> T,
    {
        let flight = loop {
            let (flight, leader) = match self.flights.entry(key.clone()) {
                Entry::Occupied(entry) => (entry.get().clone(), false),
                Entry::Vacant(entry) => {
                    let flight = Arc::new(Flight::new());
                    entry.insert(flight.clone());
                    (flight, true)
                }
            };
            if leader {
                break flight;
            }
            if let Some(value) = flight.wait() {
                return (value, false);
            }
        };

        let mut guard = LeaderGuard {
            flights: &self.flights,
            key,
            flight,
            completed: false,
        };
        let value = work();
        guard.complete(value.clone());
        (value, true)
    }

    /// Number of keys with work in progress.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }
}

impl<K: Eq + Hash + Clone, T: Clone> Default for SingleFlight<K, T> {
    fn default() -> Self {
        Self::new()
    }
}
