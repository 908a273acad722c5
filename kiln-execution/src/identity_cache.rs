//! Compute-once cache keyed by work identity
//!
//! The first caller asking for an identity runs the computation. Everyone
//! else asking for the same identity while it runs blocks on a condition
//! variable and then receives the very same [`Try`]. Once stored, a result
//! (success or failure) is replayed for the lifetime of the cache and never
//! recomputed.

use crate::error::Try;
use dashmap::DashMap;
use kiln_types::Identity;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

enum SlotState<T> {
    Vacant,
    Computing,
    Ready(Try<T>),
}

struct Slot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Slot {
            state: Mutex::new(SlotState::Vacant),
            ready: Condvar::new(),
        }
    }
}

/// Hands the slot back if the computing caller unwinds, so a waiter can take over
struct ComputeGuard<'a, T> {
    slot: &'a Slot<T>,
    identity: &'a Identity,
    completed: bool,
}

impl<T> Drop for ComputeGuard<'_, T> {
    fn drop(&mut self) {
        if !self.completed {
            warn!(identity = %self.identity, "computation unwound, releasing identity");
            *self.slot.state.lock() = SlotState::Vacant;
            self.slot.ready.notify_one();
        }
    }
}

/// Point-in-time view of an identity cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from a stored or in-flight result
    pub hits: u64,
    /// Lookups that ran the computation
    pub misses: u64,
    /// Identities with a slot, whatever its state
    pub entries: usize,
    /// Identities whose computation is running right now
    pub in_flight: usize,
    /// Identities whose stored result is a failure
    pub failed: usize,
}

impl CacheStats {
    /// Share of lookups that did not run a computation (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} identities ({} in flight, {} failed), {} computed, {} replayed",
            self.entries, self.in_flight, self.failed, self.misses, self.hits
        )
    }
}

/// Identity-keyed memo table with coalesced computation
pub struct IdentityCache<T> {
    slots: DashMap<Identity, Arc<Slot<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Clone> IdentityCache<T> {
    pub fn new() -> Self {
        IdentityCache {
            slots: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the stored result for `identity`, computing it first if nobody has.
    ///
    /// `compute` runs without any cache-wide lock held, so it may itself call
    /// `get_or_compute` for other identities.
    pub fn get_or_compute<F>(&self, identity: &Identity, compute: F) -> Try<T>
    where
        F: FnOnce() -> Try<T>,
    {
        let slot = self.slot(identity);

        let mut state = slot.state.lock();
        loop {
            match &*state {
                SlotState::Ready(result) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    trace!(identity = %identity, "identity cache hit");
                    return result.clone();
                }
                SlotState::Computing => {
                    trace!(identity = %identity, "waiting for in-flight computation");
                    slot.ready.wait(&mut state);
                }
                SlotState::Vacant => break,
            }
        }
        *state = SlotState::Computing;
        drop(state);

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(identity = %identity, "computing identity");

        let mut guard = ComputeGuard {
            slot: &slot,
            identity,
            completed: false,
        };
        let result = compute();
        if let Err(failure) = &result {
            debug!(identity = %identity, error = %failure, "computation failed, caching failure");
        }

        *slot.state.lock() = SlotState::Ready(result.clone());
        guard.completed = true;
        slot.ready.notify_all();
        result
    }

    /// The stored result, if the computation for `identity` has finished
    pub fn get_if_present(&self, identity: &Identity) -> Option<Try<T>> {
        let slot = self.slots.get(identity).map(|s| Arc::clone(s.value()))?;
        let state = slot.state.lock();
        match &*state {
            SlotState::Ready(result) => Some(result.clone()),
            _ => None,
        }
    }

    /// Number of identities ever requested
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let slots: Vec<Arc<Slot<T>>> = self.slots.iter().map(|s| Arc::clone(s.value())).collect();
        let mut stats = CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: slots.len(),
            ..CacheStats::default()
        };
        for slot in &slots {
            match &*slot.state.lock() {
                SlotState::Computing => stats.in_flight += 1,
                SlotState::Ready(Err(_)) => stats.failed += 1,
                SlotState::Ready(Ok(_)) | SlotState::Vacant => {}
            }
        }
        stats
    }

    fn slot(&self, identity: &Identity) -> Arc<Slot<T>> {
        if let Some(slot) = self.slots.get(identity) {
            return Arc::clone(slot.value());
        }
        // The shard guard is dropped at the end of this statement, before any
        // computation starts.
        Arc::clone(
            self.slots
                .entry(identity.clone())
                .or_insert_with(|| Arc::new(Slot::new()))
                .value(),
        )
    }
}

impl<T: Clone> Default for IdentityCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for IdentityCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityCache")
            .field("entries", &self.slots.len())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}
