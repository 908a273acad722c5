//! Relevant input listeners
//!
//! Before a unit of work runs, the engine broadcasts the relevant subset of
//! its file inputs (the source inputs) to every registered listener.
//! Registration may change while a broadcast is in progress: each broadcast
//! works on a copy of the listener list taken when it starts.

use crate::error::BoxError;
use crate::snapshot::FileCollection;
use kiln_types::Identity;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Observer of the relevant file inputs of each unit of work
pub trait RelevantInputListener: Send + Sync {
    /// Called before `identity` executes.
    ///
    /// `inputs` may be only the relevant subset of the work's inputs, e.g. when
    /// some source properties are empty.
    fn handle_relevant_inputs_of(&self, identity: &Identity, inputs: &FileCollection) -> Result<(), BoxError>;
}

impl<F> RelevantInputListener for F
where
    F: Fn(&Identity, &FileCollection) -> Result<(), BoxError> + Send + Sync,
{
    fn handle_relevant_inputs_of(&self, identity: &Identity, inputs: &FileCollection) -> Result<(), BoxError> {
        self(identity, inputs)
    }
}

/// Handle returned on registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A broadcast where at least one listener failed.
///
/// Every listener was still invoked; `source` is the first failure seen.
#[derive(Debug, thiserror::Error)]
#[error("{failed} relevant input listener(s) failed for {identity}")]
pub struct BroadcastError {
    pub identity: Identity,
    pub failed: usize,
    #[source]
    pub source: BoxError,
}

type Entry = (ListenerId, Arc<dyn RelevantInputListener>);

/// Registry of relevant input listeners
#[derive(Default)]
pub struct RelevantInputListeners {
    listeners: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
}

impl RelevantInputListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn RelevantInputListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Returns false if the listener was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Notify every listener, in registration order, of `identity`'s relevant inputs.
    ///
    /// A failing listener does not stop delivery to the rest.
    pub fn broadcast_relevant_inputs_of(
        &self,
        identity: &Identity,
        inputs: &FileCollection,
    ) -> Result<(), BroadcastError> {
        let snapshot: Vec<Entry> = self.listeners.read().clone();

        let mut first_failure = None;
        let mut failed = 0;
        for (id, listener) in &snapshot {
            if let Err(err) = listener.handle_relevant_inputs_of(identity, inputs) {
                warn!(identity = %identity, listener = ?id, error = %err, "relevant input listener failed");
                failed += 1;
                first_failure.get_or_insert(err);
            }
        }
        debug!(identity = %identity, listeners = snapshot.len(), failed, "broadcast relevant inputs");

        match first_failure {
            Some(source) => Err(BroadcastError {
                identity: identity.clone(),
                failed,
                source,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for RelevantInputListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelevantInputListeners")
            .field("listeners", &self.len())
            .finish()
    }
}

static GLOBAL: RwLock<Option<Arc<RelevantInputListeners>>> = parking_lot::const_rwlock(None);

/// Install the process-wide registry, returning the one it replaces
pub fn install_global(registry: Arc<RelevantInputListeners>) -> Option<Arc<RelevantInputListeners>> {
    GLOBAL.write().replace(registry)
}

/// The process-wide registry, if one is installed
pub fn global() -> Option<Arc<RelevantInputListeners>> {
    GLOBAL.read().clone()
}

/// Remove the process-wide registry
pub fn teardown_global() -> Option<Arc<RelevantInputListeners>> {
    GLOBAL.write().take()
}
