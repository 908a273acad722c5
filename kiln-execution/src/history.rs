//! Execution history storage
//!
//! The history store is owned by whoever compares previous and current
//! executions. Workspace providers only carry it alongside their workspaces.

use dashmap::DashMap;
use std::fmt;

/// Opaque key-value store of previous execution state
pub trait ExecutionHistoryStore: Send + Sync {
    fn load(&self, key: &str) -> Option<Vec<u8>>;

    fn store(&self, key: &str, state: Vec<u8>);

    fn remove(&self, key: &str);
}

/// History store that lives for the duration of one process
#[derive(Default)]
pub struct InMemoryExecutionHistory {
    entries: DashMap<String, Vec<u8>>,
}

impl InMemoryExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ExecutionHistoryStore for InMemoryExecutionHistory {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn store(&self, key: &str, state: Vec<u8>) {
        self.entries.insert(key.to_string(), state);
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

impl fmt::Debug for InMemoryExecutionHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryExecutionHistory")
            .field("entries", &self.entries.len())
            .finish()
    }
}
