//! Kiln Execution Core
//!
//! This crate provides the caching layer that sits underneath every unit of
//! work in a kiln build: it guarantees that the work for a given
//! [`Identity`] runs at most once, gives that work an exclusive scratch
//! directory, and captures declared outputs as immutable snapshots.
//!
//! # Architecture
//!
//! ```text
//! Identity ─► IdentityCache::get_or_compute ─► WorkspaceProvider::with_workspace ─► work
//!                                                                                   │
//!                               OutputSnapshotter::snapshot_outputs ◄───────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Compute-once cache**: concurrent requests for one identity are coalesced
//!   and all callers receive the same [`Try`], failures included
//! - **Workspaces**: a directory per identity under a reserved base directory
//! - **Output snapshots**: declared outputs captured as a sorted, total map
//! - **Listener broadcast**: observers see a work's relevant inputs before it runs
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_execution::{IdentityCache, Identity};
//!
//! let cache = IdentityCache::<u32>::new();
//! let id = Identity::from_components(&[b"compile", b"src/lib.rs"]);
//!
//! let first = cache.get_or_compute(&id, || Ok(42));
//! // Replayed, the closure is not called again
//! let second = cache.get_or_compute(&id, || unreachable!());
//! ```

#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod history;
pub mod identity_cache;
pub mod listeners;
pub mod pool;
pub mod snapshot;
pub mod telemetry;
pub mod workspace;

pub use config::{ConfigError, ExecutionConfig};
pub use error::{BoxError, Failure, Try};
pub use history::{ExecutionHistoryStore, InMemoryExecutionHistory};
pub use identity_cache::{CacheStats, IdentityCache};
pub use kiln_types::{AttributeSet, ComponentId, Identity, TreeType};
pub use listeners::{BroadcastError, ListenerId, RelevantInputListener, RelevantInputListeners};
pub use pool::{PoolError, WorkerPool};
pub use snapshot::{
    ContentHash, FileCollection, FileCollectionSnapshotter, FileSystemSnapshot, HashingSnapshotter,
    OutputProperty, OutputSnapshot, OutputSnapshotter, SnapshotError, UnitOfWork,
};
pub use workspace::{
    MutableWorkspaceProvider, ReservedFileSystemLocation, Workspace, WorkspaceError,
    WorkspaceProvider,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Failure, Try};
    pub use crate::identity_cache::IdentityCache;
    pub use crate::snapshot::{FileCollection, OutputSnapshotter, UnitOfWork};
    pub use crate::workspace::{MutableWorkspaceProvider, WorkspaceProvider};
    pub use kiln_types::{AttributeSet, ComponentId, Identity, TreeType};
}
