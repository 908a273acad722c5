//! Per-identity workspaces
//!
//! Every identity gets its own directory under a reserved base directory.
//! The path is a pure function of the base directory and the identity's
//! unique id. Nothing else writes under the base directory, so it can be
//! cleaned up in bulk.

use crate::config::ExecutionConfig;
use crate::history::ExecutionHistoryStore;
use crate::identity_cache::IdentityCache;
use kiln_types::Identity;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

/// A directory exclusively scoped to one identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    relative_path: String,
    dir: PathBuf,
}

impl Workspace {
    /// Path of the workspace relative to the base directory
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a file name inside the workspace
    pub fn resolve(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.join(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A location owned by one subsystem; nobody else writes under it
pub trait ReservedFileSystemLocation {
    fn reserved_location(&self) -> &Path;
}

/// Hands out workspaces and the compute-once cache guarding them
pub trait WorkspaceProvider: ReservedFileSystemLocation + Send + Sync {
    /// Resolve the workspace for `identity`, creating its directory
    fn workspace_for(&self, identity: &Identity) -> Result<Workspace, WorkspaceError>;

    /// Cache of produced files, keyed by the identity of the work producing them
    fn identity_cache(&self) -> &IdentityCache<Vec<PathBuf>>;

    /// History store associated 1:1 with this provider
    fn execution_history(&self) -> &dyn ExecutionHistoryStore;

    /// Run `action` inside the workspace for `identity` and return its result.
    ///
    /// This does not memoize; pair it with [`WorkspaceProvider::identity_cache`].
    fn with_workspace<T, F>(&self, identity: &Identity, action: F) -> Result<T, WorkspaceError>
    where
        Self: Sized,
        F: FnOnce(&Workspace) -> T,
    {
        let workspace = self.workspace_for(identity)?;
        Ok(action(&workspace))
    }
}

impl<P: ReservedFileSystemLocation + ?Sized> ReservedFileSystemLocation for Arc<P> {
    fn reserved_location(&self) -> &Path {
        (**self).reserved_location()
    }
}

impl<P: WorkspaceProvider + ?Sized> WorkspaceProvider for Arc<P> {
    fn workspace_for(&self, identity: &Identity) -> Result<Workspace, WorkspaceError> {
        (**self).workspace_for(identity)
    }

    fn identity_cache(&self) -> &IdentityCache<Vec<PathBuf>> {
        (**self).identity_cache()
    }

    fn execution_history(&self) -> &dyn ExecutionHistoryStore {
        (**self).execution_history()
    }
}

/// Workspace provider for work whose outputs live for the current build
pub struct MutableWorkspaceProvider {
    base_dir: PathBuf,
    identity_cache: IdentityCache<Vec<PathBuf>>,
    history: Arc<dyn ExecutionHistoryStore>,
}

impl MutableWorkspaceProvider {
    pub fn new(base_dir: impl Into<PathBuf>, history: Arc<dyn ExecutionHistoryStore>) -> Self {
        MutableWorkspaceProvider {
            base_dir: base_dir.into(),
            identity_cache: IdentityCache::new(),
            history,
        }
    }

    /// Build a provider rooted at the configured base directory
    pub fn from_config(
        config: &ExecutionConfig,
        project_root: &Path,
        history: Arc<dyn ExecutionHistoryStore>,
    ) -> Self {
        Self::new(config.workspace_base_dir_in(project_root), history)
    }

    /// Workspace path for `identity`, without touching the filesystem
    pub fn workspace_path(&self, identity: &Identity) -> PathBuf {
        self.base_dir.join(identity.unique_id())
    }
}

impl ReservedFileSystemLocation for MutableWorkspaceProvider {
    fn reserved_location(&self) -> &Path {
        &self.base_dir
    }
}

impl WorkspaceProvider for MutableWorkspaceProvider {
    fn workspace_for(&self, identity: &Identity) -> Result<Workspace, WorkspaceError> {
        let dir = self.workspace_path(identity);
        std::fs::create_dir_all(&dir).map_err(|source| WorkspaceError::Io {
            path: dir.clone(),
            source,
        })?;
        trace!(identity = %identity, dir = %dir.display(), "resolved workspace");
        Ok(Workspace {
            relative_path: identity.unique_id().to_string(),
            dir,
        })
    }

    fn identity_cache(&self) -> &IdentityCache<Vec<PathBuf>> {
        &self.identity_cache
    }

    fn execution_history(&self) -> &dyn ExecutionHistoryStore {
        &*self.history
    }
}

impl fmt::Debug for MutableWorkspaceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableWorkspaceProvider")
            .field("base_dir", &self.base_dir)
            .field("identity_cache", &self.identity_cache)
            .finish_non_exhaustive()
    }
}
