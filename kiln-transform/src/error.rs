//! Transform errors and the failure records delivered to visitors

use kiln_execution::{BoxError, Failure, WorkspaceError};
use kiln_types::{AttributeSet, ComponentId};
use std::path::PathBuf;

/// Why a single transform invocation failed.
///
/// Captured into a [`Failure`] and stored as the node's result; never
/// returned directly from graph traversal.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("transform `{transform}` failed on {}", .input.display())]
    Failed {
        transform: String,
        input: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("transform `{transform}` reported output {} which does not exist", .path.display())]
    MissingOutput { transform: String, path: PathBuf },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

/// A node failure as seen by a consumer of an artifact set.
///
/// Wraps the raw cause with the owning component and target attributes.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Failed to transform {input} to match attributes {target}.")]
pub struct TransformFailure {
    pub owner: ComponentId,
    pub target: AttributeSet,
    pub input: String,
    #[source]
    pub cause: Failure,
}

impl TransformFailure {
    pub fn cause(&self) -> &Failure {
        &self.cause
    }
}
