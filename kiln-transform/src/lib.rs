//! Kiln Artifact Transforms
//!
//! A lazily evaluated graph of artifact transforms built on
//! [`kiln_execution`]. Each [`TransformationNode`] applies one
//! [`TransformStep`] to a raw artifact or to another node's output, runs at
//! most once, and keeps its outcome, success or failure, for every later
//! reader. Consumers see groups of nodes as a [`TransformedArtifactSet`]
//! visited in two phases.
//!
//! ```text
//! artifact ─► node(unzip) ─► node(instrument) ─┐
//! artifact ─► node(unzip) ─► node(instrument) ─┴─► TransformedArtifactSet ─► visitor
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_transform::prelude::*;
//!
//! let registry = TransformationNodeRegistry::new(TransformContext::new(workspaces));
//! let chain = TransformationChain::new(unzip).then(instrument);
//! let set = TransformedArtifactSet::new(owner, &artifacts, &chain, &registry);
//!
//! let completion = set.start_visit(&pool, &mut |_: &dyn ResolvedArtifactSet| VisitType::Contents);
//! completion.complete(&mut visitor);
//! ```

#![warn(missing_debug_implementations)]

pub mod artifact;
pub mod artifact_set;
pub mod error;
pub mod node;
pub mod registry;
pub mod transform;

pub use artifact::ResolvableArtifact;
pub use artifact_set::{
    ArtifactVisitor, Completion, DependencyContext, LocalArtifactVisitor, ResolvedArtifactSet,
    TransformationDependency, TransformedArtifactSet, VisitListener, VisitType,
};
pub use error::{TransformError, TransformFailure};
pub use node::{NodeState, TransformContext, TransformationNode, TransformationSubject, Upstream};
pub use registry::TransformationNodeRegistry;
pub use transform::{FnTransform, Transform, TransformStep, TransformationChain};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifact::ResolvableArtifact;
    pub use crate::artifact_set::{
        ArtifactVisitor, Completion, ResolvedArtifactSet, TransformedArtifactSet, VisitType,
    };
    pub use crate::error::TransformFailure;
    pub use crate::node::{TransformContext, TransformationNode};
    pub use crate::registry::TransformationNodeRegistry;
    pub use crate::transform::{Transform, TransformStep, TransformationChain};
}
