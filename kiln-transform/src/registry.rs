//! Node registry
//!
//! Deduplicates transformation nodes by identity so that the same step applied
//! to the same input is one shared node, wherever it appears in the graph.

use crate::artifact::ResolvableArtifact;
use crate::node::{TransformContext, TransformationNode};
use crate::transform::{TransformStep, TransformationChain};
use dashmap::DashMap;
use kiln_types::Identity;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

pub struct TransformationNodeRegistry {
    context: TransformContext,
    nodes: DashMap<Identity, Arc<TransformationNode>>,
}

impl TransformationNodeRegistry {
    pub fn new(context: TransformContext) -> Self {
        TransformationNodeRegistry {
            context,
            nodes: DashMap::new(),
        }
    }

    pub fn context(&self) -> &TransformContext {
        &self.context
    }

    /// Node applying `step` directly to `artifact`
    pub fn initial(&self, artifact: &ResolvableArtifact, step: &TransformStep) -> Arc<TransformationNode> {
        let identity = TransformationNode::initial_identity(artifact, step);
        self.intern(identity, || {
            TransformationNode::initial(artifact.clone(), step.clone(), self.context.clone())
        })
    }

    /// Node applying `step` to the output of `upstream`
    pub fn chained(&self, upstream: &Arc<TransformationNode>, step: &TransformStep) -> Arc<TransformationNode> {
        let identity = TransformationNode::chained_identity(upstream, step);
        self.intern(identity, || {
            TransformationNode::chained(Arc::clone(upstream), step.clone(), self.context.clone())
        })
    }

    /// Final nodes of `chain` applied to each artifact, in artifact order
    pub fn get_or_create(
        &self,
        artifacts: &[ResolvableArtifact],
        chain: &TransformationChain,
    ) -> Vec<Arc<TransformationNode>> {
        artifacts
            .iter()
            .map(|artifact| {
                let mut node = self.initial(artifact, chain.first());
                for step in &chain.steps()[1..] {
                    node = self.chained(&node, step);
                }
                node
            })
            .collect()
    }

    pub fn get(&self, identity: &Identity) -> Option<Arc<TransformationNode>> {
        self.nodes.get(identity).map(|node| Arc::clone(node.value()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn intern(
        &self,
        identity: Identity,
        create: impl FnOnce() -> TransformationNode,
    ) -> Arc<TransformationNode> {
        let entry = self.nodes.entry(identity).or_insert_with(|| {
            let node = create();
            trace!(node = %node.display_name(), identity = %node.identity(), "registered transformation node");
            Arc::new(node)
        });
        Arc::clone(entry.value())
    }
}

impl fmt::Debug for TransformationNodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformationNodeRegistry")
            .field("context", &self.context)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
