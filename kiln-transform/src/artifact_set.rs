//! Transformed artifact sets
//!
//! A [`TransformedArtifactSet`] is the consumer-facing view of a group of
//! transformation nodes sharing one owner and one target attribute set.
//! Consumers visit it in two phases:
//!
//! 1. [`ResolvedArtifactSet::start_visit`] asks the listener whether contents
//!    are wanted. If they are, every node is executed on the worker pool and
//!    the outcomes are collected into a [`Completion`].
//! 2. [`Completion::complete`] delivers every produced artifact, then every
//!    failure, then the end-of-collection signal.
//!
//! A failing node never stops the visit; its failure is delivered alongside
//! the successes of the other nodes.

use crate::artifact::ResolvableArtifact;
use crate::error::TransformFailure;
use crate::node::TransformationNode;
use crate::registry::TransformationNodeRegistry;
use crate::transform::TransformationChain;
use kiln_execution::WorkerPool;
use kiln_types::{AttributeSet, ComponentId};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Whether a visitor wants the contents of a set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitType {
    Contents,
    NoContents,
}

/// Consulted before any node of a set is executed
pub trait VisitListener {
    fn prepare_for_visit(&mut self, set: &dyn ResolvedArtifactSet) -> VisitType;
}

impl<F> VisitListener for F
where
    F: FnMut(&dyn ResolvedArtifactSet) -> VisitType,
{
    fn prepare_for_visit(&mut self, set: &dyn ResolvedArtifactSet) -> VisitType {
        self(set)
    }
}

/// Receives the outcomes of a visit
pub trait ArtifactVisitor {
    fn visit_artifact(&mut self, owner: &ComponentId, target: &AttributeSet, artifact: &ResolvableArtifact);

    fn visit_failure(&mut self, failure: &TransformFailure);

    fn end_visit_collection(&mut self, owner: &ComponentId, target: &AttributeSet);
}

/// Receives artifacts that are already available locally
pub trait LocalArtifactVisitor {
    fn visit_artifact(&mut self, artifact: &ResolvableArtifact);
}

/// Collects the build dependencies of an artifact set
pub trait DependencyContext {
    fn add(&mut self, dependency: TransformationDependency);
}

impl DependencyContext for Vec<TransformationDependency> {
    fn add(&mut self, dependency: TransformationDependency) {
        self.push(dependency);
    }
}

/// Build dependency on a group of transformation nodes
#[derive(Debug, Clone)]
pub struct TransformationDependency {
    nodes: Vec<Arc<TransformationNode>>,
}

impl TransformationDependency {
    pub fn new(nodes: Vec<Arc<TransformationNode>>) -> Self {
        TransformationDependency { nodes }
    }

    pub fn nodes(&self) -> &[Arc<TransformationNode>] {
        &self.nodes
    }
}

/// A set of artifacts that can be visited
pub trait ResolvedArtifactSet {
    fn owner(&self) -> &ComponentId;

    fn target_attributes(&self) -> &AttributeSet;

    /// First phase of a visit
    fn start_visit(&self, pool: &WorkerPool, listener: &mut dyn VisitListener) -> Completion;

    fn visit_dependencies(&self, context: &mut dyn DependencyContext);

    fn visit_local_artifacts(&self, visitor: &mut dyn LocalArtifactVisitor);

    fn visit_external_artifacts(&self, visitor: &mut dyn FnMut(&ResolvableArtifact));
}

/// Collected outcome of the first visit phase
#[derive(Debug, Clone)]
pub struct Completion {
    owner: ComponentId,
    target: AttributeSet,
    artifacts: Vec<ResolvableArtifact>,
    failures: Vec<TransformFailure>,
}

impl Completion {
    fn empty(owner: ComponentId, target: AttributeSet) -> Self {
        Completion {
            owner,
            target,
            artifacts: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Second visit phase: artifacts, then failures, then end of collection
    pub fn complete(&self, visitor: &mut dyn ArtifactVisitor) {
        for artifact in &self.artifacts {
            visitor.visit_artifact(&self.owner, &self.target, artifact);
        }
        for failure in &self.failures {
            visitor.visit_failure(failure);
        }
        visitor.end_visit_collection(&self.owner, &self.target);
    }

    pub fn artifacts(&self) -> &[ResolvableArtifact] {
        &self.artifacts
    }

    pub fn failures(&self) -> &[TransformFailure] {
        &self.failures
    }

    pub fn into_parts(self) -> (Vec<ResolvableArtifact>, Vec<TransformFailure>) {
        (self.artifacts, self.failures)
    }
}

/// The output of a group of transformation nodes, seen as one artifact set
pub struct TransformedArtifactSet {
    owner: ComponentId,
    target: AttributeSet,
    nodes: Vec<Arc<TransformationNode>>,
}

impl TransformedArtifactSet {
    /// Set over the final nodes of `chain` applied to each artifact
    pub fn new(
        owner: ComponentId,
        artifacts: &[ResolvableArtifact],
        chain: &TransformationChain,
        registry: &TransformationNodeRegistry,
    ) -> Self {
        let nodes = registry.get_or_create(artifacts, chain);
        Self::from_nodes(owner, chain.target_attributes().clone(), nodes)
    }

    pub fn from_nodes(owner: ComponentId, target: AttributeSet, nodes: Vec<Arc<TransformationNode>>) -> Self {
        TransformedArtifactSet { owner, target, nodes }
    }

    pub fn nodes(&self) -> &[Arc<TransformationNode>] {
        &self.nodes
    }

    fn collect(&self) -> Completion {
        let mut completion = Completion::empty(self.owner.clone(), self.target.clone());
        for node in &self.nodes {
            let source = node.source_artifact();
            match node.transformed_subject() {
                Ok(subject) => completion
                    .artifacts
                    .extend(subject.files().iter().map(|file| source.transformed_to(file))),
                Err(cause) => completion.failures.push(TransformFailure {
                    owner: self.owner.clone(),
                    target: self.target.clone(),
                    input: source.display_name(),
                    cause: cause.clone(),
                }),
            }
        }
        completion
    }
}

impl ResolvedArtifactSet for TransformedArtifactSet {
    fn owner(&self) -> &ComponentId {
        &self.owner
    }

    fn target_attributes(&self) -> &AttributeSet {
        &self.target
    }

    fn start_visit(&self, pool: &WorkerPool, listener: &mut dyn VisitListener) -> Completion {
        if listener.prepare_for_visit(self) == VisitType::NoContents {
            debug!(owner = %self.owner, target = %self.target, "contents not requested, skipping nodes");
            return Completion::empty(self.owner.clone(), self.target.clone());
        }

        debug!(
            owner = %self.owner,
            target = %self.target,
            nodes = self.nodes.len(),
            "executing transformation nodes"
        );
        pool.for_each(&self.nodes, |node| node.execute_if_not_already());

        let completion = self.collect();
        if !completion.failures.is_empty() {
            debug!(
                owner = %self.owner,
                failures = completion.failures.len(),
                "transformation nodes failed"
            );
        }
        completion
    }

    fn visit_dependencies(&self, context: &mut dyn DependencyContext) {
        if !self.nodes.is_empty() {
            context.add(TransformationDependency::new(self.nodes.clone()));
        }
    }

    fn visit_local_artifacts(&self, _visitor: &mut dyn LocalArtifactVisitor) {
        panic!("transformed artifact sets have no local artifacts; visit them with start_visit");
    }

    fn visit_external_artifacts(&self, _visitor: &mut dyn FnMut(&ResolvableArtifact)) {
        panic!("transformed artifact sets have no external artifacts; visit them with start_visit");
    }
}

impl fmt::Debug for TransformedArtifactSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformedArtifactSet")
            .field("owner", &self.owner)
            .field("target", &self.target)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeState, TransformContext};
    use crate::transform::{FnTransform, TransformStep};
    use kiln_execution::{BoxError, InMemoryExecutionHistory, MutableWorkspaceProvider, Workspace};
    use std::path::{Path, PathBuf};

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl ArtifactVisitor for Recorder {
        fn visit_artifact(&mut self, _owner: &ComponentId, _target: &AttributeSet, artifact: &ResolvableArtifact) {
            self.events.push(format!("artifact {}", artifact.name()));
        }

        fn visit_failure(&mut self, failure: &TransformFailure) {
            self.events.push(format!("failure {}", failure.input));
        }

        fn end_visit_collection(&mut self, owner: &ComponentId, _target: &AttributeSet) {
            self.events.push(format!("end {owner}"));
        }
    }

    fn set(dir: &Path) -> TransformedArtifactSet {
        let registry = TransformationNodeRegistry::new(TransformContext::new(Arc::new(
            MutableWorkspaceProvider::new(dir.join("transforms"), Arc::new(InMemoryExecutionHistory::new())),
        )));
        let transform = FnTransform::new(
            "rename",
            |input: &Path, workspace: &Workspace| -> Result<Vec<PathBuf>, BoxError> {
                let out = workspace.resolve(format!("{}.out", input.file_name().unwrap().to_string_lossy()));
                std::fs::write(&out, "out")?;
                Ok(vec![out])
            },
        );
        let chain = TransformationChain::new(TransformStep::new(
            Arc::new(transform),
            AttributeSet::new().with("kind", "renamed"),
        ));
        let owner = ComponentId::new("com.acme:app:1.0");
        let artifacts: Vec<_> = ["a.jar", "b.jar"]
            .iter()
            .map(|name| {
                let file = dir.join(name);
                std::fs::write(&file, name).unwrap();
                ResolvableArtifact::new(owner.clone(), file)
            })
            .collect();
        TransformedArtifactSet::new(owner, &artifacts, &chain, &registry)
    }

    #[test]
    fn test_contents_visit_delivers_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let set = set(dir.path());
        let pool = WorkerPool::new(2).unwrap();

        let mut wants = |_: &dyn ResolvedArtifactSet| VisitType::Contents;
        let completion = set.start_visit(&pool, &mut wants);
        let mut recorder = Recorder::default();
        completion.complete(&mut recorder);

        assert_eq!(
            recorder.events,
            vec!["artifact a.jar.out", "artifact b.jar.out", "end com.acme:app:1.0"]
        );
        assert!(completion.failures().is_empty());
    }

    #[test]
    fn test_no_contents_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let set = set(dir.path());
        let pool = WorkerPool::new(2).unwrap();

        let mut skip = |set: &dyn ResolvedArtifactSet| {
            assert_eq!(set.target_attributes().get("kind"), Some("renamed"));
            VisitType::NoContents
        };
        let completion = set.start_visit(&pool, &mut skip);
        let mut recorder = Recorder::default();
        completion.complete(&mut recorder);

        assert_eq!(recorder.events, vec!["end com.acme:app:1.0"]);
        assert!(set
            .nodes()
            .iter()
            .all(|node| node.state() == NodeState::Unmaterialized));
    }

    #[test]
    fn test_dependencies_only_when_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        let set = set(dir.path());
        let empty = TransformedArtifactSet::from_nodes(
            ComponentId::new("empty"),
            AttributeSet::new(),
            Vec::new(),
        );

        let mut deps = Vec::new();
        set.visit_dependencies(&mut deps);
        empty.visit_dependencies(&mut deps);

        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].nodes().len(), 2);
    }

    #[test]
    #[should_panic(expected = "no local artifacts")]
    fn test_local_artifacts_unsupported() {
        struct Ignore;
        impl LocalArtifactVisitor for Ignore {
            fn visit_artifact(&mut self, _: &ResolvableArtifact) {}
        }
        let set = TransformedArtifactSet::from_nodes(ComponentId::new("x"), AttributeSet::new(), Vec::new());
        set.visit_local_artifacts(&mut Ignore);
    }

    #[test]
    #[should_panic(expected = "no external artifacts")]
    fn test_external_artifacts_unsupported() {
        let set = TransformedArtifactSet::from_nodes(ComponentId::new("x"), AttributeSet::new(), Vec::new());
        set.visit_external_artifacts(&mut |_: &ResolvableArtifact| {});
    }
}
