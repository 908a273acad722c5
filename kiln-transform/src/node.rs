//! Transformation nodes
//!
//! A node applies one [`TransformStep`] to one upstream input, which is either
//! a raw artifact or another node's output. Nodes are lazy: nothing runs until
//! [`TransformationNode::execute_if_not_already`] or
//! [`TransformationNode::transformed_subject`] is called, and the transform
//! runs at most once over the node's lifetime. The outcome, success or
//! failure, is stored and returned to every later caller.
//!
//! Each input file is executed through the workspace provider's identity
//! cache, so two distinct nodes that apply the same step to the same file
//! share one execution.

use crate::artifact::ResolvableArtifact;
use crate::error::TransformError;
use crate::transform::TransformStep;
use kiln_execution::{ExecutionConfig, Failure, Try, WorkspaceProvider};
use kiln_types::{AttributeSet, Identity};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

/// Ordered output files of one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformationSubject {
    files: Vec<PathBuf>,
}

impl TransformationSubject {
    pub fn new(files: Vec<PathBuf>) -> Self {
        TransformationSubject { files }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Services shared by every node of a graph
#[derive(Clone)]
pub struct TransformContext {
    workspaces: Arc<dyn WorkspaceProvider>,
    fail_on_missing_outputs: bool,
}

impl TransformContext {
    pub fn new(workspaces: Arc<dyn WorkspaceProvider>) -> Self {
        TransformContext {
            workspaces,
            fail_on_missing_outputs: true,
        }
    }

    pub fn from_config(config: &ExecutionConfig, workspaces: Arc<dyn WorkspaceProvider>) -> Self {
        TransformContext {
            workspaces,
            fail_on_missing_outputs: config.fail_on_missing_outputs,
        }
    }

    pub fn workspaces(&self) -> &Arc<dyn WorkspaceProvider> {
        &self.workspaces
    }
}

impl fmt::Debug for TransformContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformContext")
            .field("reserved_location", &self.workspaces.reserved_location())
            .field("fail_on_missing_outputs", &self.fail_on_missing_outputs)
            .finish()
    }
}

/// Where a node takes its input from
#[derive(Debug, Clone)]
pub enum Upstream {
    Artifact(ResolvableArtifact),
    Node(Arc<TransformationNode>),
}

/// Observable lifecycle of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unmaterialized,
    Executing,
    Succeeded,
    Failed,
}

pub struct TransformationNode {
    identity: Identity,
    upstream: Upstream,
    step: TransformStep,
    /// The artifact at the start of the chain this node belongs to
    source: ResolvableArtifact,
    context: TransformContext,
    started: AtomicBool,
    result: OnceLock<Try<TransformationSubject>>,
}

impl TransformationNode {
    /// First stage of a chain, consuming a raw artifact
    pub fn initial(artifact: ResolvableArtifact, step: TransformStep, context: TransformContext) -> Self {
        let identity = Self::initial_identity(&artifact, &step);
        TransformationNode {
            identity,
            upstream: Upstream::Artifact(artifact.clone()),
            step,
            source: artifact,
            context,
            started: AtomicBool::new(false),
            result: OnceLock::new(),
        }
    }

    /// Later stage of a chain, consuming `upstream`'s output
    pub fn chained(upstream: Arc<TransformationNode>, step: TransformStep, context: TransformContext) -> Self {
        let identity = Self::chained_identity(&upstream, &step);
        TransformationNode {
            identity,
            source: upstream.source.clone(),
            upstream: Upstream::Node(upstream),
            step,
            context,
            started: AtomicBool::new(false),
            result: OnceLock::new(),
        }
    }

    pub(crate) fn initial_identity(artifact: &ResolvableArtifact, step: &TransformStep) -> Identity {
        Identity::from_components(&[
            b"initial",
            step.fingerprint().as_bytes(),
            artifact.file().as_os_str().as_encoded_bytes(),
        ])
    }

    pub(crate) fn chained_identity(upstream: &TransformationNode, step: &TransformStep) -> Identity {
        Identity::from_components(&[
            b"chained",
            step.fingerprint().as_bytes(),
            upstream.identity.unique_id().as_bytes(),
        ])
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn source_artifact(&self) -> &ResolvableArtifact {
        &self.source
    }

    pub fn step(&self) -> &TransformStep {
        &self.step
    }

    pub fn target_attributes(&self) -> &AttributeSet {
        self.step.target_attributes()
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    pub fn upstream_node(&self) -> Option<&Arc<TransformationNode>> {
        match &self.upstream {
            Upstream::Node(node) => Some(node),
            Upstream::Artifact(_) => None,
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} of {}", self.step.display_name(), self.source)
    }

    pub fn state(&self) -> NodeState {
        match self.result.get() {
            Some(Ok(_)) => NodeState::Succeeded,
            Some(Err(_)) => NodeState::Failed,
            None if self.started.load(Ordering::Acquire) => NodeState::Executing,
            None => NodeState::Unmaterialized,
        }
    }

    /// Run the transform unless this node already has a result
    pub fn execute_if_not_already(&self) {
        self.transformed_subject();
    }

    /// The node's result, materializing it first if needed.
    ///
    /// Concurrent callers block until the single execution finishes.
    pub fn transformed_subject(&self) -> &Try<TransformationSubject> {
        self.result.get_or_init(|| {
            self.started.store(true, Ordering::Release);
            debug!(node = %self.display_name(), identity = %self.identity, "executing transformation node");
            self.materialize()
        })
    }

    /// The node's result, if it has already been materialized
    pub fn result_if_materialized(&self) -> Option<&Try<TransformationSubject>> {
        self.result.get()
    }

    fn materialize(&self) -> Try<TransformationSubject> {
        let inputs = match &self.upstream {
            Upstream::Artifact(artifact) => vec![artifact.file().to_path_buf()],
            Upstream::Node(upstream) => match upstream.transformed_subject() {
                Ok(subject) => subject.files().to_vec(),
                Err(failure) => {
                    debug!(
                        node = %self.display_name(),
                        upstream = %upstream.display_name(),
                        "upstream failed, not executing"
                    );
                    return Err(failure.clone());
                }
            },
        };

        let mut files = Vec::new();
        for input in &inputs {
            files.extend(self.invoke(input)?);
        }
        trace!(node = %self.display_name(), outputs = files.len(), "transformation node materialized");
        Ok(TransformationSubject::new(files))
    }

    fn invoke(&self, input: &Path) -> Try<Vec<PathBuf>> {
        let invocation = Identity::from_components(&[
            self.step.fingerprint().as_bytes(),
            input.as_os_str().as_encoded_bytes(),
        ]);
        let workspaces = &self.context.workspaces;

        workspaces.identity_cache().get_or_compute(&invocation, || {
            let transform = self.step.transform();
            let outputs = workspaces
                .with_workspace(&invocation, |workspace| {
                    debug!(
                        transform = transform.name(),
                        input = %input.display(),
                        workspace = %workspace.dir().display(),
                        "running transform"
                    );
                    transform.transform(input, workspace)
                })
                .map_err(|err| Failure::new(TransformError::from(err)))?
                .map_err(|source| {
                    Failure::new(TransformError::Failed {
                        transform: transform.name().to_string(),
                        input: input.to_path_buf(),
                        source,
                    })
                })?;

            if self.context.fail_on_missing_outputs {
                if let Some(missing) = outputs.iter().find(|path| !path.exists()) {
                    return Err(Failure::new(TransformError::MissingOutput {
                        transform: transform.name().to_string(),
                        path: missing.clone(),
                    }));
                }
            }
            Ok(outputs)
        })
    }
}

impl fmt::Debug for TransformationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformationNode")
            .field("identity", &self.identity)
            .field("step", &self.step)
            .field("source", &self.source)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::FnTransform;
    use kiln_execution::{BoxError, InMemoryExecutionHistory, MutableWorkspaceProvider, Workspace};
    use kiln_types::ComponentId;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, thiserror::Error)]
    #[error("corrupt archive")]
    struct CorruptArchive;

    fn context(base: &Path) -> TransformContext {
        TransformContext::new(Arc::new(MutableWorkspaceProvider::new(
            base.join("transforms"),
            Arc::new(InMemoryExecutionHistory::new()),
        )))
    }

    fn artifact(dir: &Path) -> ResolvableArtifact {
        let file = dir.join("lib.jar");
        std::fs::write(&file, "jar").unwrap();
        ResolvableArtifact::new(ComponentId::new("com.acme:lib:1.0"), file)
    }

    /// Copies its input into the workspace with `suffix` appended, counting calls
    fn copying(name: &str, suffix: &'static str, calls: Arc<AtomicUsize>) -> TransformStep {
        let transform = FnTransform::new(
            name,
            move |input: &Path, workspace: &Workspace| -> Result<Vec<PathBuf>, BoxError> {
                calls.fetch_add(1, Ordering::SeqCst);
                let name = format!("{}{}", input.file_name().unwrap().to_string_lossy(), suffix);
                let out = workspace.resolve(name);
                std::fs::copy(input, &out)?;
                Ok(vec![out])
            },
        );
        TransformStep::new(Arc::new(transform), AttributeSet::new().with("step", suffix))
    }

    fn failing(calls: Arc<AtomicUsize>) -> TransformStep {
        let transform = FnTransform::new(
            "explode",
            move |_: &Path, _: &Workspace| -> Result<Vec<PathBuf>, BoxError> {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Box::new(CorruptArchive))
            },
        );
        TransformStep::new(Arc::new(transform), AttributeSet::new().with("step", "explode"))
    }

    #[test]
    fn test_node_is_lazy_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let node = TransformationNode::initial(
            artifact(dir.path()),
            copying("copy", ".a", calls.clone()),
            context(dir.path()),
        );

        assert_eq!(node.state(), NodeState::Unmaterialized);
        assert!(node.result_if_materialized().is_none());

        node.execute_if_not_already();
        node.execute_if_not_already();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(node.state(), NodeState::Succeeded);
        let subject = node.transformed_subject().as_ref().unwrap();
        assert_eq!(subject.len(), 1);
        assert!(subject.files()[0].ends_with("lib.jar.a"));
        assert!(std::ptr::eq(
            node.transformed_subject(),
            node.result_if_materialized().unwrap()
        ));
    }

    #[test]
    fn test_reading_result_triggers_execution() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let node = TransformationNode::initial(
            artifact(dir.path()),
            copying("copy", ".a", calls.clone()),
            context(dir.path()),
        );

        assert!(node.transformed_subject().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_chain_consumes_upstream_output() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let calls = Arc::new(AtomicUsize::new(0));
        let first = Arc::new(TransformationNode::initial(
            artifact(dir.path()),
            copying("first", ".a", calls.clone()),
            ctx.clone(),
        ));
        let second = TransformationNode::chained(first.clone(), copying("second", ".b", calls.clone()), ctx);

        let subject = second.transformed_subject().as_ref().unwrap();
        assert!(subject.files()[0].ends_with("lib.jar.a.b"));
        assert_eq!(first.state(), NodeState::Succeeded);
        assert_eq!(second.source_artifact(), first.source_artifact());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_upstream_failure_skips_downstream_transform() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let a_calls = Arc::new(AtomicUsize::new(0));
        let b_calls = Arc::new(AtomicUsize::new(0));
        let c_calls = Arc::new(AtomicUsize::new(0));

        let a = Arc::new(TransformationNode::initial(
            artifact(dir.path()),
            copying("a", ".a", a_calls.clone()),
            ctx.clone(),
        ));
        let b = Arc::new(TransformationNode::chained(a, failing(b_calls.clone()), ctx.clone()));
        let c = TransformationNode::chained(b.clone(), copying("c", ".c", c_calls.clone()), ctx);

        let failure = c.transformed_subject().as_ref().unwrap_err();

        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.state(), NodeState::Failed);
        assert!(failure.chain().any(|e| e.to_string() == "corrupt archive"));
        assert!(failure.ptr_eq(b.transformed_subject().as_ref().unwrap_err()));
    }

    #[test]
    fn test_failure_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let node = TransformationNode::initial(artifact(dir.path()), failing(calls.clone()), context(dir.path()));

        let first = node.transformed_subject().clone().unwrap_err();
        node.execute_if_not_already();
        let second = node.transformed_subject().clone().unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(first.ptr_eq(&second));
        assert!(matches!(
            first.downcast_ref::<TransformError>(),
            Some(TransformError::Failed { transform, .. }) if transform == "explode"
        ));
    }

    #[test]
    fn test_missing_output_fails_node() {
        let dir = tempfile::tempdir().unwrap();
        let transform = FnTransform::new(
            "liar",
            |_: &Path, workspace: &Workspace| -> Result<Vec<PathBuf>, BoxError> {
                Ok(vec![workspace.resolve("never-written")])
            },
        );
        let step = TransformStep::new(Arc::new(transform), AttributeSet::new());
        let node = TransformationNode::initial(artifact(dir.path()), step, context(dir.path()));

        let failure = node.transformed_subject().as_ref().unwrap_err();
        assert!(matches!(
            failure.downcast_ref::<TransformError>(),
            Some(TransformError::MissingOutput { .. })
        ));
    }

    #[test]
    fn test_identical_invocations_share_execution() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let calls = Arc::new(AtomicUsize::new(0));
        let step = copying("copy", ".a", calls.clone());
        let input = artifact(dir.path());

        let one = TransformationNode::initial(input.clone(), step.clone(), ctx.clone());
        let two = TransformationNode::initial(input, step, ctx);

        assert_eq!(one.identity(), two.identity());
        assert_eq!(one.transformed_subject().as_ref().unwrap(), two.transformed_subject().as_ref().unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_triggers_execute_once() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let node = TransformationNode::initial(
            artifact(dir.path()),
            copying("copy", ".a", calls.clone()),
            context(dir.path()),
        );

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| node.execute_if_not_already());
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(node.state(), NodeState::Succeeded);
    }
}
