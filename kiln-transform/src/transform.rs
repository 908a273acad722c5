//! Transforms, transform steps and chains of steps

use kiln_execution::{BoxError, Workspace};
use kiln_types::AttributeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Maps one input file to zero or more output files
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;

    /// Stable description of the implementation and its parameters.
    ///
    /// Two transforms with the same fingerprint are assumed to produce the
    /// same outputs from the same input.
    fn fingerprint(&self) -> String {
        self.name().to_string()
    }

    /// Produce outputs for `input`, writing new files only inside `workspace`
    fn transform(&self, input: &Path, workspace: &Workspace) -> Result<Vec<PathBuf>, BoxError>;
}

/// A transform backed by a closure.
///
/// The closure body is opaque, so the fingerprint is the name unless one is
/// given with [`FnTransform::with_fingerprint`]. Two closures sharing a name
/// and a fingerprint are treated as the same transform and share executions.
pub struct FnTransform<F> {
    name: String,
    fingerprint: Option<String>,
    f: F,
}

impl<F> FnTransform<F>
where
    F: Fn(&Path, &Workspace) -> Result<Vec<PathBuf>, BoxError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        FnTransform {
            name: name.into(),
            fingerprint: None,
            f,
        }
    }

    /// Distinguish this closure from others with the same name
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(&Path, &Workspace) -> Result<Vec<PathBuf>, BoxError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> String {
        match &self.fingerprint {
            Some(fingerprint) => format!("{}@{}", self.name, fingerprint),
            None => self.name.clone(),
        }
    }

    fn transform(&self, input: &Path, workspace: &Workspace) -> Result<Vec<PathBuf>, BoxError> {
        (self.f)(input, workspace)
    }
}

impl<F> fmt::Debug for FnTransform<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransform")
            .field("name", &self.name)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// One transform applied to produce a variant with `target` attributes
#[derive(Clone)]
pub struct TransformStep {
    transform: Arc<dyn Transform>,
    target: AttributeSet,
}

impl TransformStep {
    pub fn new(transform: Arc<dyn Transform>, target: AttributeSet) -> Self {
        TransformStep { transform, target }
    }

    pub fn transform(&self) -> &dyn Transform {
        &*self.transform
    }

    pub fn target_attributes(&self) -> &AttributeSet {
        &self.target
    }

    pub fn display_name(&self) -> &str {
        self.transform.name()
    }

    /// Transform fingerprint combined with the target attributes
    pub fn fingerprint(&self) -> String {
        format!("{}->{}", self.transform.fingerprint(), self.target)
    }
}

impl fmt::Debug for TransformStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformStep")
            .field("transform", &self.transform.name())
            .field("target", &self.target)
            .finish()
    }
}

/// Non-empty sequence of steps; each consumes the previous step's output
#[derive(Debug, Clone)]
pub struct TransformationChain {
    steps: Vec<TransformStep>,
}

impl TransformationChain {
    pub fn new(first: TransformStep) -> Self {
        TransformationChain { steps: vec![first] }
    }

    /// Append a step consuming the current last step's output
    pub fn then(mut self, step: TransformStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[TransformStep] {
        &self.steps
    }

    pub fn first(&self) -> &TransformStep {
        &self.steps[0]
    }

    /// Attributes of the chain's final output
    pub fn target_attributes(&self) -> &AttributeSet {
        self.steps[self.steps.len() - 1].target_attributes()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl From<TransformStep> for TransformationChain {
    fn from(step: TransformStep) -> Self {
        TransformationChain::new(step)
    }
}
