//! Captured failures and the `Try` result box
//!
//! A [`Failure`] is a shared, immutable handle to the error that ended a
//! computation. Cloning it is cheap and keeps the original cause chain, so the
//! same failure can be handed to every caller waiting on an identity.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Boxed error used at trait seams implemented outside this crate
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Immutable success-or-failure outcome of a memoized computation
pub type Try<T> = Result<T, Failure>;

/// A captured failure, shared between every observer of one computation
#[derive(Clone)]
pub struct Failure(Arc<dyn Error + Send + Sync + 'static>);

impl Failure {
    /// Capture an error
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Failure(Arc::new(error))
    }

    /// Capture an already boxed error without re-wrapping it
    pub fn from_boxed(error: BoxError) -> Self {
        Failure(Arc::from(error))
    }

    /// The captured error itself
    pub fn cause(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.0
    }

    /// Try to view the captured error as a concrete type
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    /// The captured error followed by each of its sources
    pub fn chain(&self) -> impl Iterator<Item = &(dyn Error + 'static)> {
        let head: &(dyn Error + 'static) = &*self.0;
        std::iter::successors(Some(head), |&err| err.source())
    }

    /// Whether both handles refer to the same captured failure
    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<BoxError> for Failure {
    fn from(error: BoxError) -> Self {
        Failure::from_boxed(error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Failure").field(&self.0).finish()
    }
}

impl Error for Failure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}
