//! Tracing setup for binaries and test harnesses embedding kiln

use crate::error::BoxError;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `debug` when verbose, `info` when not.
/// Fails if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), BoxError> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let _ = init_tracing(true);
        assert!(init_tracing(false).is_err());
        tracing::debug!("subscriber installed");
    }
}
