//! Error types for pool operations

use provider::ProviderError;

/// Errors surfaced by the pool.
///
/// Quota exhaustion never appears here: it degrades to fallback output.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No credential survived filtering at startup. Fatal, nothing to rotate.
    #[error("no usable credentials configured")]
    NoCredentials,

    /// A non-quota provider failure on the primary attempt.
    #[error("generation failed on credential #{credential}: {source}")]
    Provider {
        credential: usize,
        #[source]
        source: ProviderError,
    },
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn provider_error_keeps_source() {
        let err = Error::Provider {
            credential: 2,
            source: ProviderError::Transport("connection reset".into()),
        };
        assert_eq!(
            err.to_string(),
            "generation failed on credential #2: transport error: connection reset"
        );
        assert!(err.source().is_some());
    }
}
