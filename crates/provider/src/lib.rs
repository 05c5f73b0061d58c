//! Generation provider abstraction
//!
//! Defines the `GenerationProvider` trait that decouples credential rotation
//! from the concrete text-generation backend. A provider turns an opaque
//! credential into a client handle (`initialize`) and performs one generation
//! call with that handle (`generate`). Errors carry enough structure (HTTP
//! status, message) for the pool to tell quota exhaustion apart from other
//! failures.

#[cfg(any(test, feature = "testing"))]
pub mod scripted;

use common::Secret;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// How the pool should react to a failed generation attempt.
///
/// - QuotaExceeded marks the credential exhausted and rotates once
/// - Other is propagated to the caller untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClassification {
    /// Quota or rate limit hit on this credential
    QuotaExceeded,
    /// Anything else: transport, timeouts, bad responses
    Other,
}

impl ErrorClassification {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorClassification::QuotaExceeded => "quota_exceeded",
            ErrorClassification::Other => "other",
        }
    }
}

/// Errors from provider operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("internal provider error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// HTTP status reported by the upstream, if the failure came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Boxed future returned by `generate`.
pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// A text-generation backend addressed through interchangeable credentials.
///
/// `initialize` must be cheap and must not perform network I/O: the pool calls
/// it while holding its state lock. `generate` performs the actual request and
/// is always awaited outside that lock.
pub trait GenerationProvider: Send + Sync + 'static {
    /// Client state bound to one credential.
    type Handle: Clone + Send + Sync + 'static;

    /// Identifier for logging (e.g. "gemini").
    fn id(&self) -> &str;

    /// Build a client handle for the given credential.
    fn initialize(&self, credential: &Secret<String>) -> Result<Self::Handle>;

    /// Run one generation request.
    fn generate<'a>(&'a self, handle: &'a Self::Handle, prompt: &'a str) -> GenerateFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_for_upstream_errors() {
        let upstream = ProviderError::Upstream {
            status: 429,
            message: "Resource has been exhausted".into(),
        };
        assert_eq!(upstream.status(), Some(429));
        assert_eq!(ProviderError::Transport("connection reset".into()).status(), None);
        assert_eq!(ProviderError::Timeout(Duration::from_secs(5)).status(), None);
    }

    #[test]
    fn display_messages() {
        let err = ProviderError::Upstream {
            status: 503,
            message: "overloaded".into(),
        };
        assert_eq!(err.to_string(), "upstream returned 503: overloaded");
        assert_eq!(
            ProviderError::Timeout(Duration::from_secs(30)).to_string(),
            "request timed out after 30s"
        );
    }

    #[test]
    fn classification_labels() {
        assert_eq!(ErrorClassification::QuotaExceeded.label(), "quota_exceeded");
        assert_eq!(ErrorClassification::Other.label(), "other");
        assert_eq!(
            serde_json::to_string(&ErrorClassification::QuotaExceeded).unwrap(),
            "\"quota_exceeded\""
        );
    }
}
