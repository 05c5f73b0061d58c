//! Quota detection for provider failures
//!
//! The matching rule is intentionally literal: HTTP 429, or an error message
//! containing "429", "quota" or "limit" (case-insensitive). Anything else is
//! propagated by the pool without touching credential state.

use provider::{ErrorClassification, ProviderError};

/// Substrings that mark a failure as quota or rate-limit related.
const QUOTA_MARKERS: &[&str] = &["429", "quota", "limit"];

/// Classify a free-form error message.
pub fn classify_message(message: &str) -> ErrorClassification {
    let lower = message.to_lowercase();
    if QUOTA_MARKERS.iter().any(|marker| lower.contains(marker)) {
        ErrorClassification::QuotaExceeded
    } else {
        ErrorClassification::Other
    }
}

/// Classify a provider failure.
///
/// Timeouts are never treated as quota exhaustion: the provider did not
/// answer, so there is no quota signal to act on.
pub fn classify(error: &ProviderError) -> ErrorClassification {
    match error {
        ProviderError::Timeout(_) => ErrorClassification::Other,
        _ if error.status() == Some(429) => ErrorClassification::QuotaExceeded,
        other => classify_message(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn upstream(status: u16, message: &str) -> ProviderError {
        ProviderError::Upstream {
            status,
            message: message.into(),
        }
    }

    #[test]
    fn status_429_is_quota_regardless_of_body() {
        assert_eq!(
            classify(&upstream(429, "")),
            ErrorClassification::QuotaExceeded
        );
    }

    #[test]
    fn quota_text_is_quota() {
        assert_eq!(
            classify(&upstream(400, "Quota exceeded for quota metric 'Generate Content'")),
            ErrorClassification::QuotaExceeded
        );
    }

    #[test]
    fn limit_text_is_quota_case_insensitive() {
        assert_eq!(
            classify(&ProviderError::Internal("RATE LIMIT reached".into())),
            ErrorClassification::QuotaExceeded
        );
    }

    #[test]
    fn bare_429_in_transport_text_is_quota() {
        assert_eq!(
            classify(&ProviderError::Transport("server said 429 Too Many Requests".into())),
            ErrorClassification::QuotaExceeded
        );
    }

    #[test]
    fn connection_reset_is_other() {
        assert_eq!(
            classify(&ProviderError::Transport("connection reset".into())),
            ErrorClassification::Other
        );
    }

    #[test]
    fn server_error_is_other() {
        assert_eq!(
            classify(&upstream(503, "The model is overloaded")),
            ErrorClassification::Other
        );
    }

    #[test]
    fn timeout_is_other() {
        assert_eq!(
            classify(&ProviderError::Timeout(Duration::from_secs(60))),
            ErrorClassification::Other
        );
    }

    #[test]
    fn classify_message_markers() {
        assert_eq!(classify_message("quota"), ErrorClassification::QuotaExceeded);
        assert_eq!(classify_message("Limit"), ErrorClassification::QuotaExceeded);
        assert_eq!(classify_message("HTTP 429"), ErrorClassification::QuotaExceeded);
        assert_eq!(classify_message("bad request"), ErrorClassification::Other);
        assert_eq!(classify_message(""), ErrorClassification::Other);
    }
}
