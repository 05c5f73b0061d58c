//! Deterministic substitute content
//!
//! Generators here never perform I/O and cannot fail: their output is what
//! the caller receives when no credential can serve a request.

/// Produces substitute text for a request the provider could not serve.
pub trait FallbackGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> String;
}

pub const DEFAULT_FALLBACK_MESSAGE: &str =
    "AI generation is temporarily unavailable. Please try again later.";

/// Returns the same message for every request.
#[derive(Debug, Clone)]
pub struct StaticFallback {
    message: String,
}

impl StaticFallback {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for StaticFallback {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_MESSAGE)
    }
}

impl FallbackGenerator for StaticFallback {
    fn generate(&self, _prompt: &str) -> String {
        self.message.clone()
    }
}

/// Prefixes a notice and quotes a bounded, whitespace-normalized excerpt of
/// the request so the caller can tell which request was degraded.
#[derive(Debug, Clone)]
pub struct PromptEchoFallback {
    notice: String,
    max_excerpt_chars: usize,
}

impl PromptEchoFallback {
    pub fn new(notice: impl Into<String>, max_excerpt_chars: usize) -> Self {
        Self {
            notice: notice.into(),
            max_excerpt_chars,
        }
    }
}

impl Default for PromptEchoFallback {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_MESSAGE, 160)
    }
}

impl FallbackGenerator for PromptEchoFallback {
    fn generate(&self, prompt: &str) -> String {
        let normalized = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() || self.max_excerpt_chars == 0 {
            return self.notice.clone();
        }
        let mut excerpt: String = normalized.chars().take(self.max_excerpt_chars).collect();
        if normalized.chars().count() > self.max_excerpt_chars {
            excerpt.push('…');
        }
        format!("{}\n\nRequest: \"{excerpt}\"", self.notice)
    }
}
