//! Credential rotation pool for a rate-limited generation provider
//!
//! Holds a fixed, ordered set of interchangeable API keys and decides which one
//! serves each call. Keys that hit their quota are taken out of rotation for the
//! reset window and come back on their own; when no key can serve a request the
//! caller gets deterministic fallback text instead of an error.
//!
//! Credential lifecycle:
//! 1. Keys are loaded once at startup in priority order; blanks and placeholders are dropped
//! 2. Each call picks a healthy key by call counter (load is spread, not sticky)
//! 3. A quota error (429 / "quota" / "limit") marks the key exhausted and triggers one retry
//!    on the next healthy key
//! 4. The first lookup after the reset window (24 h) reinstates the key
//! 5. With no usable key, or after a failed retry, the fallback generator answers
//!
//! State is memory-only: a restart makes every key healthy again.

pub mod error;
pub mod fallback;
pub mod pool;
pub mod quota;
pub mod selector;
pub mod store;
pub mod tracker;

pub use error::{Error, Result};
pub use fallback::{FallbackGenerator, PromptEchoFallback, StaticFallback};
pub use pool::{FallbackReason, GenerationResult, Pool, PoolConfig};
pub use quota::{classify, classify_message};
pub use store::CredentialStore;
pub use tracker::{ExhaustionTracker, QUOTA_RESET_WINDOW};
