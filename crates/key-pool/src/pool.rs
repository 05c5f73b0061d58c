//! Credential pool and the call executor with fallback
//!
//! The pool owns the credential store, the exhaustion tracker, the call
//! counter, the active credential and a cache of provider handles. All of
//! that mutable state lives behind one `Mutex`: selection, switching and
//! exhaustion marking are atomic with respect to other callers. Provider
//! requests are always awaited with the lock released.
//!
//! One logical call:
//! 1. bump the call counter and pick a credential (`pick_next`)
//! 2. attempt generation; success returns the text
//! 3. on a quota failure mark the credential exhausted, pick one alternate
//!    (`pick_fallback`) and retry exactly once
//! 4. when nothing is usable or the retry fails, return fallback content
//!
//! Non-quota failures on the first attempt are propagated unchanged.

use std::collections::HashMap;
use std::time::Duration;

use provider::{ErrorClassification, GenerationProvider, ProviderError};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::fallback::{FallbackGenerator, StaticFallback};
use crate::quota;
use crate::selector;
use crate::store::CredentialStore;
use crate::tracker::{ExhaustionTracker, QUOTA_RESET_WINDOW};

/// Default bound on a single provider attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Tunables for a pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How long an exhausted credential stays out of rotation.
    pub quota_reset_window: Duration,
    /// Upper bound for each provider attempt (primary and retry).
    pub attempt_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            quota_reset_window: QUOTA_RESET_WINDOW,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// Why a call was served by the fallback generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Every credential was exhausted before the first attempt.
    NoCredential,
    /// The primary hit a quota error and no other credential was healthy.
    NoAlternate,
    /// The single retry on an alternate credential failed.
    RetryFailed,
}

impl FallbackReason {
    pub fn label(&self) -> &'static str {
        match self {
            FallbackReason::NoCredential => "no_credential",
            FallbackReason::NoAlternate => "no_alternate",
            FallbackReason::RetryFailed => "retry_failed",
        }
    }
}

/// Outcome of `Pool::execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationResult {
    /// Text produced by the provider using credential `credential`.
    Generated { text: String, credential: usize },
    /// Deterministic substitute text.
    Fallback { text: String, reason: FallbackReason },
}

impl GenerationResult {
    pub fn text(&self) -> &str {
        match self {
            GenerationResult::Generated { text, .. } | GenerationResult::Fallback { text, .. } => {
                text
            }
        }
    }

    pub fn into_text(self) -> String {
        match self {
            GenerationResult::Generated { text, .. } | GenerationResult::Fallback { text, .. } => {
                text
            }
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, GenerationResult::Fallback { .. })
    }
}

/// Mutable pool state guarded by a single lock.
struct PoolState<H> {
    tracker: ExhaustionTracker,
    calls: u64,
    active: Option<usize>,
    handles: HashMap<usize, H>,
}

/// Result of choosing a credential under the lock.
enum Selection<H> {
    Ready(usize, H),
    /// Selected, but the provider refused to build a handle for it.
    Unusable(usize),
    Empty,
}

/// Rotating pool of interchangeable credentials for one provider.
pub struct Pool<P: GenerationProvider> {
    store: CredentialStore,
    provider: P,
    fallback: Box<dyn FallbackGenerator>,
    attempt_timeout: Duration,
    state: Mutex<PoolState<P::Handle>>,
}

impl<P: GenerationProvider> Pool<P> {
    /// Create a pool over `store`. All credentials start healthy.
    pub fn new(store: CredentialStore, provider: P, config: PoolConfig) -> Self {
        info!(
            provider = provider.id(),
            credentials = store.len(),
            reset_window_secs = config.quota_reset_window.as_secs(),
            attempt_timeout_secs = config.attempt_timeout.as_secs(),
            "credential pool initialized"
        );
        let tracker = ExhaustionTracker::new(store.len(), config.quota_reset_window);
        Self {
            store,
            provider,
            fallback: Box::new(StaticFallback::default()),
            attempt_timeout: config.attempt_timeout,
            state: Mutex::new(PoolState {
                tracker,
                calls: 0,
                active: None,
                handles: HashMap::new(),
            }),
        }
    }

    /// Replace the fallback generator used by `execute`.
    pub fn with_fallback(mut self, fallback: impl FallbackGenerator + 'static) -> Self {
        self.fallback = Box::new(fallback);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Generate text for `prompt`, degrading to the pool's fallback generator.
    pub async fn execute(&self, prompt: &str) -> Result<GenerationResult> {
        self.execute_with(prompt, self.fallback.as_ref()).await
    }

    /// Generate text for `prompt`, degrading to `fallback`.
    ///
    /// Returns an error only for a non-quota failure of the first attempt.
    /// Performs at most two provider attempts.
    #[instrument(skip_all, fields(call = tracing::field::Empty))]
    pub async fn execute_with<F>(&self, prompt: &str, fallback: &F) -> Result<GenerationResult>
    where
        F: FallbackGenerator + ?Sized,
    {
        let primary = match self.select_primary().await {
            Selection::Empty => {
                return Ok(self.degrade(prompt, fallback, FallbackReason::NoCredential));
            }
            Selection::Unusable(index) => index,
            Selection::Ready(index, handle) => match self.attempt(index, &handle, prompt).await {
                Ok(text) => return Ok(self.succeed(index, text).await),
                Err(error) => match quota::classify(&error) {
                    ErrorClassification::QuotaExceeded => {
                        warn!(credential = index, error = %error, "quota error on credential");
                        self.mark_exhausted(index).await;
                        index
                    }
                    ErrorClassification::Other => {
                        warn!(credential = index, error = %error, "non-quota provider error, propagating");
                        return Err(Error::Provider {
                            credential: index,
                            source: error,
                        });
                    }
                },
            },
        };

        match self.select_alternate(primary).await {
            Selection::Empty => Ok(self.degrade(prompt, fallback, FallbackReason::NoAlternate)),
            Selection::Unusable(_) => {
                Ok(self.degrade(prompt, fallback, FallbackReason::RetryFailed))
            }
            Selection::Ready(index, handle) => match self.attempt(index, &handle, prompt).await {
                Ok(text) => Ok(self.succeed(index, text).await),
                Err(error) => {
                    warn!(credential = index, error = %error, "retry on alternate credential failed");
                    Ok(self.degrade(prompt, fallback, FallbackReason::RetryFailed))
                }
            },
        }
    }

    /// Mark credential `index` exhausted as of now and drop its cached handle.
    pub async fn mark_exhausted(&self, index: usize) {
        let mut state = self.state.lock().await;
        state.tracker.mark_exhausted(index, Instant::now());
        state.handles.remove(&index);
    }

    /// Whether credential `index` is currently exhausted. Applies lazy
    /// reinstatement.
    pub async fn is_exhausted(&self, index: usize) -> bool {
        self.state
            .lock()
            .await
            .tracker
            .is_exhausted(index, Instant::now())
    }

    /// Number of logical calls made so far.
    pub async fn calls(&self) -> u64 {
        self.state.lock().await.calls
    }

    /// Ordinal of the most recently selected credential.
    pub async fn active(&self) -> Option<usize> {
        self.state.lock().await.active
    }

    /// Pool health summary.
    ///
    /// `healthy` when every credential is usable, `degraded` when some are,
    /// `unhealthy` when none are. Expired exhaustion records are cleared.
    pub async fn health(&self) -> serde_json::Value {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let total = state.tracker.len();

        let mut credentials = Vec::with_capacity(total);
        let mut available = 0usize;
        for index in 0..total {
            let exhausted = state.tracker.is_exhausted(index, now);
            let usage = state.tracker.state(index).map_or(0, |s| s.usage());
            if exhausted {
                let reset_in = state.tracker.remaining(index, now).unwrap_or_default();
                credentials.push(serde_json::json!({
                    "credential": index,
                    "status": "exhausted",
                    "reset_in_secs": reset_in.as_secs(),
                    "usage": usage,
                }));
            } else {
                available += 1;
                credentials.push(serde_json::json!({
                    "credential": index,
                    "status": "available",
                    "usage": usage,
                }));
            }
        }

        let status = if available == total && total > 0 {
            "healthy"
        } else if available > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": status,
            "credentials_total": total,
            "credentials_available": available,
            "credentials_exhausted": total - available,
            "calls_total": state.calls,
            "active_credential": state.active,
            "credentials": credentials,
        })
    }

    /// Steps 1-3: count the call, pick a credential, switch to it.
    ///
    /// A credential whose handle cannot be built is marked exhausted so a
    /// misconfigured key is not retried on every call.
    async fn select_primary(&self) -> Selection<P::Handle> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.calls += 1;
        let call = state.calls;
        tracing::Span::current().record("call", call);

        let Some(index) = selector::pick_next(&mut state.tracker, call, now) else {
            warn!("all credentials exhausted");
            return Selection::Empty;
        };

        match self.activate(&mut state, index) {
            Ok(handle) => Selection::Ready(index, handle),
            Err(error) => {
                warn!(credential = index, error = %error, "credential unusable, marking exhausted");
                state.tracker.mark_exhausted(index, now);
                Selection::Unusable(index)
            }
        }
    }

    /// Step 5: pick the retry credential after a quota failure on `exclude`.
    async fn select_alternate(&self, exclude: usize) -> Selection<P::Handle> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let Some(index) = selector::pick_fallback(&mut state.tracker, exclude, now) else {
            info!(exhausted = exclude, "no alternate credential available");
            return Selection::Empty;
        };

        match self.activate(&mut state, index) {
            Ok(handle) => Selection::Ready(index, handle),
            Err(error) => {
                warn!(credential = index, error = %error, "alternate credential unusable");
                Selection::Unusable(index)
            }
        }
    }

    /// Make `index` the active credential and return its handle, building
    /// one if none is cached.
    fn activate(
        &self,
        state: &mut PoolState<P::Handle>,
        index: usize,
    ) -> std::result::Result<P::Handle, ProviderError> {
        let handle = match state.handles.get(&index) {
            Some(handle) => handle.clone(),
            None => {
                let credential = self.store.get(index).ok_or_else(|| {
                    ProviderError::Internal(format!("credential #{index} not configured"))
                })?;
                let handle = self.provider.initialize(credential)?;
                debug!(credential = index, "initialized provider handle");
                state.handles.insert(index, handle.clone());
                handle
            }
        };

        if state.active != Some(index) {
            info!(from = ?state.active, to = index, "switched active credential");
            state.active = Some(index);
        }
        Ok(handle)
    }

    /// One bounded provider attempt. Runs without the state lock.
    async fn attempt(
        &self,
        index: usize,
        handle: &P::Handle,
        prompt: &str,
    ) -> std::result::Result<String, ProviderError> {
        debug!(credential = index, "attempting generation");
        let result = tokio::time::timeout(self.attempt_timeout, self.provider.generate(handle, prompt))
            .await
            .unwrap_or_else(|_elapsed| Err(ProviderError::Timeout(self.attempt_timeout)));

        let outcome = match &result {
            Ok(_) => "success",
            Err(error) => quota::classify(error).label(),
        };
        metrics::counter!("key_pool_attempts_total", "outcome" => outcome).increment(1);
        result
    }

    async fn succeed(&self, index: usize, text: String) -> GenerationResult {
        self.state.lock().await.tracker.record_success(index);
        debug!(credential = index, "generation succeeded");
        GenerationResult::Generated {
            text,
            credential: index,
        }
    }

    fn degrade<F>(&self, prompt: &str, fallback: &F, reason: FallbackReason) -> GenerationResult
    where
        F: FallbackGenerator + ?Sized,
    {
        info!(reason = reason.label(), "serving fallback content");
        metrics::counter!("key_pool_fallback_total", "reason" => reason.label()).increment(1);
        GenerationResult::Fallback {
            text: fallback.generate(prompt),
            reason,
        }
    }
}
