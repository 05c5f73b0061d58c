//! Generation Gateway
//!
//! Single-binary service that fronts the Gemini `generateContent` API with a
//! pool of API keys:
//! 1. Loads keys from env (or a keys file) in priority order
//! 2. Spreads calls across healthy keys and retries once on quota errors
//! 3. Answers with fallback text when no key can serve the request
//!
//! Run as an HTTP service, or with `--prompt "<text>"` for a single call that
//! prints the JSON result to stdout.

mod config;
mod error;
mod gemini;
mod metrics;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use key_pool::{CredentialStore, GenerationResult, Pool, PoolConfig, PromptEchoFallback};
use metrics_exporter_prometheus::PrometheusHandle;
use provider::GenerationProvider;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::error::ApiError;
use crate::gemini::GeminiProvider;

/// Characters of the prompt echoed back in fallback text.
const FALLBACK_EXCERPT_CHARS: usize = 160;

/// Shared application state accessible from all handlers
struct AppState<P: GenerationProvider> {
    pool: Arc<Pool<P>>,
    prometheus: PrometheusHandle,
}

impl<P: GenerationProvider> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            prometheus: self.prometheus.clone(),
        }
    }
}

#[derive(Deserialize)]
struct GenerateRequest {
    prompt: String,
}

/// Build the axum router with all routes and shared state.
fn build_router<P: GenerationProvider>(state: AppState<P>, max_connections: usize) -> Router {
    Router::new()
        .route("/v1/generate", post(generate_handler::<P>))
        .route("/health", get(health_handler::<P>))
        .route("/metrics", get(metrics_handler::<P>))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Value following `name` on the command line.
fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn build_pool(config: &Config) -> Result<Pool<GeminiProvider>> {
    let store = CredentialStore::new(config.credentials.iter().map(|k| k.expose().as_str()))
        .context("no usable API keys: set GEMINI_API_KEY (and optional GEMINI_API_KEY_BACKUP, GEMINI_API_KEY_BACKUP_2, ...) or api_keys_file")?;

    let gemini = GeminiProvider::new(
        reqwest::Client::new(),
        config.gemini.endpoint.clone(),
        config.gemini.model.clone(),
    );
    let pool_config = PoolConfig {
        quota_reset_window: config.quota_reset_window(),
        attempt_timeout: config.attempt_timeout(),
    };
    Ok(Pool::new(store, gemini, pool_config).with_fallback(PromptEchoFallback::new(
        config.pool.fallback_message.clone(),
        FALLBACK_EXCERPT_CHARS,
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so one-shot mode keeps stdout for the result
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    // CLI: simple --config / --prompt flag parsing
    let args: Vec<String> = std::env::args().collect();

    let (config_path, explicit) = Config::resolve_path(flag_value(&args, "--config"));
    info!(path = %config_path.display(), explicit, "loading configuration");

    let config = if explicit {
        Config::load(&config_path)
    } else {
        Config::load_or_default(&config_path)
    }
    .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        model = %config.gemini.model,
        endpoint = %config.gemini.endpoint,
        keys = config.credentials.len(),
        "configuration loaded"
    );

    let pool = build_pool(&config)?;

    if let Some(prompt) = flag_value(&args, "--prompt") {
        let result = pool
            .execute(prompt)
            .await
            .context("generation failed")?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    // Install Prometheus metrics recorder before the server emits anything
    let prometheus = metrics::install_recorder();

    let app_state = AppState {
        pool: Arc::new(pool),
        prometheus,
    };
    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

/// Generate text for `{"prompt": "..."}`.
///
/// Fallback answers are still 200; only propagated provider failures and
/// invalid input are errors.
async fn generate_handler<P: GenerationProvider>(
    State(state): State<AppState<P>>,
    body: Bytes,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let started = Instant::now();

    let (outcome, response) = match generate(&state.pool, &body).await {
        Ok(result) => {
            let outcome = if result.is_fallback() {
                "fallback"
            } else {
                "generated"
            };
            let mut json = serde_json::to_value(&result).unwrap_or_default();
            if let Some(object) = json.as_object_mut() {
                object.insert("request_id".into(), request_id.clone().into());
            }
            (
                outcome,
                (
                    axum::http::StatusCode::OK,
                    [(axum::http::header::CONTENT_TYPE, "application/json")],
                    json.to_string(),
                )
                    .into_response(),
            )
        }
        Err(err) => {
            let outcome = match err {
                ApiError::InvalidRequest(_) => "invalid",
                ApiError::Pool(_) => "error",
            };
            if outcome == "error" {
                warn!(request_id = %request_id, error = %err, "generation failed");
            }
            (outcome, err.into_response_with_id(&request_id))
        }
    };

    metrics::record_request(outcome, started.elapsed().as_secs_f64());
    response
}

async fn generate<P: GenerationProvider>(
    pool: &Pool<P>,
    body: &[u8],
) -> std::result::Result<GenerationResult, ApiError> {
    let request: GenerateRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid request body: {e}")))?;
    if request.prompt.trim().is_empty() {
        return Err(ApiError::InvalidRequest("prompt must not be empty".into()));
    }
    Ok(pool.execute(&request.prompt).await?)
}

/// Pool health: 200 while any key is available, 503 when none is.
async fn health_handler<P: GenerationProvider>(
    State(state): State<AppState<P>>,
) -> impl IntoResponse {
    let body = state.pool.health().await;
    let status_code = if body["status"] == "unhealthy" {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    } else {
        axum::http::StatusCode::OK
    };
    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus text exposition.
async fn metrics_handler<P: GenerationProvider>(
    State(state): State<AppState<P>>,
) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
