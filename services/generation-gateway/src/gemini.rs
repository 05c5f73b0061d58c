//! Gemini REST backend
//!
//! Implements `GenerationProvider` against the `generateContent` endpoint.
//! One `reqwest::Client` is shared by every credential; the per-credential
//! handle is just the prepared `x-goog-api-key` header value.

use axum::http::HeaderValue;
use common::Secret;
use provider::{GenerateFuture, GenerationProvider, ProviderError};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini client shared across credentials
pub struct GeminiProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

/// Prepared auth header for one credential
#[derive(Clone, Debug)]
pub struct GeminiHandle {
    api_key: HeaderValue,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }

    async fn call(&self, handle: &GeminiHandle, prompt: &str) -> provider::Result<String> {
        let body = GenerateRequest {
            contents: [Content {
                parts: [RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.url())
            .header(API_KEY_HEADER, handle.api_key.clone())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(transport_error)?;

        if !status.is_success() {
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&bytes),
            });
        }

        let parsed: GenerateResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Internal(format!("malformed response: {e}")))?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::Internal("response contained no text".into()));
        }
        debug!(model = %self.model, chars = text.len(), "generation completed");
        Ok(text)
    }
}

/// Transport failure without the request URL, so host, port or model names
/// never reach the quota classifier.
fn transport_error(error: reqwest::Error) -> ProviderError {
    ProviderError::Transport(error.without_url().to_string())
}

/// `error.message` from a JSON error body, else the raw body.
fn upstream_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    }
}

impl GenerationProvider for GeminiProvider {
    type Handle = GeminiHandle;

    fn id(&self) -> &str {
        "gemini"
    }

    fn initialize(&self, credential: &Secret<String>) -> provider::Result<GeminiHandle> {
        let mut api_key = HeaderValue::from_str(credential.expose()).map_err(|_| {
            ProviderError::InvalidCredential("key is not a valid header value".into())
        })?;
        api_key.set_sensitive(true);
        Ok(GeminiHandle { api_key })
    }

    fn generate<'a>(&'a self, handle: &'a GeminiHandle, prompt: &'a str) -> GenerateFuture<'a> {
        Box::pin(self.call(handle, prompt))
    }
}
