//! Ordered, immutable set of configured credentials
//!
//! Credentials arrive in priority order (primary, backup, backup 2, ...).
//! Blank values and unfilled template placeholders are dropped; the position
//! of each surviving credential is its ordinal for the life of the process.

use common::Secret;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Values shipped in sample `.env` files that must never be sent upstream.
const PLACEHOLDER_KEYS: &[&str] = &["your-gemini-key-here", "your-api-key-here", "changeme"];

/// True for template values like `your-gemini-key-here`.
pub fn is_placeholder(value: &str) -> bool {
    let lower = value.trim().to_lowercase();
    PLACEHOLDER_KEYS.contains(&lower.as_str())
        || (lower.starts_with("your-") && lower.ends_with("-here"))
}

/// Configured credentials, indexed by ordinal.
#[derive(Debug)]
pub struct CredentialStore {
    credentials: Vec<Secret<String>>,
}

impl CredentialStore {
    /// Build the store from candidates in priority order.
    ///
    /// Returns `NoCredentials` when nothing usable remains.
    pub fn new<I, S>(candidates: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut credentials = Vec::new();
        for (position, candidate) in candidates.into_iter().enumerate() {
            let value: String = candidate.into();
            let trimmed = value.trim();
            if trimmed.is_empty() {
                debug!(position, "skipping empty credential");
                continue;
            }
            if is_placeholder(trimmed) {
                debug!(position, "skipping placeholder credential");
                continue;
            }
            credentials.push(Secret::new(trimmed.to_string()));
        }

        if credentials.is_empty() {
            return Err(Error::NoCredentials);
        }
        info!(credentials = credentials.len(), "credential store loaded");
        Ok(Self { credentials })
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Always false: construction rejects an empty list.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Secret<String>> {
        self.credentials.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Secret<String>> {
        self.credentials.iter()
    }
}
