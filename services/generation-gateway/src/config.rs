//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! API keys are never read from the TOML body. They come from the
//! `GEMINI_API_KEY*` env vars or, when none is set, from `api_keys_file`.

use common::Secret;
use key_pool::store::is_placeholder;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Primary key variable. Backups are `_BACKUP`, `_BACKUP_2`, `_BACKUP_3`, ...
pub const PRIMARY_KEY_VAR: &str = "GEMINI_API_KEY";

pub const DEFAULT_CONFIG_PATH: &str = "generation-gateway.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub gemini: GeminiConfig,
    /// File with one API key per line, used when no key env var is set
    #[serde(default)]
    pub api_keys_file: Option<PathBuf>,
    /// Resolved keys in priority order
    #[serde(skip)]
    pub credentials: Vec<Secret<String>>,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Rotation and degradation settings
#[derive(Debug, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_quota_reset_hours")]
    pub quota_reset_hours: u64,
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

/// Gemini REST settings
#[derive(Debug, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_max_connections() -> usize {
    64
}

fn default_quota_reset_hours() -> u64 {
    24
}

fn default_attempt_timeout() -> u64 {
    60
}

fn default_fallback_message() -> String {
    key_pool::fallback::DEFAULT_FALLBACK_MESSAGE.to_string()
}

fn default_endpoint() -> String {
    crate::gemini::DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    crate::gemini::DEFAULT_MODEL.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            quota_reset_hours: default_quota_reset_hours(),
            attempt_timeout_secs: default_attempt_timeout(),
            fallback_message: default_fallback_message(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then resolve API keys.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.finish()
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> common::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Config::default().finish()
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    ///
    /// The flag tells the caller whether the path was chosen explicitly.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from(DEFAULT_CONFIG_PATH), false)
    }

    pub fn quota_reset_window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.pool.quota_reset_hours.saturating_mul(60 * 60))
    }

    pub fn attempt_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.pool.attempt_timeout_secs)
    }

    fn finish(mut self) -> common::Result<Self> {
        self.validate()?;
        self.credentials = resolve_credentials(self.api_keys_file.as_deref())?;
        Ok(self)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.gemini.endpoint.starts_with("http://")
            && !self.gemini.endpoint.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "gemini.endpoint must start with http:// or https://, got: {}",
                self.gemini.endpoint
            )));
        }
        if self.gemini.model.trim().is_empty() {
            return Err(common::Error::Config("gemini.model must not be empty".into()));
        }
        if self.pool.quota_reset_hours == 0 {
            return Err(common::Error::Config(
                "quota_reset_hours must be greater than 0".into(),
            ));
        }
        if self.pool.attempt_timeout_secs == 0 {
            return Err(common::Error::Config(
                "attempt_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Keys from `GEMINI_API_KEY`, `GEMINI_API_KEY_BACKUP`, then
/// `GEMINI_API_KEY_BACKUP_2`, `_3`, ... until the first unset number.
fn keys_from_env() -> Vec<String> {
    let mut keys = Vec::new();
    for var in [
        PRIMARY_KEY_VAR.to_string(),
        format!("{PRIMARY_KEY_VAR}_BACKUP"),
    ] {
        if let Ok(key) = std::env::var(&var) {
            keys.push(key);
        }
    }
    for n in 2.. {
        match std::env::var(format!("{PRIMARY_KEY_VAR}_BACKUP_{n}")) {
            Ok(key) => keys.push(key),
            Err(_) => break,
        }
    }
    keys
}

/// One key per line; blank lines and `#` comments are skipped.
fn keys_from_file(path: &Path) -> common::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        common::Error::Config(format!(
            "failed to read api_keys_file {}: {e}",
            path.display()
        ))
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect())
}

/// Env vars win when at least one carries a real key; otherwise the keys
/// file is used. Filtering of blanks and placeholders happens in the pool.
fn resolve_credentials(keys_file: Option<&Path>) -> common::Result<Vec<Secret<String>>> {
    let env_keys: Vec<Secret<String>> = keys_from_env().into_iter().map(Secret::new).collect();
    if env_keys
        .iter()
        .any(|k| !k.is_blank() && !is_placeholder(k.expose()))
    {
        return Ok(env_keys);
    }
    match keys_file {
        Some(path) => Ok(keys_from_file(path)?.into_iter().map(Secret::new).collect()),
        None => Ok(env_keys),
    }
}
