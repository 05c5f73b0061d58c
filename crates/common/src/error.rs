//! Configuration and startup errors shared across crates

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = Error::Config("attempt_timeout_secs must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: attempt_timeout_secs must be greater than 0"
        );
    }

    #[test]
    fn io_error_converts_with_prefix() {
        let err: Error =
            std::io::Error::new(std::io::ErrorKind::NotFound, "keys.txt missing").into();
        assert!(err.to_string().starts_with("I/O error:"), "got: {err}");
        assert!(format!("{err:?}").contains("Io"));
    }

    #[test]
    fn toml_error_converts() {
        let parse: std::result::Result<toml::Table, toml::de::Error> = toml::from_str("[[[");
        let err: Error = parse.unwrap_err().into();
        assert!(err.to_string().starts_with("TOML parse error:"), "got: {err}");
    }
}
