//! # swcache Common
//!
//! Common utilities, error types, and logging configuration shared by the
//! swcache crates.
//!
//! ## Features
//!
//! - Error type for configuration and setup failures
//! - Logging configuration and setup
//! - Retry with exponential backoff
//! - Result extension traits

use thiserror::Error;

pub mod logging;
pub mod retry;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use retry::{retry_with_backoff, RetryConfig};

/// Errors from config loading and logging setup.
#[derive(Error, Debug)]
pub enum CommonError {
    /// A config source could not be read or parsed.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Logging could not be initialized.
    #[error("Logging error: {0}")]
    Logging(String),
}

impl CommonError {
    /// Config error caused by `source`.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias for common operations.
pub type Result<T> = std::result::Result<T, CommonError>;

/// Extension trait for Result.
pub trait ResultExt<T> {
    /// Wrap the error as a config error with context.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| CommonError::config_with_source(message, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_source() {
        let err: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let wrapped = err.context("reading agent config").unwrap_err();

        assert_eq!(wrapped.to_string(), "Config error: reading agent config");
        assert!(std::error::Error::source(&wrapped).is_some());
    }
}
