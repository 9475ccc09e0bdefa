//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Suite library error
    #[error("{0}")]
    Suite(#[from] aerial_e2e::E2eError),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = CliError::config("missing BASE_URL");
        assert_eq!(err.to_string(), "Configuration error: missing BASE_URL");
    }

    #[test]
    fn test_invalid_argument_message() {
        let err = CliError::invalid_argument("--via ui needs the browser feature");
        assert!(err.to_string().starts_with("Invalid argument:"));
    }

    #[test]
    fn test_suite_error_is_shown_unchanged() {
        let inner = aerial_e2e::E2eError::config("API_URL is not set");
        let shown = inner.to_string();
        let err: CliError = inner.into();
        assert_eq!(err.to_string(), shown);
    }

    #[test]
    fn test_io_error_conversion() {
        let err: CliError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(err.to_string().contains("gone"));
    }
}
