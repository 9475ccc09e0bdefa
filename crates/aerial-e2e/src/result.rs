//! Result and error types for the suite.

use thiserror::Error;

use crate::fixture::CleanupReport;

/// Result type for suite operations
pub type E2eResult<T> = Result<T, E2eError>;

/// Errors that can occur while driving the UI or calling services
#[derive(Debug, Error)]
pub enum E2eError {
    /// Target element never became interactable
    #[error("{description} was not actionable after {waited_ms}ms: {reason}")]
    ActionabilityTimeout {
        /// Locator description
        description: String,
        /// Time spent waiting
        waited_ms: u64,
        /// Last unmet actionability check
        reason: String,
    },

    /// An un-indexed locator resolved to several elements
    #[error("strict mode violation: {description} resolved to {count} elements")]
    StrictModeViolation {
        /// Locator description
        description: String,
        /// Number of matches
        count: usize,
    },

    /// Expected vs actual mismatch
    #[error("assertion failed: {description}: expected {expected}, got {actual}")]
    AssertionFailed {
        /// What was asserted
        description: String,
        /// Expected value
        expected: String,
        /// Observed value
        actual: String,
    },

    /// No network response matched the correlation predicate
    #[error("no {method} response matching '{url_fragment}' within {waited_ms}ms")]
    ResponseTimeout {
        /// HTTP method the predicate waited for
        method: String,
        /// URL fragment the predicate waited for
        url_fragment: String,
        /// Time spent waiting
        waited_ms: u64,
    },

    /// A request completed with a non-success status
    #[error("HTTP {status} from {url}: {body}")]
    HttpStatus {
        /// Status code
        status: u16,
        /// Request URL
        url: String,
        /// Raw body text
        body: String,
    },

    /// A body could not be decoded into the expected schema
    #[error("could not decode {context}: {message} (body: {body})")]
    Decode {
        /// Endpoint or payload being decoded
        context: String,
        /// Decoder message
        message: String,
        /// Raw body text
        body: String,
    },

    /// A polling wait ran out of budget
    #[error("timed out after {ms}ms waiting for {description}")]
    Timeout {
        /// What was waited for
        description: String,
        /// Budget in milliseconds
        ms: u64,
    },

    /// Bounded retry policy gave up
    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        /// Attempts made
        attempts: u32,
        /// Error from the final attempt
        last: Box<E2eError>,
    },

    /// Driver-level failure
    #[error("driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Browser launch error
    #[error("failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Missing or invalid configuration
    #[error("configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Fixture setup or cleanup failed
    #[error("fixture error: {message}")]
    Fixture {
        /// Error message
        message: String,
    },

    /// Cleanup ran to the end but some deletions failed
    #[error(
        "fixture cleanup failed for {} of {} entities: {first}",
        .report.failed.len(),
        .report.deleted.len() + .report.failed.len()
    )]
    Cleanup {
        /// First failure, with the entity it hit
        first: String,
        /// What was deleted and what was left behind
        report: CleanupReport,
    },

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used to pick a retry fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Element never became interactable
    Actionability,
    /// Value mismatch
    Assertion,
    /// Correlated response never arrived
    ResponseTimeout,
    /// Non-success HTTP status
    Http,
    /// Undecodable body
    Decode,
    /// Polling budget exhausted
    Timeout,
    /// Anything else
    Other,
}

impl E2eError {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ActionabilityTimeout { .. } | Self::StrictModeViolation { .. } => {
                FailureKind::Actionability
            }
            Self::AssertionFailed { .. } => FailureKind::Assertion,
            Self::ResponseTimeout { .. } => FailureKind::ResponseTimeout,
            Self::HttpStatus { .. } | Self::Http(_) => FailureKind::Http,
            Self::Decode { .. } | Self::Json(_) => FailureKind::Decode,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::RetryExhausted { last, .. } => last.kind(),
            _ => FailureKind::Other,
        }
    }

    /// Whether this error means the deadline passed rather than a hard failure
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::Actionability | FailureKind::ResponseTimeout | FailureKind::Timeout
        )
    }

    /// Build an assertion failure from displayable expected/actual values
    pub fn assertion(
        description: impl Into<String>,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        Self::AssertionFailed {
            description: description.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a driver error
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
