//! # Error Handling Module
//!
//! This module provides the error types used throughout the balancer runtime,
//! built on the `thiserror` crate. Pick-path errors (`SessionClosed`,
//! `NoEndpointAvailable`, `Cancelled`, `DeadlineExceeded`) are always surfaced
//! to the immediate caller and never retried internally; discovery and
//! metadata errors are absorbed locally with logging and fallback values.

use thiserror::Error;

/// Main result type used throughout the balancer runtime
pub type BalanceResult<T> = Result<T, BalanceError>;

/// Error types for the balancing and discovery runtime
///
/// Each variant represents a different category of error. The `#[error("...")]`
/// attribute from `thiserror` implements the `Display` trait with the
/// specified message.
#[derive(Debug, Error, Clone)]
pub enum BalanceError {
    /// A non-blocking pick found no candidate, even after relaxing the
    /// connectivity filter to declared-but-unreachable endpoints
    #[error("no endpoint available for service: {service}")]
    NoEndpointAvailable { service: String },

    /// A blocking pick's wait was interrupted by the caller's cancellation token
    #[error("pick cancelled by caller")]
    Cancelled,

    /// A blocking pick's deadline elapsed before a connected endpoint appeared
    #[error("pick deadline exceeded after {timeout_ms}ms")]
    DeadlineExceeded { timeout_ms: u64 },

    /// Any operation invoked after or during `close()`
    #[error("balancer session is closed")]
    SessionClosed,

    /// Service discovery errors (listing failed, watch feed broken, etc.)
    #[error("service discovery error: {message}")]
    Discovery { message: String },

    /// Invalid endpoint metadata (malformed weight, bad encoding, etc.).
    /// The runtime itself absorbs these with a logged fallback; the variant
    /// is surfaced for callers that parse registry metadata strictly.
    #[error("metadata parse error: {message}")]
    MetadataParse { message: String },

    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// I/O errors while loading configuration
    #[error("I/O error: {message}")]
    Io { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl BalanceError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a service discovery error with a custom message
    pub fn discovery<S: Into<String>>(message: S) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    /// Create a no-endpoint-available error for a service
    pub fn no_endpoint<S: Into<String>>(service: S) -> Self {
        Self::NoEndpointAvailable {
            service: service.into(),
        }
    }

    /// Check if this error should be retried
    ///
    /// Discovery errors are transient: the watcher backs off and retries them
    /// indefinitely. Pick-path errors are terminal for the call that observed
    /// them; any retry policy belongs to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Discovery { .. })
    }
}

impl From<std::io::Error> for BalanceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for BalanceError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}
