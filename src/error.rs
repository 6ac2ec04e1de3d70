//! Error types for the Tollgate service.

use thiserror::Error;

/// Main error type for Tollgate operations.
///
/// Admission checks never fail; a denied request is a normal
/// [`Decision`](crate::ratelimit::Decision). These errors cover setup:
/// settings validation, configuration loading and server startup.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected limiter settings
    #[error("Invalid rate limiter settings: {0}")]
    InvalidSettings(String),

    /// A check named a route with no configured rule
    #[error("Unknown route: {0}")]
    UnknownRoute(String),

    /// Layered configuration sources failed to load or deserialize
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// YAML parse errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// gRPC server errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
