//! Error types for the agent.

use thiserror::Error;

/// Result type alias using [`AgentError`].
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that stop the agent before or outside its sampling loop.
///
/// Per-tick failures (sensor reads, publishes) never surface as this type;
/// they are logged where they happen.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// A required credential is absent from the environment.
    #[error("Missing credential: environment variable {var} is not set")]
    MissingCredential { var: &'static str },

    /// Credentials are present but unusable.
    #[error("Invalid credentials: {0}")]
    InvalidCredential(String),

    /// The device identity could not be resolved.
    #[error("Cannot resolve device identity: {0}")]
    Identity(String),

    /// Zenoh connection error.
    #[error("Zenoh connection error: {0}")]
    ZenohConnection(String),

    /// Database client setup error.
    #[error("Database client error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }
}

impl From<edgetel_common::Error> for AgentError {
    fn from(err: edgetel_common::Error) -> Self {
        match err {
            edgetel_common::Error::Config(msg) => Self::ConfigParse(msg),
            edgetel_common::Error::Zenoh(e) => Self::ZenohConnection(e.to_string()),
            edgetel_common::Error::Topic(msg) => Self::Identity(msg),
            edgetel_common::Error::Io(e) => Self::Io(e),
            other => Self::ConfigParse(other.to_string()),
        }
    }
}
