//! Unified error types for Pilot

use thiserror::Error;

/// Unified error type for all Pilot operations
#[derive(Error, Debug)]
pub enum PilotError {
    // Oracle errors
    #[error("API error: {0}")]
    Api(String),

    #[error("API limit reached: {0}")]
    ApiLimit(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    // Validation exhaustion
    #[error("Malformed oracle response: {0}")]
    MalformedResponse(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    // Collaborator errors
    #[error("Screen capture failed: {0}")]
    Capture(String),

    #[error("Action execution failed: {0}")]
    Execution(String),

    #[error("Browser error: {0}")]
    Browser(String),

    // Project setup
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Project context error: {0}")]
    Context(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using PilotError
pub type Result<T> = std::result::Result<T, PilotError>;
