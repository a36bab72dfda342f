//! Unified error types for sculpt

use thiserror::Error;

/// Unified error type for all sculpt operations
#[derive(Error, Debug)]
pub enum SculptError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid rule table: {0}")]
    RuleTable(String),

    // Oracle errors
    #[error("Oracle request failed: {0}")]
    Oracle(String),

    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    // Collaborator errors
    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: String,
        message: String,
    },

    // Pipeline errors
    #[error("Phase error: {0}")]
    Phase(String),

    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Healing failed: {0}")]
    Healing(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Path validation failed: {0}")]
    PathValidation(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl SculptError {
    /// Build a collaborator failure
    pub fn collaborator(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Whether this error means an oracle could not be reached at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::OracleUnavailable(_) | Self::Timeout(_))
    }
}

/// Result type alias using SculptError
pub type Result<T> = std::result::Result<T, SculptError>;
