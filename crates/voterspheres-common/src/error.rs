//! Error types for VoterSpheres

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Main error type shared across the workspace
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl DirectoryError {
    /// Create an invalid-record error naming the offending field
    pub fn missing_field(field: &str) -> Self {
        Self::InvalidRecord(format!("missing required field '{}'", field))
    }
}
