//! Error types for factgraph

use thiserror::Error;

/// Result type alias using factgraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Factgraph error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Node '{0}' not found. Run `factgraph node list` to see stored nodes.")]
    NodeNotFound(String),

    #[error("Relationship '{0}' not found.")]
    RelationshipNotFound(String),

    // Reference errors (E100-E199)
    #[error("Relationship endpoint '{0}' does not reference an existing node")]
    ReferenceError(String),

    // Storage errors (E400-E499)
    #[error("Storage error: {0}")]
    StorageError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    // Replication errors (E500-E599)
    #[error("Replication to '{backend}' failed: {reason}")]
    ReplicationError { backend: String, reason: String },

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NodeNotFound(_) => "E001",
            Self::RelationshipNotFound(_) => "E002",
            Self::ReferenceError(_) => "E100",
            Self::StorageError(_) => "E400",
            Self::MigrationError(_) => "E401",
            Self::SerializationError(_) => "E402",
            Self::ReplicationError { .. } => "E500",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NodeNotFound(_) => Some("factgraph node list".to_string()),
            Self::ReferenceError(id) => Some(format!("factgraph node show {}", id)),
            Self::MigrationError(_) => Some("factgraph doctor".to_string()),
            Self::ReplicationError { .. } => {
                Some("factgraph config set replica.enabled false".to_string())
            }
            Self::ConfigError(_) => Some("factgraph config list".to_string()),
            _ => None,
        }
    }

    /// Whether this error came from the local store rather than from the caller
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::StorageError(_) | Self::MigrationError(_) | Self::SerializationError(_)
        )
    }
}
