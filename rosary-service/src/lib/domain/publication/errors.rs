use thiserror::Error;

/// Error for publication operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublicationError {
    #[error("Invalid rosary part: {0}")]
    InvalidPart(String),

    #[error("Invalid mystery: {0} (expected 1-5)")]
    InvalidMystery(i64),

    #[error("Invalid day index: {0}")]
    InvalidIndex(i64),

    #[error("Publication title must not be empty")]
    EmptyTitle,

    #[error("Publication not found: {0}")]
    NotFound(String),

    #[error("Publication already exists: {0}")]
    AlreadyExists(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
