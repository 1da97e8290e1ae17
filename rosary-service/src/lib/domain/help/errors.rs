use thiserror::Error;

/// Error for help content operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HelpError {
    #[error("Help item {position} has no type")]
    MissingItemType { position: usize },

    #[error("Database error: {0}")]
    DatabaseError(String),
}
