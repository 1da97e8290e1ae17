use async_trait::async_trait;

use crate::domain::help::errors::HelpError;
use crate::domain::help::models::HelpContent;

/// Port for help content operations.
#[async_trait]
pub trait HelpServicePort: Send + Sync + 'static {
    /// Current help page, empty when nothing was stored yet.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn get(&self) -> Result<HelpContent, HelpError>;

    /// Replace the whole help page.
    ///
    /// # Errors
    /// * `MissingItemType` - An item has a blank type
    /// * `DatabaseError` - Database operation failed
    async fn replace(&self, content: HelpContent) -> Result<HelpContent, HelpError>;
}

/// Persistence operations for the help record.
#[async_trait]
pub trait HelpRepository: Send + Sync + 'static {
    async fn find(&self) -> Result<Option<HelpContent>, HelpError>;

    /// Create the record if missing, otherwise overwrite its items.
    async fn upsert(&self, content: HelpContent) -> Result<HelpContent, HelpError>;
}
