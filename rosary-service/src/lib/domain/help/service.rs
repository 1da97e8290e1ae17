use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::help::errors::HelpError;
use crate::domain::help::models::HelpContent;
use crate::domain::help::ports::HelpRepository;
use crate::domain::help::ports::HelpServicePort;

/// Domain service implementation for the help page.
pub struct HelpService<HR>
where
    HR: HelpRepository,
{
    repository: Arc<HR>,
}

impl<HR> HelpService<HR>
where
    HR: HelpRepository,
{
    pub fn new(repository: Arc<HR>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<HR> HelpServicePort for HelpService<HR>
where
    HR: HelpRepository,
{
    async fn get(&self) -> Result<HelpContent, HelpError> {
        Ok(self.repository.find().await?.unwrap_or_default())
    }

    async fn replace(&self, content: HelpContent) -> Result<HelpContent, HelpError> {
        if let Some(position) = content
            .data
            .iter()
            .position(|item| item.kind.trim().is_empty())
        {
            return Err(HelpError::MissingItemType { position });
        }

        let stored = self.repository.upsert(content).await?;
        tracing::info!(items = stored.data.len(), "Help content replaced");
        Ok(stored)
    }
}
