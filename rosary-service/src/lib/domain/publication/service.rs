use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::publication::errors::PublicationError;
use crate::domain::publication::models::Mystery;
use crate::domain::publication::models::PartOutline;
use crate::domain::publication::models::Publication;
use crate::domain::publication::models::PublicationKey;
use crate::domain::publication::models::RosaryPart;
use crate::domain::publication::ports::PublicationRepository;
use crate::domain::publication::ports::PublicationServicePort;

/// Domain service implementation for publication operations.
pub struct PublicationService<PR>
where
    PR: PublicationRepository,
{
    repository: Arc<PR>,
}

impl<PR> PublicationService<PR>
where
    PR: PublicationRepository,
{
    /// Create a new publication service.
    ///
    /// # Arguments
    /// * `repository` - Publication persistence implementation
    ///
    /// # Returns
    /// Configured publication service instance
    pub fn new(repository: Arc<PR>) -> Self {
        Self { repository }
    }

    fn validate(publication: &Publication) -> Result<(), PublicationError> {
        if publication.title.trim().is_empty() {
            return Err(PublicationError::EmptyTitle);
        }
        Ok(())
    }
}

#[async_trait]
impl<PR> PublicationServicePort for PublicationService<PR>
where
    PR: PublicationRepository,
{
    async fn list_outline(&self) -> Result<Vec<PartOutline>, PublicationError> {
        let keys = self.repository.list_keys().await?;

        let outline = RosaryPart::ALL
            .into_iter()
            .map(|part| {
                let mut mysteries = vec![Vec::new(); Mystery::COUNT as usize];
                for key in keys.iter().filter(|key| key.part == part) {
                    mysteries[(key.mystery.get() - 1) as usize].push(key.index.get());
                }
                mysteries.iter_mut().for_each(|indices| indices.sort_unstable());
                PartOutline { part, mysteries }
            })
            .collect();

        Ok(outline)
    }

    async fn list_indices(
        &self,
        part: RosaryPart,
        mystery: Mystery,
    ) -> Result<Vec<u32>, PublicationError> {
        let mut indices = self.repository.list_indices(part, mystery).await?;
        indices.sort_unstable();
        Ok(indices)
    }

    async fn get(&self, key: &PublicationKey) -> Result<Publication, PublicationError> {
        self.repository
            .find(key)
            .await?
            .ok_or_else(|| PublicationError::NotFound(key.to_string()))
    }

    async fn create(&self, publication: Publication) -> Result<Publication, PublicationError> {
        Self::validate(&publication)?;
        let created = self.repository.create(publication).await?;
        tracing::info!(key = %created.key, "Publication created");
        Ok(created)
    }

    async fn update(&self, publication: Publication) -> Result<Publication, PublicationError> {
        Self::validate(&publication)?;
        let updated = self.repository.update(publication).await?;
        tracing::info!(key = %updated.key, "Publication updated");
        Ok(updated)
    }
}
