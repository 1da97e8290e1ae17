use async_trait::async_trait;

use crate::domain::publication::errors::PublicationError;
use crate::domain::publication::models::Mystery;
use crate::domain::publication::models::PartOutline;
use crate::domain::publication::models::Publication;
use crate::domain::publication::models::PublicationKey;
use crate::domain::publication::models::RosaryPart;

/// Port for publication operations.
#[async_trait]
pub trait PublicationServicePort: Send + Sync + 'static {
    /// Day indices of every mystery, grouped by part in canonical order.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn list_outline(&self) -> Result<Vec<PartOutline>, PublicationError>;

    /// Sorted day indices of one mystery.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn list_indices(
        &self,
        part: RosaryPart,
        mystery: Mystery,
    ) -> Result<Vec<u32>, PublicationError>;

    /// # Errors
    /// * `NotFound` - No publication for this key
    /// * `DatabaseError` - Database operation failed
    async fn get(&self, key: &PublicationKey) -> Result<Publication, PublicationError>;

    /// # Errors
    /// * `EmptyTitle` - Title is blank
    /// * `AlreadyExists` - Key is taken
    /// * `DatabaseError` - Database operation failed
    async fn create(&self, publication: Publication) -> Result<Publication, PublicationError>;

    /// # Errors
    /// * `EmptyTitle` - Title is blank
    /// * `NotFound` - No publication for this key
    /// * `DatabaseError` - Database operation failed
    async fn update(&self, publication: Publication) -> Result<Publication, PublicationError>;
}

/// Persistence operations for publications.
#[async_trait]
pub trait PublicationRepository: Send + Sync + 'static {
    /// # Errors
    /// * `AlreadyExists` - Key is taken
    async fn create(&self, publication: Publication) -> Result<Publication, PublicationError>;

    /// # Errors
    /// * `NotFound` - No publication for this key
    async fn update(&self, publication: Publication) -> Result<Publication, PublicationError>;

    async fn find(&self, key: &PublicationKey) -> Result<Option<Publication>, PublicationError>;

    async fn list_keys(&self) -> Result<Vec<PublicationKey>, PublicationError>;

    async fn list_indices(
        &self,
        part: RosaryPart,
        mystery: Mystery,
    ) -> Result<Vec<u32>, PublicationError>;
}
