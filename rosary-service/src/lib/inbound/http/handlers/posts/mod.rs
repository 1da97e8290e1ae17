pub mod create_publication;
pub mod get_publication;
pub mod list_indices;
pub mod list_outline;
pub mod update_publication;

pub use create_publication::create_publication;
pub use get_publication::get_publication;
pub use list_indices::list_indices;
pub use list_outline::list_outline;
pub use update_publication::update_publication;
use serde::Deserialize;
use serde::Serialize;

use crate::domain::publication::errors::PublicationError;
use crate::domain::publication::models::ContentItem;
use crate::domain::publication::models::DayIndex;
use crate::domain::publication::models::Mystery;
use crate::domain::publication::models::Publication;
use crate::domain::publication::models::PublicationKey;
use crate::domain::publication::models::RosaryPart;
use crate::inbound::http::handlers::ApiError;

/// Parse the key segments of a publication path.
fn parse_key(part: &str, mystery: i64, index: i64) -> Result<PublicationKey, ApiError> {
    let parse = || -> Result<PublicationKey, PublicationError> {
        Ok(PublicationKey {
            part: part.parse::<RosaryPart>()?,
            mystery: Mystery::new(mystery)?,
            index: DayIndex::new(index)?,
        })
    };
    parse().map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// HTTP request body for creating or replacing a publication (raw JSON)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PublicationRequestBody {
    part: String,
    mystery: i64,
    index: i64,
    title: String,
    data: Vec<ContentItem>,
    #[serde(default)]
    quote: Option<Vec<ContentItem>>,
    #[serde(default)]
    task: Option<Vec<ContentItem>>,
}

impl PublicationRequestBody {
    fn try_into_domain(self) -> Result<Publication, PublicationError> {
        Ok(Publication {
            key: PublicationKey {
                part: self.part.parse()?,
                mystery: Mystery::new(self.mystery)?,
                index: DayIndex::new(self.index)?,
            },
            title: self.title,
            data: self.data,
            quote: self.quote,
            task: self.task,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicationData {
    pub part: String,
    pub mystery: u8,
    pub index: u32,
    pub title: String,
    pub data: Vec<ContentItem>,
    pub quote: Option<Vec<ContentItem>>,
    pub task: Option<Vec<ContentItem>>,
}

impl From<Publication> for PublicationData {
    fn from(publication: Publication) -> Self {
        Self {
            part: publication.key.part.as_str().to_string(),
            mystery: publication.key.mystery.get(),
            index: publication.key.index.get(),
            title: publication.title,
            data: publication.data,
            quote: publication.quote,
            task: publication.task,
        }
    }
}
