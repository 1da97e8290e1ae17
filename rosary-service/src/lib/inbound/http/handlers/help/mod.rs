use serde::Deserialize;
use serde::Serialize;

use crate::domain::help::models::HelpContent;
use crate::domain::publication::models::ContentItem;

pub mod get_help;
pub mod update_help;

pub use get_help::get_help;
pub use update_help::update_help;

/// HTTP request body replacing the help page (raw JSON)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HelpRequestBody {
    data: Vec<ContentItem>,
}

impl From<HelpRequestBody> for HelpContent {
    fn from(body: HelpRequestBody) -> Self {
        HelpContent::new(body.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HelpData {
    pub data: Vec<ContentItem>,
}

impl From<HelpContent> for HelpData {
    fn from(content: HelpContent) -> Self {
        Self { data: content.data }
    }
}
