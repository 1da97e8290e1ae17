use crate::domain::publication::models::ContentItem;

/// The single help page shown to readers.
///
/// Stored as one record; every update replaces the whole item list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HelpContent {
    pub data: Vec<ContentItem>,
}

impl HelpContent {
    pub fn new(data: Vec<ContentItem>) -> Self {
        Self { data }
    }
}
