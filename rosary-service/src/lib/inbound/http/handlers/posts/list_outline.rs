use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::domain::publication::models::PartOutline;
use crate::domain::publication::ports::PublicationServicePort;
use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::router::AppState;

pub async fn list_outline(
    State(state): State<AppState>,
) -> Result<ApiSuccess<Vec<PartOutlineData>>, ApiError> {
    state
        .publication_service
        .list_outline()
        .await
        .map_err(ApiError::from)
        .map(|outline| {
            ApiSuccess::new(
                StatusCode::OK,
                outline.into_iter().map(PartOutlineData::from).collect(),
            )
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartOutlineData {
    pub part: String,
    /// Day indices per mystery, mystery 1 first
    pub mysteries: Vec<Vec<u32>>,
}

impl From<PartOutline> for PartOutlineData {
    fn from(outline: PartOutline) -> Self {
        Self {
            part: outline.part.as_str().to_string(),
            mysteries: outline.mysteries,
        }
    }
}
