use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;

use super::parse_key;
use super::PublicationData;
use crate::domain::publication::ports::PublicationServicePort;
use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::router::AppState;

pub async fn get_publication(
    State(state): State<AppState>,
    Path((part, mystery, index)): Path<(String, i64, i64)>,
) -> Result<ApiSuccess<PublicationData>, ApiError> {
    let key = parse_key(&part, mystery, index)?;

    state
        .publication_service
        .get(&key)
        .await
        .map_err(ApiError::from)
        .map(|publication| ApiSuccess::new(StatusCode::OK, publication.into()))
}
