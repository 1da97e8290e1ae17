use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;

use crate::domain::publication::models::Mystery;
use crate::domain::publication::models::RosaryPart;
use crate::domain::publication::ports::PublicationServicePort;
use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::router::AppState;

pub async fn list_indices(
    State(state): State<AppState>,
    Path((part, mystery)): Path<(String, i64)>,
) -> Result<ApiSuccess<Vec<u32>>, ApiError> {
    let part = part
        .parse::<RosaryPart>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let mystery = Mystery::new(mystery).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    state
        .publication_service
        .list_indices(part, mystery)
        .await
        .map_err(ApiError::from)
        .map(|indices| ApiSuccess::new(StatusCode::OK, indices))
}
