use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use axum::Json;

use super::PublicationData;
use super::PublicationRequestBody;
use crate::domain::publication::ports::PublicationServicePort;
use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::middleware::AuthenticatedUser;
use crate::inbound::http::router::AppState;

/// Replace the content of an existing publication, addressed by the key in the body.
pub async fn update_publication(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Json(body): Json<PublicationRequestBody>,
) -> Result<ApiSuccess<PublicationData>, ApiError> {
    let publication = body.try_into_domain()?;
    tracing::debug!(user_id = %auth_user.user_id, key = %publication.key, "Updating publication");

    state
        .publication_service
        .update(publication)
        .await
        .map_err(ApiError::from)
        .map(|publication| ApiSuccess::new(StatusCode::OK, publication.into()))
}
