use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use axum::Json;

use super::HelpData;
use super::HelpRequestBody;
use crate::domain::help::ports::HelpServicePort;
use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::middleware::AuthenticatedUser;
use crate::inbound::http::router::AppState;

/// Replace the help page with the items in the body.
pub async fn update_help(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Json(body): Json<HelpRequestBody>,
) -> Result<ApiSuccess<HelpData>, ApiError> {
    tracing::debug!(user_id = %auth_user.user_id, items = body.data.len(), "Replacing help content");

    state
        .help_service
        .replace(body.into())
        .await
        .map_err(ApiError::from)
        .map(|content| ApiSuccess::new(StatusCode::OK, content.into()))
}
