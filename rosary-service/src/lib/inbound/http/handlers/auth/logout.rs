use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use super::RefreshTokenRequestBody;
use crate::domain::user::ports::UserServicePort;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::handlers::MessageData;
use crate::inbound::http::router::AppState;

/// Close a session. Always succeeds, even without a readable body.
pub async fn logout(
    State(state): State<AppState>,
    body: Option<Json<RefreshTokenRequestBody>>,
) -> ApiSuccess<MessageData> {
    match body {
        Some(Json(body)) => state.user_service.logout(&body.refresh_token).await,
        None => tracing::debug!("Logout without a refresh token"),
    }

    ApiSuccess::new(StatusCode::OK, MessageData::new("Logout successful"))
}
