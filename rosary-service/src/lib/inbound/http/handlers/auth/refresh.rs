use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use super::RefreshTokenRequestBody;
use super::SessionTokensData;
use crate::domain::user::ports::UserServicePort;
use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::router::AppState;

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequestBody>,
) -> Result<ApiSuccess<SessionTokensData>, ApiError> {
    state
        .user_service
        .refresh(&body.refresh_token)
        .await
        .map_err(ApiError::from)
        .map(|tokens| ApiSuccess::new(StatusCode::OK, tokens.into()))
}
