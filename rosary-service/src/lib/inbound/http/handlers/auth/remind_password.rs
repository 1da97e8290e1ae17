use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use super::EmailRequestBody;
use crate::domain::user::models::EmailAddress;
use crate::domain::user::ports::UserServicePort;
use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::handlers::MessageData;
use crate::inbound::http::handlers::ParseRequestError;
use crate::inbound::http::router::AppState;

/// Request a password reset link. The response does not reveal whether the
/// account exists.
pub async fn remind_password(
    State(state): State<AppState>,
    Json(body): Json<EmailRequestBody>,
) -> Result<ApiSuccess<MessageData>, ApiError> {
    let email = EmailAddress::new(body.email).map_err(ParseRequestError::from)?;

    state
        .user_service
        .request_password_reset(&email)
        .await
        .map_err(ApiError::from)
        .map(|_| {
            ApiSuccess::new(
                StatusCode::OK,
                MessageData::new("If the account exists, a reset link was sent"),
            )
        })
}
