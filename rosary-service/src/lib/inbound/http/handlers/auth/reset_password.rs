use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::domain::user::models::Password;
use crate::domain::user::models::ResetPasswordCommand;
use crate::domain::user::ports::UserServicePort;
use crate::inbound::http::handlers::require_non_blank;
use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::handlers::MessageData;
use crate::inbound::http::handlers::ParseRequestError;
use crate::inbound::http::router::AppState;

pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequestBody>,
) -> Result<ApiSuccess<MessageData>, ApiError> {
    state
        .user_service
        .reset_password(body.try_into_command()?)
        .await
        .map_err(ApiError::from)
        .map(|_| ApiSuccess::new(StatusCode::OK, MessageData::new("Password changed")))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResetPasswordRequestBody {
    token: String,
    new_password: String,
}

impl ResetPasswordRequestBody {
    fn try_into_command(self) -> Result<ResetPasswordCommand, ParseRequestError> {
        Ok(ResetPasswordCommand {
            token: require_non_blank("token", self.token)?,
            new_password: Password::new(self.new_password)?,
        })
    }
}
