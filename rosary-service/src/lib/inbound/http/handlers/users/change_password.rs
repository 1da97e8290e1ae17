use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use axum::Json;
use serde::Deserialize;

use crate::domain::user::models::ChangePasswordCommand;
use crate::domain::user::models::Password;
use crate::domain::user::ports::UserServicePort;
use crate::inbound::http::handlers::require_non_blank;
use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::handlers::MessageData;
use crate::inbound::http::handlers::ParseRequestError;
use crate::inbound::http::middleware::AuthenticatedUser;
use crate::inbound::http::router::AppState;

/// Change the password and sign out every session of the user.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Json(body): Json<ChangePasswordRequestBody>,
) -> Result<ApiSuccess<MessageData>, ApiError> {
    state
        .user_service
        .change_password(&auth_user.user_id, body.try_into_command()?)
        .await
        .map_err(ApiError::from)
        .map(|_| ApiSuccess::new(StatusCode::OK, MessageData::new("Password changed")))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangePasswordRequestBody {
    current_password: String,
    new_password: String,
}

impl ChangePasswordRequestBody {
    fn try_into_command(self) -> Result<ChangePasswordCommand, ParseRequestError> {
        Ok(ChangePasswordCommand {
            current_password: require_non_blank("current_password", self.current_password)?,
            new_password: Password::new(self.new_password)?,
        })
    }
}
