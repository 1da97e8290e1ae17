use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use axum::Json;
use serde::Deserialize;

use crate::domain::user::models::ChangeEmailCommand;
use crate::domain::user::models::EmailAddress;
use crate::domain::user::ports::UserServicePort;
use crate::inbound::http::handlers::require_non_blank;
use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::handlers::MessageData;
use crate::inbound::http::handlers::ParseRequestError;
use crate::inbound::http::middleware::AuthenticatedUser;
use crate::inbound::http::router::AppState;

pub async fn change_email(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Json(body): Json<ChangeEmailRequestBody>,
) -> Result<ApiSuccess<MessageData>, ApiError> {
    state
        .user_service
        .change_email(&auth_user.user_id, body.try_into_command()?)
        .await
        .map_err(ApiError::from)
        .map(|_| {
            ApiSuccess::new(
                StatusCode::OK,
                MessageData::new("Check the new inbox to confirm the change"),
            )
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangeEmailRequestBody {
    new_email: String,
    password: String,
}

impl ChangeEmailRequestBody {
    fn try_into_command(self) -> Result<ChangeEmailCommand, ParseRequestError> {
        Ok(ChangeEmailCommand {
            new_email: EmailAddress::new(self.new_email)?,
            password: require_non_blank("password", self.password)?,
        })
    }
}
