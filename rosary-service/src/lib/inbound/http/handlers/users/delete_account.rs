use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use axum::Json;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::domain::user::ports::UserServicePort;
use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::middleware::AuthenticatedUser;
use crate::inbound::http::router::AppState;

/// Schedule the account for deletion. Logging in again before the deadline
/// cancels it.
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Json(body): Json<DeleteAccountRequestBody>,
) -> Result<ApiSuccess<DeleteAccountResponseData>, ApiError> {
    state
        .user_service
        .mark_for_deletion(&auth_user.user_id, &body.password)
        .await
        .map_err(ApiError::from)
        .map(|scheduled_at| {
            ApiSuccess::new(
                StatusCode::ACCEPTED,
                DeleteAccountResponseData { scheduled_at },
            )
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeleteAccountRequestBody {
    password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteAccountResponseData {
    pub scheduled_at: DateTime<Utc>,
}
