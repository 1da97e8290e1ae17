use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;

use super::TokenQuery;
use crate::domain::user::ports::UserServicePort;
use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::handlers::MessageData;
use crate::inbound::http::router::AppState;

pub async fn verify_account(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<ApiSuccess<MessageData>, ApiError> {
    state
        .user_service
        .verify_registration(&query.token)
        .await
        .map_err(ApiError::from)
        .map(|_| ApiSuccess::new(StatusCode::OK, MessageData::new("Account activated")))
}
