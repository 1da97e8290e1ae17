use axum::extract::State;
use axum::http::StatusCode;

use super::HelpData;
use crate::domain::help::ports::HelpServicePort;
use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::router::AppState;

pub async fn get_help(State(state): State<AppState>) -> Result<ApiSuccess<HelpData>, ApiError> {
    state
        .help_service
        .get()
        .await
        .map_err(ApiError::from)
        .map(|content| ApiSuccess::new(StatusCode::OK, content.into()))
}
