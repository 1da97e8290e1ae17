use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::domain::help::errors::HelpError;
use crate::domain::publication::errors::PublicationError;
use crate::domain::user::errors::EmailError;
use crate::domain::user::errors::PasswordPolicyError;
use crate::domain::user::errors::UserError;

pub mod auth;
pub mod help;
pub mod posts;
pub mod users;

#[derive(Debug, Clone)]
pub struct ApiSuccess<T: Serialize + PartialEq>(StatusCode, Json<ApiResponseBody<T>>);

impl<T> PartialEq for ApiSuccess<T>
where
    T: Serialize + PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0 && self.1 .0 == other.1 .0
    }
}

impl<T: Serialize + PartialEq> ApiSuccess<T> {
    pub fn new(status: StatusCode, data: T) -> Self {
        ApiSuccess(status, Json(ApiResponseBody::new(status, data)))
    }
}

impl<T: Serialize + PartialEq> IntoResponse for ApiSuccess<T> {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    InternalServerError(String),
    UnprocessableEntity(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unauthorized(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InternalServerError(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::UnprocessableEntity(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
        };

        (status, Json(ApiResponseBody::new_error(status, message))).into_response()
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound(_) => ApiError::NotFound(err.to_string()),
            UserError::EmailAlreadyExists(_) => ApiError::Conflict(err.to_string()),
            UserError::InvalidCredentials | UserError::Unauthorized(_) => {
                ApiError::Unauthorized(err.to_string())
            }
            UserError::InvalidToken
            | UserError::TokenExpired
            | UserError::PasswordUnchanged
            | UserError::NoPendingEmailChange => ApiError::BadRequest(err.to_string()),
            UserError::InvalidEmail(_)
            | UserError::InvalidPassword(_)
            | UserError::InvalidUserId(_) => ApiError::UnprocessableEntity(err.to_string()),
            UserError::Password(_)
            | UserError::Token(_)
            | UserError::DatabaseError(_)
            | UserError::Unknown(_) => ApiError::InternalServerError(err.to_string()),
        }
    }
}

impl From<PublicationError> for ApiError {
    fn from(err: PublicationError) -> Self {
        match err {
            PublicationError::NotFound(_) => ApiError::NotFound(err.to_string()),
            PublicationError::AlreadyExists(_) => ApiError::Conflict(err.to_string()),
            PublicationError::InvalidPart(_)
            | PublicationError::InvalidMystery(_)
            | PublicationError::InvalidIndex(_)
            | PublicationError::EmptyTitle => ApiError::UnprocessableEntity(err.to_string()),
            PublicationError::DatabaseError(msg) => ApiError::InternalServerError(msg),
        }
    }
}

impl From<HelpError> for ApiError {
    fn from(err: HelpError) -> Self {
        match err {
            HelpError::MissingItemType { .. } => ApiError::UnprocessableEntity(err.to_string()),
            HelpError::DatabaseError(msg) => ApiError::InternalServerError(msg),
        }
    }
}

/// Request body field that failed validation.
#[derive(Debug, Clone, Error)]
pub enum ParseRequestError {
    #[error("Invalid email: {0}")]
    Email(#[from] EmailError),

    #[error("Invalid password: {0}")]
    Password(#[from] PasswordPolicyError),

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl From<ParseRequestError> for ApiError {
    fn from(err: ParseRequestError) -> Self {
        ApiError::UnprocessableEntity(err.to_string())
    }
}

/// Reject values that are empty or whitespace only.
pub fn require_non_blank(field: &'static str, value: String) -> Result<String, ParseRequestError> {
    if value.trim().is_empty() {
        return Err(ParseRequestError::Empty(field));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponseBody<T: Serialize + PartialEq> {
    status_code: u16,
    data: T,
}

impl<T: Serialize + PartialEq> ApiResponseBody<T> {
    pub fn new(status_code: StatusCode, data: T) -> Self {
        Self {
            status_code: status_code.as_u16(),
            data,
        }
    }
}

impl ApiResponseBody<ApiErrorData> {
    pub fn new_error(status_code: StatusCode, message: String) -> Self {
        Self {
            status_code: status_code.as_u16(),
            data: ApiErrorData { message },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiErrorData {
    pub message: String,
}

/// Payload of endpoints that only report an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageData {
    pub message: String,
}

impl MessageData {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}
