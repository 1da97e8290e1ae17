pub mod login;
pub mod logout;
pub mod refresh;
pub mod register;
pub mod remind_password;
pub mod resend_verification;
pub mod reset_password;
pub mod verify_account;
pub mod verify_email;

pub use login::login;
pub use logout::logout;
pub use refresh::refresh;
pub use register::register;
pub use remind_password::remind_password;
pub use resend_verification::resend_verification;
pub use reset_password::reset_password;
pub use verify_account::verify_account;
pub use verify_email::verify_email;
use serde::Deserialize;
use serde::Serialize;

use crate::domain::user::models::SessionTokens;

/// Body carrying a single email address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmailRequestBody {
    pub email: String,
}

/// Body carrying a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshTokenRequestBody {
    pub refresh_token: String,
}

/// Query string of mailed links.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionTokensData {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<SessionTokens> for SessionTokensData {
    fn from(tokens: SessionTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }
    }
}
