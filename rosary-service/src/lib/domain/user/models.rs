use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::user::errors::EmailError;
use crate::domain::user::errors::PasswordPolicyError;
use crate::domain::user::errors::UserIdError;

/// User aggregate entity.
///
/// Holds the credential state of a reader account. Pending flows (verification,
/// email change, password reset, deletion) are modelled as optional groups so
/// their fields are always set and cleared together.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: EmailAddress,
    pub password_hash: String,
    pub is_verified: bool,
    /// Oldest first
    pub refresh_tokens: Vec<RefreshTokenRecord>,
    pub verification: Option<PendingToken>,
    pub email_change: Option<PendingEmailChange>,
    pub password_reset: Option<PendingToken>,
    pub deletion: Option<ScheduledDeletion>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build a freshly registered, unverified user.
    ///
    /// # Arguments
    /// * `email` - Login identifier
    /// * `password_hash` - Digest produced by the password hasher
    /// * `verification` - Verification token awaiting confirmation
    /// * `now` - Registration instant
    ///
    /// # Returns
    /// User with no sessions and no other pending state
    pub fn new_unverified(
        email: EmailAddress,
        password_hash: String,
        verification: PendingToken,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UserId::new(),
            email,
            password_hash,
            is_verified: false,
            refresh_tokens: Vec::new(),
            verification: Some(verification),
            email_change: None,
            password_reset: None,
            deletion: None,
            created_at: now,
        }
    }

    pub fn is_deletion_pending(&self) -> bool {
        self.deletion.is_some()
    }
}

/// User unique identifier type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generate a new random user ID.
    ///
    /// # Returns
    /// UserId with random UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a user ID from string.
    ///
    /// # Arguments
    /// * `s` - UUID string to parse
    ///
    /// # Returns
    /// Parsed UserId
    ///
    /// # Errors
    /// * `InvalidFormat` - String is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self, UserIdError> {
        Uuid::parse_str(s)
            .map(UserId)
            .map_err(|e| UserIdError::InvalidFormat(e.to_string()))
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Email address type
///
/// Validates format using an RFC 5322 compliant parser. Addresses are trimmed
/// and lower-cased on construction, so equality is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Create a new validated email address.
    ///
    /// # Arguments
    /// * `email` - Raw email string
    ///
    /// # Returns
    /// Normalized EmailAddress value object
    ///
    /// # Errors
    /// * `InvalidFormat` - Email does not conform to RFC 5322
    pub fn new(email: String) -> Result<Self, EmailError> {
        let normalized = email.trim().to_lowercase();
        email_address::EmailAddress::from_str(&normalized)
            .map(|_| EmailAddress(normalized))
            .map_err(|e| EmailError::InvalidFormat(e.to_string()))
    }

    /// Get email as string slice.
    ///
    /// # Returns
    /// Email string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Password chosen by a user.
///
/// Ensures 8-30 characters with at least one lowercase letter, one uppercase
/// letter, one digit and one character that is neither.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    const MIN_LENGTH: usize = 8;
    const MAX_LENGTH: usize = 30;

    /// Create a new password that satisfies the account password policy.
    ///
    /// # Arguments
    /// * `password` - Plain text password
    ///
    /// # Returns
    /// Validated Password value object
    ///
    /// # Errors
    /// * `TooShort` - Fewer than 8 characters
    /// * `TooLong` - More than 30 characters
    /// * `MissingCharacterClass` - A required character class is absent
    pub fn new(password: String) -> Result<Self, PasswordPolicyError> {
        let length = password.chars().count();
        if length < Self::MIN_LENGTH {
            return Err(PasswordPolicyError::TooShort {
                min: Self::MIN_LENGTH,
                actual: length,
            });
        }
        if length > Self::MAX_LENGTH {
            return Err(PasswordPolicyError::TooLong {
                max: Self::MAX_LENGTH,
                actual: length,
            });
        }

        let classes: [(&'static str, fn(char) -> bool); 4] = [
            ("lowercase letter", char::is_lowercase),
            ("uppercase letter", char::is_uppercase),
            ("digit", |c| c.is_ascii_digit()),
            ("special character", |c| !c.is_alphanumeric()),
        ];
        for (name, belongs) in classes {
            if !password.chars().any(belongs) {
                return Err(PasswordPolicyError::MissingCharacterClass(name));
            }
        }

        Ok(Self(password))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Stored form of an issued refresh token.
///
/// Only the one-way digest of the token is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Single-use token with an expiry, sent by mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl PendingToken {
    /// Generate a random token valid for `ttl` from `now`.
    pub fn generate(now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            token: Uuid::new_v4().to_string(),
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Email change awaiting confirmation from the new address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEmailChange {
    pub new_email: EmailAddress,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl PendingEmailChange {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Account deletion requested by the user and not yet executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledDeletion {
    pub scheduled_at: DateTime<Utc>,
}

/// Access/refresh pair handed to the transport layer.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens").finish_non_exhaustive()
    }
}

impl From<auth::TokenPair> for SessionTokens {
    fn from(pair: auth::TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }
    }
}

/// Lifetimes, limits and link targets for the session lifecycle.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// Refresh tokens kept per user, oldest evicted first
    pub max_refresh_tokens: usize,
    pub verification_ttl: Duration,
    pub email_change_ttl: Duration,
    pub password_reset_ttl: Duration,
    /// Delay between a deletion request and its execution
    pub deletion_grace: Duration,
    /// Base URL of this API, used for verification links
    pub api_base_url: String,
    /// Base URL of the web client, used for password reset links
    pub frontend_url: String,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_refresh_tokens: 5,
            verification_ttl: Duration::hours(1),
            email_change_ttl: Duration::hours(1),
            password_reset_ttl: Duration::hours(1),
            deletion_grace: Duration::days(14),
            api_base_url: "http://localhost:3000".to_string(),
            frontend_url: "http://localhost:8081".to_string(),
        }
    }
}

/// Reason a link mail is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailPurpose {
    AccountVerification,
    EmailChange,
    PasswordReset,
}

impl MailPurpose {
    pub fn subject(&self) -> &'static str {
        match self {
            MailPurpose::AccountVerification => "Aktywuj swoje konto",
            MailPurpose::EmailChange => "Potwierdź zmianę adresu email",
            MailPurpose::PasswordReset => "Zresetuj hasło",
        }
    }
}

/// Request to mail a single-use link to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMail {
    pub to: EmailAddress,
    pub token: String,
    pub purpose: MailPurpose,
    pub base_url: String,
    pub path: String,
}

impl LinkMail {
    /// Link the recipient follows: `{base_url}{path}?token={token}`.
    pub fn link(&self) -> String {
        format!("{}{}?token={}", self.base_url, self.path, self.token)
    }
}

/// Command to register a new account
#[derive(Debug)]
pub struct RegisterCommand {
    pub email: EmailAddress,
    pub password: Password,
}

impl RegisterCommand {
    pub fn new(email: EmailAddress, password: Password) -> Self {
        Self { email, password }
    }
}

/// Command to change the password of an authenticated user
#[derive(Debug)]
pub struct ChangePasswordCommand {
    pub current_password: String,
    pub new_password: Password,
}

/// Command to start an email change for an authenticated user
#[derive(Debug)]
pub struct ChangeEmailCommand {
    pub new_email: EmailAddress,
    pub password: String,
}

/// Command to set a new password from a reset link
#[derive(Debug)]
pub struct ResetPasswordCommand {
    pub token: String,
    pub new_password: Password,
}
