use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::user::errors::MailError;
use crate::domain::user::errors::UserError;
use crate::domain::user::models::ChangeEmailCommand;
use crate::domain::user::models::ChangePasswordCommand;
use crate::domain::user::models::EmailAddress;
use crate::domain::user::models::LinkMail;
use crate::domain::user::models::PendingEmailChange;
use crate::domain::user::models::PendingToken;
use crate::domain::user::models::RefreshTokenRecord;
use crate::domain::user::models::RegisterCommand;
use crate::domain::user::models::ResetPasswordCommand;
use crate::domain::user::models::ScheduledDeletion;
use crate::domain::user::models::SessionTokens;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;

/// Port for the session lifecycle operations.
#[async_trait]
pub trait UserServicePort: Send + Sync + 'static {
    /// Register an account and mail a verification link.
    ///
    /// Succeeds whether or not the address is already taken, so callers cannot
    /// tell which accounts exist. An existing pending account keeps its password;
    /// only its verification link is renewed.
    ///
    /// # Arguments
    /// * `command` - Validated email and password
    ///
    /// # Errors
    /// * `Password` - Hashing failed
    /// * `DatabaseError` - Database operation failed
    async fn register(&self, command: RegisterCommand) -> Result<(), UserError>;

    /// Mail a fresh verification link to an unverified account.
    ///
    /// Does nothing for unknown or already verified addresses.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn resend_verification(&self, email: &EmailAddress) -> Result<(), UserError>;

    /// Confirm a registration.
    ///
    /// # Arguments
    /// * `token` - Verification token from the mailed link
    ///
    /// # Errors
    /// * `InvalidToken` - No account holds this token
    /// * `TokenExpired` - Token is past its expiry
    /// * `DatabaseError` - Database operation failed
    async fn verify_registration(&self, token: &str) -> Result<(), UserError>;

    /// Authenticate with email and password and open a session.
    ///
    /// # Returns
    /// New access/refresh pair
    ///
    /// # Errors
    /// * `InvalidCredentials` - Unknown email, unverified account or wrong password
    /// * `DatabaseError` - Database operation failed
    async fn login(&self, email: &EmailAddress, password: &str)
        -> Result<SessionTokens, UserError>;

    /// Exchange a refresh token for a new pair, invalidating the old token.
    ///
    /// # Errors
    /// * `Unauthorized` - Token is invalid, expired, unknown or already rotated
    /// * `DatabaseError` - Database operation failed
    async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, UserError>;

    /// Close the session belonging to a refresh token.
    ///
    /// Never fails; problems are logged.
    async fn logout(&self, refresh_token: &str);

    /// Change the password of a user and revoke all of their sessions.
    ///
    /// # Errors
    /// * `NotFound` - User does not exist
    /// * `PasswordUnchanged` - New password equals the current one
    /// * `Unauthorized` - Current password is wrong
    /// * `DatabaseError` - Database operation failed
    async fn change_password(
        &self,
        user_id: &UserId,
        command: ChangePasswordCommand,
    ) -> Result<(), UserError>;

    /// Start an email change and mail a confirmation link to the new address.
    ///
    /// # Errors
    /// * `NotFound` - User does not exist
    /// * `Unauthorized` - Password is wrong
    /// * `EmailAlreadyExists` - New address is in use, including by this user
    /// * `DatabaseError` - Database operation failed
    async fn change_email(
        &self,
        user_id: &UserId,
        command: ChangeEmailCommand,
    ) -> Result<(), UserError>;

    /// Apply a pending email change.
    ///
    /// # Errors
    /// * `InvalidToken` - No account holds this token
    /// * `TokenExpired` - Token is past its expiry
    /// * `NoPendingEmailChange` - Token found without a pending address
    /// * `EmailAlreadyExists` - Address was claimed in the meantime
    /// * `DatabaseError` - Database operation failed
    async fn confirm_email_change(&self, token: &str) -> Result<(), UserError>;

    /// Mail a password reset link if the address belongs to an account.
    ///
    /// Succeeds whether or not the account exists.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn request_password_reset(&self, email: &EmailAddress) -> Result<(), UserError>;

    /// Set a new password from a reset link and revoke all sessions.
    ///
    /// # Errors
    /// * `NotFound` - No account holds this token
    /// * `Unauthorized` - Token is past its expiry
    /// * `DatabaseError` - Database operation failed
    async fn reset_password(&self, command: ResetPasswordCommand) -> Result<(), UserError>;

    /// Schedule the account for deletion after the grace period.
    ///
    /// # Returns
    /// Instant at which the account becomes eligible for deletion
    ///
    /// # Errors
    /// * `NotFound` - User does not exist
    /// * `Unauthorized` - Password is wrong
    /// * `DatabaseError` - Database operation failed
    async fn mark_for_deletion(
        &self,
        user_id: &UserId,
        password: &str,
    ) -> Result<DateTime<Utc>, UserError>;

    /// Cancel a scheduled deletion.
    ///
    /// # Errors
    /// * `NotFound` - User does not exist
    /// * `DatabaseError` - Database operation failed
    async fn cancel_scheduled_deletion(&self, user_id: &UserId) -> Result<(), UserError>;

    /// Retrieve user by unique identifier.
    ///
    /// # Errors
    /// * `NotFound` - User does not exist
    /// * `DatabaseError` - Database operation failed
    async fn get_user(&self, user_id: &UserId) -> Result<User, UserError>;

    /// Resolve the user behind an access token.
    ///
    /// # Errors
    /// * `Unauthorized` - Token is invalid or expired
    async fn authenticate(&self, access_token: &str) -> Result<UserId, UserError>;
}

/// Persistence operations for the user aggregate.
///
/// Operations that close a read-check-write sequence of the session lifecycle
/// are conditional and report through their `bool` result whether they applied.
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Persist new user to storage.
    ///
    /// # Errors
    /// * `EmailAlreadyExists` - Email is already registered
    /// * `DatabaseError` - Database operation failed
    async fn create(&self, user: User) -> Result<User, UserError>;

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserError>;

    async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<User>, UserError>;

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, UserError>;

    async fn find_by_email_change_token(&self, token: &str) -> Result<Option<User>, UserError>;

    async fn find_by_password_reset_token(&self, token: &str)
        -> Result<Option<User>, UserError>;

    /// Replace the verification token of an unverified user. The password hash
    /// is left as stored.
    ///
    /// # Returns
    /// `false` if the user is missing or already verified
    async fn set_verification_pending(
        &self,
        id: &UserId,
        verification: PendingToken,
    ) -> Result<bool, UserError>;

    /// Mark the user verified and clear the verification fields, if `token` is
    /// still the current verification token.
    async fn verify_account(&self, id: &UserId, token: &str) -> Result<bool, UserError>;

    /// Append a refresh token record.
    async fn add_refresh_token(
        &self,
        id: &UserId,
        record: RefreshTokenRecord,
    ) -> Result<(), UserError>;

    /// Remove every record with `expires_at <= now`.
    ///
    /// # Returns
    /// Number of removed records
    async fn prune_refresh_tokens(&self, id: &UserId, now: DateTime<Utc>)
        -> Result<u64, UserError>;

    /// Keep only the `max` most recently added records.
    ///
    /// # Returns
    /// Number of removed records
    async fn trim_refresh_tokens(&self, id: &UserId, max: usize) -> Result<u64, UserError>;

    /// Replace the record `old_record_id` with `new_record` in the same slot.
    ///
    /// # Returns
    /// `false` if the old record no longer exists
    async fn replace_refresh_token(
        &self,
        id: &UserId,
        old_record_id: &Uuid,
        new_record: RefreshTokenRecord,
    ) -> Result<bool, UserError>;

    /// # Returns
    /// `false` if the record no longer exists
    async fn remove_refresh_token(&self, id: &UserId, record_id: &Uuid)
        -> Result<bool, UserError>;

    /// Replace the password hash and drop every refresh token record.
    ///
    /// # Errors
    /// * `NotFound` - User does not exist
    /// * `DatabaseError` - Database operation failed
    async fn update_password_and_clear_tokens(
        &self,
        id: &UserId,
        password_hash: String,
    ) -> Result<(), UserError>;

    /// Store a pending email change, replacing any previous one.
    async fn mark_email_change_pending(
        &self,
        id: &UserId,
        change: PendingEmailChange,
    ) -> Result<(), UserError>;

    /// Promote `new_email` to the confirmed email and clear the pending fields,
    /// if `token` and `new_email` still describe the pending change.
    ///
    /// # Errors
    /// * `EmailAlreadyExists` - Pending address was claimed by another account
    /// * `DatabaseError` - Database operation failed
    async fn confirm_email_change(
        &self,
        id: &UserId,
        token: &str,
        new_email: &EmailAddress,
    ) -> Result<bool, UserError>;

    /// Store a password reset token, replacing any previous one.
    async fn set_password_reset_token(
        &self,
        id: &UserId,
        reset: PendingToken,
    ) -> Result<(), UserError>;

    /// Replace the password hash, clear the reset fields and drop every refresh
    /// token record, if `token` is still the current reset token.
    async fn reset_password(
        &self,
        id: &UserId,
        token: &str,
        password_hash: String,
    ) -> Result<bool, UserError>;

    async fn mark_for_deletion(
        &self,
        id: &UserId,
        deletion: ScheduledDeletion,
    ) -> Result<(), UserError>;

    /// # Returns
    /// `true` if a deletion was pending
    async fn cancel_scheduled_deletion(&self, id: &UserId) -> Result<bool, UserError>;
}

/// Outbound mail for single-use links.
#[async_trait]
pub trait MailDispatcher: Send + Sync + 'static {
    /// Send a mail carrying `mail.link()` to `mail.to`.
    ///
    /// # Errors
    /// * `InvalidAddress` - Sender or recipient rejected
    /// * `BuildFailed` - Message could not be assembled
    /// * `SendFailed` - Transport failed
    async fn send_link_mail(&self, mail: &LinkMail) -> Result<(), MailError>;
}
