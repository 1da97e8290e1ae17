use std::sync::Arc;

use async_trait::async_trait;
use auth::PasswordHasher;
use auth::TokenIssuer;
use chrono::DateTime;
use chrono::Utc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::domain::user::errors::UserError;
use crate::domain::user::models::ChangeEmailCommand;
use crate::domain::user::models::ChangePasswordCommand;
use crate::domain::user::models::EmailAddress;
use crate::domain::user::models::LinkMail;
use crate::domain::user::models::MailPurpose;
use crate::domain::user::models::PendingEmailChange;
use crate::domain::user::models::PendingToken;
use crate::domain::user::models::RefreshTokenRecord;
use crate::domain::user::models::RegisterCommand;
use crate::domain::user::models::ResetPasswordCommand;
use crate::domain::user::models::ScheduledDeletion;
use crate::domain::user::models::SessionPolicy;
use crate::domain::user::models::SessionTokens;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;
use crate::domain::user::ports::MailDispatcher;
use crate::domain::user::ports::UserRepository;
use crate::domain::user::ports::UserServicePort;

const VERIFY_ACCOUNT_PATH: &str = "/api/auth/verify-account";
const VERIFY_EMAIL_PATH: &str = "/api/auth/verify-email";
const RESET_PASSWORD_PATH: &str = "/reset-password";
const DECOY_PASSWORD: &str = "decoy-password-never-issued";

/// Domain service implementation for the session lifecycle.
///
/// Holds no per-user state; every operation reads the current record from the
/// repository and closes its read-check-write sequence with a conditional
/// repository update.
pub struct UserService<UR, MD>
where
    UR: UserRepository,
    MD: MailDispatcher,
{
    repository: Arc<UR>,
    mail_dispatcher: Arc<MD>,
    password_hasher: Arc<PasswordHasher>,
    token_issuer: Arc<TokenIssuer>,
    policy: SessionPolicy,
    /// Verified against on login misses so unknown addresses cost a full check.
    decoy_hash: OnceCell<String>,
}

impl<UR, MD> UserService<UR, MD>
where
    UR: UserRepository,
    MD: MailDispatcher,
{
    /// Create a new user service with injected dependencies.
    ///
    /// # Arguments
    /// * `repository` - User persistence implementation
    /// * `mail_dispatcher` - Outbound link mail implementation
    /// * `password_hasher` - Hasher for passwords and refresh tokens
    /// * `token_issuer` - Access/refresh token issuer
    /// * `policy` - Lifetimes, limits and link targets
    ///
    /// # Returns
    /// Configured user service instance
    pub fn new(
        repository: Arc<UR>,
        mail_dispatcher: Arc<MD>,
        password_hasher: Arc<PasswordHasher>,
        token_issuer: Arc<TokenIssuer>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            repository,
            mail_dispatcher,
            password_hasher,
            token_issuer,
            policy,
            decoy_hash: OnceCell::new(),
        }
    }

    async fn hash_secret(&self, secret: String) -> Result<String, UserError> {
        let hasher = Arc::clone(&self.password_hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| UserError::Unknown(format!("Hashing task failed: {}", e)))?
            .map_err(UserError::from)
    }

    async fn verify_secret(&self, secret: &str, hash: &str) -> Result<bool, UserError> {
        let hasher = Arc::clone(&self.password_hasher);
        let (secret, hash) = (secret.to_string(), hash.to_string());
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &hash))
            .await
            .map_err(|e| UserError::Unknown(format!("Verification task failed: {}", e)))?
            .map_err(UserError::from)
    }

    async fn verify_decoy(&self, password: &str) -> Result<(), UserError> {
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| self.hash_secret(DECOY_PASSWORD.to_string()))
            .await?;
        self.verify_secret(password, decoy).await?;
        Ok(())
    }

    /// Scan every stored record for one whose digest matches `token`.
    ///
    /// Digests are salted, so there is no indexed lookup. Malformed digests never
    /// match.
    async fn find_refresh_record(
        &self,
        token: &str,
        records: Vec<RefreshTokenRecord>,
    ) -> Result<Option<RefreshTokenRecord>, UserError> {
        let hasher = Arc::clone(&self.password_hasher);
        let token = token.to_string();
        tokio::task::spawn_blocking(move || {
            records
                .into_iter()
                .find(|record| matches!(hasher.verify(&token, &record.token_hash), Ok(true)))
        })
        .await
        .map_err(|e| UserError::Unknown(format!("Verification task failed: {}", e)))
    }

    async fn issue_session(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(SessionTokens, RefreshTokenRecord), UserError> {
        let pair = self.token_issuer.issue_pair(&user_id.to_string(), now)?;
        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            token_hash: self.hash_secret(pair.refresh_token.clone()).await?,
            expires_at: pair.refresh_expires_at,
            created_at: now,
        };
        Ok((pair.into(), record))
    }

    /// Resolve the user and stored record behind a refresh token.
    async fn resolve_refresh_token(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(User, RefreshTokenRecord), UserError> {
        let claims = self
            .token_issuer
            .verify_refresh(refresh_token)
            .map_err(|e| UserError::Unauthorized(format!("Refresh token rejected: {}", e)))?;

        let user_id = UserId::from_string(&claims.sub)
            .map_err(|_| UserError::Unauthorized("Refresh token has no valid subject".to_string()))?;

        let user = self
            .repository
            .find_by_id(&user_id)
            .await?
            .ok_or_else(|| UserError::NotFound(user_id.to_string()))?;

        let record = self
            .find_refresh_record(refresh_token, user.refresh_tokens.clone())
            .await?
            .filter(|record| !record.is_expired(now))
            .ok_or_else(|| UserError::Unauthorized("No matching session".to_string()))?;

        Ok((user, record))
    }

    async fn dispatch(&self, mail: LinkMail) {
        if let Err(e) = self.mail_dispatcher.send_link_mail(&mail).await {
            tracing::error!(
                purpose = ?mail.purpose,
                error = %e,
                "Failed to send link mail"
            );
        }
    }

    fn link_mail(
        &self,
        to: EmailAddress,
        token: String,
        purpose: MailPurpose,
    ) -> LinkMail {
        let (base_url, path) = match purpose {
            MailPurpose::AccountVerification => (&self.policy.api_base_url, VERIFY_ACCOUNT_PATH),
            MailPurpose::EmailChange => (&self.policy.api_base_url, VERIFY_EMAIL_PATH),
            MailPurpose::PasswordReset => (&self.policy.frontend_url, RESET_PASSWORD_PATH),
        };

        LinkMail {
            to,
            token,
            purpose,
            base_url: base_url.clone(),
            path: path.to_string(),
        }
    }

    async fn require_user(&self, user_id: &UserId) -> Result<User, UserError> {
        self.repository
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| UserError::NotFound(user_id.to_string()))
    }

    async fn require_password(&self, user: &User, password: &str) -> Result<(), UserError> {
        if self.verify_secret(password, &user.password_hash).await? {
            Ok(())
        } else {
            Err(UserError::Unauthorized("Incorrect password".to_string()))
        }
    }
}

#[async_trait]
impl<UR, MD> UserServicePort for UserService<UR, MD>
where
    UR: UserRepository,
    MD: MailDispatcher,
{
    async fn register(&self, command: RegisterCommand) -> Result<(), UserError> {
        let now = Utc::now();
        let RegisterCommand { email, password } = command;

        if let Some(user) = self.repository.find_by_email(&email).await? {
            if user.is_verified {
                tracing::info!(user_id = %user.id, "Registration ignored for verified account");
                return Ok(());
            }

            // The stored hash stays; only the verification link is renewed
            let verification = PendingToken::generate(now, self.policy.verification_ttl);
            let token = verification.token.clone();
            if !self
                .repository
                .set_verification_pending(&user.id, verification)
                .await?
            {
                tracing::info!(user_id = %user.id, "Registration raced with verification");
                return Ok(());
            }
            tracing::info!(user_id = %user.id, "Verification link renewed by registration");
            self.dispatch(self.link_mail(user.email, token, MailPurpose::AccountVerification))
                .await;
            return Ok(());
        }

        let password_hash = self.hash_secret(password.as_str().to_string()).await?;
        let verification = PendingToken::generate(now, self.policy.verification_ttl);
        let token = verification.token.clone();

        let user = User::new_unverified(email.clone(), password_hash, verification, now);
        match self.repository.create(user).await {
            Ok(created) => {
                tracing::info!(user_id = %created.id, "User registered");
            }
            Err(UserError::EmailAlreadyExists(_)) => {
                tracing::info!("Registration raced with another registration");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        self.dispatch(self.link_mail(email, token, MailPurpose::AccountVerification))
            .await;

        Ok(())
    }

    async fn resend_verification(&self, email: &EmailAddress) -> Result<(), UserError> {
        let now = Utc::now();

        let user = match self.repository.find_by_email(email).await? {
            Some(user) if !user.is_verified => user,
            _ => {
                tracing::debug!("Verification resend skipped");
                return Ok(());
            }
        };

        let verification = PendingToken::generate(now, self.policy.verification_ttl);
        let token = verification.token.clone();
        if self
            .repository
            .set_verification_pending(&user.id, verification)
            .await?
        {
            self.dispatch(self.link_mail(user.email, token, MailPurpose::AccountVerification))
                .await;
        }

        Ok(())
    }

    async fn verify_registration(&self, token: &str) -> Result<(), UserError> {
        let now = Utc::now();

        let user = self
            .repository
            .find_by_verification_token(token)
            .await?
            .ok_or(UserError::InvalidToken)?;
        let pending = user.verification.as_ref().ok_or(UserError::InvalidToken)?;

        if pending.is_expired(now) {
            return Err(UserError::TokenExpired);
        }

        if !self.repository.verify_account(&user.id, token).await? {
            return Err(UserError::InvalidToken);
        }

        tracing::info!(user_id = %user.id, "Account verified");
        Ok(())
    }

    async fn login(
        &self,
        email: &EmailAddress,
        password: &str,
    ) -> Result<SessionTokens, UserError> {
        let now = Utc::now();

        let Some(user) = self.repository.find_by_email(email).await? else {
            self.verify_decoy(password).await?;
            return Err(UserError::InvalidCredentials);
        };

        if !self.verify_secret(password, &user.password_hash).await? || !user.is_verified {
            return Err(UserError::InvalidCredentials);
        }

        let (tokens, record) = self.issue_session(&user.id, now).await?;

        self.repository.add_refresh_token(&user.id, record).await?;
        let pruned = self.repository.prune_refresh_tokens(&user.id, now).await?;
        let trimmed = self
            .repository
            .trim_refresh_tokens(&user.id, self.policy.max_refresh_tokens)
            .await?;

        if user.is_deletion_pending() && self.repository.cancel_scheduled_deletion(&user.id).await?
        {
            tracing::info!(user_id = %user.id, "Scheduled deletion cancelled by login");
        }

        tracing::info!(user_id = %user.id, pruned, trimmed, "User logged in");
        Ok(tokens)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, UserError> {
        let now = Utc::now();
        let denied = || UserError::Unauthorized("Could not refresh tokens".to_string());

        let (user, record) = match self.resolve_refresh_token(refresh_token, now).await {
            Ok(resolved) => resolved,
            Err(UserError::DatabaseError(e)) => return Err(UserError::DatabaseError(e)),
            Err(e) => {
                tracing::debug!(error = %e, "Refresh denied");
                return Err(denied());
            }
        };

        let (tokens, new_record) = self.issue_session(&user.id, now).await?;

        if !self
            .repository
            .replace_refresh_token(&user.id, &record.id, new_record)
            .await?
        {
            tracing::warn!(user_id = %user.id, "Refresh token already rotated");
            return Err(denied());
        }

        tracing::debug!(user_id = %user.id, "Session refreshed");
        Ok(tokens)
    }

    async fn logout(&self, refresh_token: &str) {
        let now = Utc::now();

        let (user, record) = match self.resolve_refresh_token(refresh_token, now).await {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(error = %e, "Logout ignored");
                return;
            }
        };

        match self.repository.remove_refresh_token(&user.id, &record.id).await {
            Ok(true) => tracing::info!(user_id = %user.id, "User logged out"),
            Ok(false) => tracing::warn!(user_id = %user.id, "Session already closed"),
            Err(e) => tracing::warn!(user_id = %user.id, error = %e, "Logout failed"),
        }
    }

    async fn change_password(
        &self,
        user_id: &UserId,
        command: ChangePasswordCommand,
    ) -> Result<(), UserError> {
        let user = self.require_user(user_id).await?;

        if command.current_password == command.new_password.as_str() {
            return Err(UserError::PasswordUnchanged);
        }

        self.require_password(&user, &command.current_password).await?;

        let password_hash = self
            .hash_secret(command.new_password.as_str().to_string())
            .await?;
        self.repository
            .update_password_and_clear_tokens(&user.id, password_hash)
            .await?;

        tracing::info!(user_id = %user.id, "Password changed, sessions revoked");
        Ok(())
    }

    async fn change_email(
        &self,
        user_id: &UserId,
        command: ChangeEmailCommand,
    ) -> Result<(), UserError> {
        let now = Utc::now();
        let user = self.require_user(user_id).await?;

        self.require_password(&user, &command.password).await?;

        let taken = user.email == command.new_email
            || self
                .repository
                .find_by_email(&command.new_email)
                .await?
                .is_some();
        if taken {
            return Err(UserError::EmailAlreadyExists(
                command.new_email.as_str().to_string(),
            ));
        }

        let pending = PendingToken::generate(now, self.policy.email_change_ttl);
        let change = PendingEmailChange {
            new_email: command.new_email,
            token: pending.token,
            expires_at: pending.expires_at,
        };
        self.repository
            .mark_email_change_pending(&user.id, change.clone())
            .await?;

        tracing::info!(user_id = %user.id, "Email change requested");
        self.dispatch(self.link_mail(change.new_email, change.token, MailPurpose::EmailChange))
            .await;

        Ok(())
    }

    async fn confirm_email_change(&self, token: &str) -> Result<(), UserError> {
        let now = Utc::now();

        let user = self
            .repository
            .find_by_email_change_token(token)
            .await?
            .ok_or(UserError::InvalidToken)?;
        let change = user
            .email_change
            .as_ref()
            .ok_or(UserError::NoPendingEmailChange)?;

        if change.is_expired(now) {
            return Err(UserError::TokenExpired);
        }

        if !self
            .repository
            .confirm_email_change(&user.id, token, &change.new_email)
            .await?
        {
            return Err(UserError::InvalidToken);
        }

        tracing::info!(user_id = %user.id, "Email change confirmed");
        Ok(())
    }

    async fn request_password_reset(&self, email: &EmailAddress) -> Result<(), UserError> {
        let now = Utc::now();

        let Some(user) = self.repository.find_by_email(email).await? else {
            tracing::debug!("Password reset requested for unknown account");
            return Ok(());
        };

        let reset = PendingToken::generate(now, self.policy.password_reset_ttl);
        let token = reset.token.clone();
        self.repository
            .set_password_reset_token(&user.id, reset)
            .await?;

        tracing::info!(user_id = %user.id, "Password reset requested");
        self.dispatch(self.link_mail(user.email, token, MailPurpose::PasswordReset))
            .await;

        Ok(())
    }

    async fn reset_password(&self, command: ResetPasswordCommand) -> Result<(), UserError> {
        let now = Utc::now();
        let not_found = || UserError::NotFound("Invalid token".to_string());

        let user = self
            .repository
            .find_by_password_reset_token(&command.token)
            .await?
            .ok_or_else(not_found)?;
        let reset = user.password_reset.as_ref().ok_or_else(not_found)?;

        if reset.is_expired(now) {
            return Err(UserError::Unauthorized("Token expired".to_string()));
        }

        let password_hash = self
            .hash_secret(command.new_password.as_str().to_string())
            .await?;
        if !self
            .repository
            .reset_password(&user.id, &command.token, password_hash)
            .await?
        {
            return Err(not_found());
        }

        tracing::info!(user_id = %user.id, "Password reset, sessions revoked");
        Ok(())
    }

    async fn mark_for_deletion(
        &self,
        user_id: &UserId,
        password: &str,
    ) -> Result<DateTime<Utc>, UserError> {
        let now = Utc::now();
        let user = self.require_user(user_id).await?;

        self.require_password(&user, password).await?;

        let deletion = ScheduledDeletion {
            scheduled_at: now + self.policy.deletion_grace,
        };
        self.repository.mark_for_deletion(&user.id, deletion).await?;

        tracing::info!(
            user_id = %user.id,
            scheduled_at = %deletion.scheduled_at,
            "Account scheduled for deletion"
        );
        Ok(deletion.scheduled_at)
    }

    async fn cancel_scheduled_deletion(&self, user_id: &UserId) -> Result<(), UserError> {
        let user = self.require_user(user_id).await?;

        if self.repository.cancel_scheduled_deletion(&user.id).await? {
            tracing::info!(user_id = %user.id, "Scheduled deletion cancelled");
        }
        Ok(())
    }

    async fn get_user(&self, user_id: &UserId) -> Result<User, UserError> {
        self.require_user(user_id).await
    }

    async fn authenticate(&self, access_token: &str) -> Result<UserId, UserError> {
        let claims = self.token_issuer.verify_access(access_token).map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected");
            UserError::Unauthorized("Invalid or expired token".to_string())
        })?;

        UserId::from_string(&claims.sub)
            .map_err(|_| UserError::Unauthorized("Invalid token format".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use auth::HashingParams;
    use auth::TokenSettings;
    use chrono::Duration;
    use mockall::mock;

    use super::*;
    use crate::domain::user::errors::MailError;
    use crate::domain::user::models::Password;
    use crate::outbound::mail::OutboxMailDispatcher;
    use crate::outbound::repositories::InMemoryUserRepository;

    mock! {
        pub TestUserRepository {}

        #[async_trait]
        impl UserRepository for TestUserRepository {
            async fn create(&self, user: User) -> Result<User, UserError>;
            async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserError>;
            async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<User>, UserError>;
            async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, UserError>;
            async fn find_by_email_change_token(&self, token: &str) -> Result<Option<User>, UserError>;
            async fn find_by_password_reset_token(&self, token: &str) -> Result<Option<User>, UserError>;
            async fn set_verification_pending(&self, id: &UserId, verification: PendingToken) -> Result<bool, UserError>;
            async fn verify_account(&self, id: &UserId, token: &str) -> Result<bool, UserError>;
            async fn add_refresh_token(&self, id: &UserId, record: RefreshTokenRecord) -> Result<(), UserError>;
            async fn prune_refresh_tokens(&self, id: &UserId, now: DateTime<Utc>) -> Result<u64, UserError>;
            async fn trim_refresh_tokens(&self, id: &UserId, max: usize) -> Result<u64, UserError>;
            async fn replace_refresh_token(&self, id: &UserId, old_record_id: &Uuid, new_record: RefreshTokenRecord) -> Result<bool, UserError>;
            async fn remove_refresh_token(&self, id: &UserId, record_id: &Uuid) -> Result<bool, UserError>;
            async fn update_password_and_clear_tokens(&self, id: &UserId, password_hash: String) -> Result<(), UserError>;
            async fn mark_email_change_pending(&self, id: &UserId, change: PendingEmailChange) -> Result<(), UserError>;
            async fn confirm_email_change(&self, id: &UserId, token: &str, new_email: &EmailAddress) -> Result<bool, UserError>;
            async fn set_password_reset_token(&self, id: &UserId, reset: PendingToken) -> Result<(), UserError>;
            async fn reset_password(&self, id: &UserId, token: &str, password_hash: String) -> Result<bool, UserError>;
            async fn mark_for_deletion(&self, id: &UserId, deletion: ScheduledDeletion) -> Result<(), UserError>;
            async fn cancel_scheduled_deletion(&self, id: &UserId) -> Result<bool, UserError>;
        }
    }

    mock! {
        pub TestMailDispatcher {}

        #[async_trait]
        impl MailDispatcher for TestMailDispatcher {
            async fn send_link_mail(&self, mail: &LinkMail) -> Result<(), MailError>;
        }
    }

    const PASSWORD: &str = "Zdrowas#Maryjo1";
    const NEW_PASSWORD: &str = "Ojcze#Nasz2";

    struct Harness {
        service: UserService<InMemoryUserRepository, OutboxMailDispatcher>,
        repository: Arc<InMemoryUserRepository>,
        outbox: Arc<OutboxMailDispatcher>,
    }

    fn hasher() -> Arc<PasswordHasher> {
        Arc::new(PasswordHasher::new(HashingParams::relaxed()).unwrap())
    }

    fn issuer() -> Arc<TokenIssuer> {
        Arc::new(TokenIssuer::new(TokenSettings {
            access_secret: b"access-secret".to_vec(),
            refresh_secret: b"refresh-secret".to_vec(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            issuer: None,
        }))
    }

    fn harness(policy: SessionPolicy) -> Harness {
        let repository = Arc::new(InMemoryUserRepository::new());
        let outbox = Arc::new(OutboxMailDispatcher::new());
        let service = UserService::new(
            Arc::clone(&repository),
            Arc::clone(&outbox),
            hasher(),
            issuer(),
            policy,
        );
        Harness {
            service,
            repository,
            outbox,
        }
    }

    fn email(value: &str) -> EmailAddress {
        EmailAddress::new(value.to_string()).unwrap()
    }

    fn password(value: &str) -> Password {
        Password::new(value.to_string()).unwrap()
    }

    async fn register(h: &Harness, address: &str) {
        h.service
            .register(RegisterCommand::new(email(address), password(PASSWORD)))
            .await
            .unwrap();
    }

    async fn verified_user(h: &Harness, address: &str) -> UserId {
        register(h, address).await;
        let token = h
            .outbox
            .last_token(address, MailPurpose::AccountVerification)
            .await
            .unwrap();
        h.service.verify_registration(&token).await.unwrap();
        h.repository
            .find_by_email(&email(address))
            .await
            .unwrap()
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_register_verify_login() {
        let h = harness(SessionPolicy::default());
        register(&h, "reader@example.com").await;

        let sent = h.outbox.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0]
            .link()
            .starts_with("http://localhost:3000/api/auth/verify-account?token="));

        let before = h.service.login(&email("reader@example.com"), PASSWORD).await;
        assert!(matches!(before, Err(UserError::InvalidCredentials)));

        h.service.verify_registration(&sent[0].token).await.unwrap();

        let tokens = h
            .service
            .login(&email("Reader@Example.com"), PASSWORD)
            .await
            .unwrap();
        let user_id = h.service.authenticate(&tokens.access_token).await.unwrap();
        let user = h.service.get_user(&user_id).await.unwrap();

        assert!(user.is_verified);
        assert!(user.verification.is_none());
        assert_eq!(user.refresh_tokens.len(), 1);

        let stored = &user.refresh_tokens[0].token_hash;
        assert!(stored.starts_with("$argon2id$"));
        assert_ne!(stored, &tokens.refresh_token);
        assert!(!stored.contains(&tokens.refresh_token));
    }

    #[tokio::test]
    async fn test_login_prunes_expired_sessions() {
        let h = harness(SessionPolicy::default());
        let user_id = verified_user(&h, "reader@example.com").await;

        let now = Utc::now();
        let stale = RefreshTokenRecord {
            id: Uuid::new_v4(),
            token_hash: "$argon2id$stale".to_string(),
            expires_at: now - Duration::minutes(1),
            created_at: now - Duration::days(8),
        };
        h.repository
            .add_refresh_token(&user_id, stale.clone())
            .await
            .unwrap();

        h.service
            .login(&email("reader@example.com"), PASSWORD)
            .await
            .unwrap();

        let user = h.service.get_user(&user_id).await.unwrap();
        assert_eq!(user.refresh_tokens.len(), 1);
        assert!(user.refresh_tokens.iter().all(|r| r.id != stale.id));
        assert!(user.refresh_tokens[0].expires_at > now);
    }

    #[tokio::test]
    async fn test_login_unknown_email_checks_decoy() {
        let mut repository = MockTestUserRepository::new();
        let mut mail_dispatcher = MockTestMailDispatcher::new();

        repository
            .expect_find_by_email()
            .times(2)
            .returning(|_| Ok(None));
        repository.expect_add_refresh_token().times(0);
        mail_dispatcher.expect_send_link_mail().times(0);

        let service = UserService::new(
            Arc::new(repository),
            Arc::new(mail_dispatcher),
            hasher(),
            issuer(),
            SessionPolicy::default(),
        );

        let result = service.login(&email("nobody@example.com"), PASSWORD).await;
        assert!(matches!(result, Err(UserError::InvalidCredentials)));

        let decoy = service.decoy_hash.get().cloned().unwrap();
        assert!(decoy.starts_with("$argon2id$"));

        let result = service.login(&email("nobody@example.com"), DECOY_PASSWORD).await;
        assert!(matches!(result, Err(UserError::InvalidCredentials)));
        assert_eq!(service.decoy_hash.get(), Some(&decoy));
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let h = harness(SessionPolicy::default());
        verified_user(&h, "reader@example.com").await;

        let result = h.service.login(&email("reader@example.com"), "Wrong#Pass1").await;
        assert!(matches!(result, Err(UserError::InvalidCredentials)));

        let result = h.service.login(&email("nobody@example.com"), PASSWORD).await;
        assert!(matches!(result, Err(UserError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_register_verified_account_is_silent() {
        let h = harness(SessionPolicy::default());
        verified_user(&h, "reader@example.com").await;

        h.service
            .register(RegisterCommand::new(
                email("reader@example.com"),
                password(NEW_PASSWORD),
            ))
            .await
            .unwrap();

        assert_eq!(h.outbox.sent().await.len(), 1);
        assert!(h
            .service
            .login(&email("reader@example.com"), PASSWORD)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_register_unverified_keeps_password() {
        let h = harness(SessionPolicy::default());
        register(&h, "reader@example.com").await;
        let first = h.outbox.sent().await[0].token.clone();

        h.service
            .register(RegisterCommand::new(
                email("reader@example.com"),
                password(NEW_PASSWORD),
            ))
            .await
            .unwrap();
        let second = h
            .outbox
            .last_token("reader@example.com", MailPurpose::AccountVerification)
            .await
            .unwrap();

        assert_ne!(first, second);
        assert!(matches!(
            h.service.verify_registration(&first).await,
            Err(UserError::InvalidToken)
        ));
        h.service.verify_registration(&second).await.unwrap();
        assert!(h
            .service
            .login(&email("reader@example.com"), PASSWORD)
            .await
            .is_ok());
        assert!(matches!(
            h.service
                .login(&email("reader@example.com"), NEW_PASSWORD)
                .await,
            Err(UserError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_verification_token_expired() {
        let h = harness(SessionPolicy {
            verification_ttl: Duration::seconds(-1),
            ..SessionPolicy::default()
        });
        register(&h, "reader@example.com").await;
        let token = h.outbox.sent().await[0].token.clone();

        let result = h.service.verify_registration(&token).await;
        assert!(matches!(result, Err(UserError::TokenExpired)));
    }

    #[tokio::test]
    async fn test_resend_verification() {
        let h = harness(SessionPolicy::default());
        register(&h, "reader@example.com").await;

        h.service
            .resend_verification(&email("reader@example.com"))
            .await
            .unwrap();
        h.service
            .resend_verification(&email("nobody@example.com"))
            .await
            .unwrap();

        let sent = h.outbox.sent().await;
        assert_eq!(sent.len(), 2);
        assert!(matches!(
            h.service.verify_registration(&sent[0].token).await,
            Err(UserError::InvalidToken)
        ));
        h.service.verify_registration(&sent[1].token).await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_rejects_replay() {
        let h = harness(SessionPolicy::default());
        verified_user(&h, "reader@example.com").await;
        let first = h
            .service
            .login(&email("reader@example.com"), PASSWORD)
            .await
            .unwrap();

        let second = h.service.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let replay = h.service.refresh(&first.refresh_token).await;
        assert!(matches!(replay, Err(UserError::Unauthorized(_))));

        assert!(h.service.refresh(&second.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_refresh_single_winner() {
        let h = harness(SessionPolicy::default());
        verified_user(&h, "reader@example.com").await;
        let tokens = h
            .service
            .login(&email("reader@example.com"), PASSWORD)
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            h.service.refresh(&tokens.refresh_token),
            h.service.refresh(&tokens.refresh_token)
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let h = harness(SessionPolicy::default());
        verified_user(&h, "reader@example.com").await;
        let tokens = h
            .service
            .login(&email("reader@example.com"), PASSWORD)
            .await
            .unwrap();

        let result = h.service.refresh(&tokens.access_token).await;
        assert!(matches!(result, Err(UserError::Unauthorized(_))));

        let result = h.service.authenticate(&tokens.refresh_token).await;
        assert!(matches!(result, Err(UserError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_login_trims_oldest_sessions() {
        let h = harness(SessionPolicy {
            max_refresh_tokens: 2,
            ..SessionPolicy::default()
        });
        let user_id = verified_user(&h, "reader@example.com").await;

        let mut sessions = Vec::new();
        for _ in 0..3 {
            sessions.push(
                h.service
                    .login(&email("reader@example.com"), PASSWORD)
                    .await
                    .unwrap(),
            );
        }

        let user = h.service.get_user(&user_id).await.unwrap();
        assert_eq!(user.refresh_tokens.len(), 2);

        assert!(h.service.refresh(&sessions[0].refresh_token).await.is_err());
        assert!(h.service.refresh(&sessions[2].refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout() {
        let h = harness(SessionPolicy::default());
        let user_id = verified_user(&h, "reader@example.com").await;
        let tokens = h
            .service
            .login(&email("reader@example.com"), PASSWORD)
            .await
            .unwrap();

        h.service.logout("garbage").await;
        h.service.logout(&tokens.refresh_token).await;
        h.service.logout(&tokens.refresh_token).await;

        assert!(h.service.refresh(&tokens.refresh_token).await.is_err());
        let user = h.service.get_user(&user_id).await.unwrap();
        assert!(user.refresh_tokens.is_empty());
    }

    #[tokio::test]
    async fn test_change_password_revokes_sessions() {
        let h = harness(SessionPolicy::default());
        let user_id = verified_user(&h, "reader@example.com").await;
        let tokens = h
            .service
            .login(&email("reader@example.com"), PASSWORD)
            .await
            .unwrap();

        h.service
            .change_password(
                &user_id,
                ChangePasswordCommand {
                    current_password: PASSWORD.to_string(),
                    new_password: password(NEW_PASSWORD),
                },
            )
            .await
            .unwrap();

        assert!(h.service.refresh(&tokens.refresh_token).await.is_err());
        assert!(h
            .service
            .login(&email("reader@example.com"), PASSWORD)
            .await
            .is_err());
        assert!(h
            .service
            .login(&email("reader@example.com"), NEW_PASSWORD)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_change_password_rejections() {
        let h = harness(SessionPolicy::default());
        let user_id = verified_user(&h, "reader@example.com").await;

        let unchanged = h
            .service
            .change_password(
                &user_id,
                ChangePasswordCommand {
                    current_password: PASSWORD.to_string(),
                    new_password: password(PASSWORD),
                },
            )
            .await;
        assert!(matches!(unchanged, Err(UserError::PasswordUnchanged)));

        let wrong = h
            .service
            .change_password(
                &user_id,
                ChangePasswordCommand {
                    current_password: "Wrong#Pass1".to_string(),
                    new_password: password(NEW_PASSWORD),
                },
            )
            .await;
        assert!(matches!(wrong, Err(UserError::Unauthorized(_))));

        let missing = h
            .service
            .change_password(
                &UserId::new(),
                ChangePasswordCommand {
                    current_password: PASSWORD.to_string(),
                    new_password: password(NEW_PASSWORD),
                },
            )
            .await;
        assert!(matches!(missing, Err(UserError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_change_email_flow() {
        let h = harness(SessionPolicy::default());
        let user_id = verified_user(&h, "reader@example.com").await;

        h.service
            .change_email(
                &user_id,
                ChangeEmailCommand {
                    new_email: email("new@example.com"),
                    password: PASSWORD.to_string(),
                },
            )
            .await
            .unwrap();

        let mail = h.outbox.sent().await.pop().unwrap();
        assert_eq!(mail.to.as_str(), "new@example.com");
        assert!(mail
            .link()
            .starts_with("http://localhost:3000/api/auth/verify-email?token="));

        h.service.confirm_email_change(&mail.token).await.unwrap();

        let user = h.service.get_user(&user_id).await.unwrap();
        assert_eq!(user.email.as_str(), "new@example.com");
        assert!(user.email_change.is_none());
        assert!(matches!(
            h.service.confirm_email_change(&mail.token).await,
            Err(UserError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_change_email_conflicts() {
        let h = harness(SessionPolicy::default());
        let first = verified_user(&h, "a@example.com").await;
        let second = verified_user(&h, "b@example.com").await;

        let taken = h
            .service
            .change_email(
                &first,
                ChangeEmailCommand {
                    new_email: email("b@example.com"),
                    password: PASSWORD.to_string(),
                },
            )
            .await;
        assert!(matches!(taken, Err(UserError::EmailAlreadyExists(_))));

        let own = h
            .service
            .change_email(
                &first,
                ChangeEmailCommand {
                    new_email: email("a@example.com"),
                    password: PASSWORD.to_string(),
                },
            )
            .await;
        assert!(matches!(own, Err(UserError::EmailAlreadyExists(_))));

        for user_id in [&first, &second] {
            h.service
                .change_email(
                    user_id,
                    ChangeEmailCommand {
                        new_email: email("c@example.com"),
                        password: PASSWORD.to_string(),
                    },
                )
                .await
                .unwrap();
        }
        let tokens: Vec<String> = h
            .outbox
            .sent()
            .await
            .into_iter()
            .filter(|mail| mail.purpose == MailPurpose::EmailChange)
            .map(|mail| mail.token)
            .collect();

        h.service.confirm_email_change(&tokens[0]).await.unwrap();
        let lost = h.service.confirm_email_change(&tokens[1]).await;

        assert!(matches!(lost, Err(UserError::EmailAlreadyExists(_))));
        let user = h.service.get_user(&second).await.unwrap();
        assert_eq!(user.email.as_str(), "b@example.com");
    }

    #[tokio::test]
    async fn test_confirm_email_change_expired() {
        let h = harness(SessionPolicy {
            email_change_ttl: Duration::seconds(-1),
            ..SessionPolicy::default()
        });
        let user_id = verified_user(&h, "reader@example.com").await;
        h.service
            .change_email(
                &user_id,
                ChangeEmailCommand {
                    new_email: email("new@example.com"),
                    password: PASSWORD.to_string(),
                },
            )
            .await
            .unwrap();
        let token = h
            .outbox
            .last_token("new@example.com", MailPurpose::EmailChange)
            .await
            .unwrap();

        let result = h.service.confirm_email_change(&token).await;
        assert!(matches!(result, Err(UserError::TokenExpired)));
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let h = harness(SessionPolicy::default());
        verified_user(&h, "reader@example.com").await;
        let tokens = h
            .service
            .login(&email("reader@example.com"), PASSWORD)
            .await
            .unwrap();

        h.service
            .request_password_reset(&email("nobody@example.com"))
            .await
            .unwrap();
        h.service
            .request_password_reset(&email("reader@example.com"))
            .await
            .unwrap();

        let mail = h.outbox.sent().await.pop().unwrap();
        assert_eq!(mail.purpose, MailPurpose::PasswordReset);
        assert!(mail
            .link()
            .starts_with("http://localhost:8081/reset-password?token="));

        h.service
            .reset_password(ResetPasswordCommand {
                token: mail.token.clone(),
                new_password: password(NEW_PASSWORD),
            })
            .await
            .unwrap();

        assert!(h.service.refresh(&tokens.refresh_token).await.is_err());
        assert!(h
            .service
            .login(&email("reader@example.com"), NEW_PASSWORD)
            .await
            .is_ok());

        let reused = h
            .service
            .reset_password(ResetPasswordCommand {
                token: mail.token,
                new_password: password(PASSWORD),
            })
            .await;
        assert!(matches!(reused, Err(UserError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_password_reset_expired() {
        let h = harness(SessionPolicy {
            password_reset_ttl: Duration::seconds(-1),
            ..SessionPolicy::default()
        });
        verified_user(&h, "reader@example.com").await;
        h.service
            .request_password_reset(&email("reader@example.com"))
            .await
            .unwrap();
        let token = h
            .outbox
            .last_token("reader@example.com", MailPurpose::PasswordReset)
            .await
            .unwrap();

        let result = h
            .service
            .reset_password(ResetPasswordCommand {
                token,
                new_password: password(NEW_PASSWORD),
            })
            .await;
        assert!(matches!(result, Err(UserError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_mark_for_deletion_cancelled_by_login() {
        let h = harness(SessionPolicy::default());
        let user_id = verified_user(&h, "reader@example.com").await;

        let before = Utc::now();
        let scheduled_at = h
            .service
            .mark_for_deletion(&user_id, PASSWORD)
            .await
            .unwrap();
        let after = Utc::now();

        assert!(scheduled_at >= before + Duration::days(14));
        assert!(scheduled_at <= after + Duration::days(14));
        assert!(h.service.get_user(&user_id).await.unwrap().is_deletion_pending());

        h.service
            .login(&email("reader@example.com"), PASSWORD)
            .await
            .unwrap();

        assert!(!h.service.get_user(&user_id).await.unwrap().is_deletion_pending());
    }

    #[tokio::test]
    async fn test_mark_for_deletion_rejections() {
        let h = harness(SessionPolicy::default());
        let user_id = verified_user(&h, "reader@example.com").await;

        let wrong = h.service.mark_for_deletion(&user_id, "Wrong#Pass1").await;
        assert!(matches!(wrong, Err(UserError::Unauthorized(_))));
        assert!(!h.service.get_user(&user_id).await.unwrap().is_deletion_pending());

        let missing = h.service.cancel_scheduled_deletion(&UserId::new()).await;
        assert!(matches!(missing, Err(UserError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_cancel_scheduled_deletion() {
        let h = harness(SessionPolicy::default());
        let user_id = verified_user(&h, "reader@example.com").await;
        h.service
            .mark_for_deletion(&user_id, PASSWORD)
            .await
            .unwrap();

        h.service.cancel_scheduled_deletion(&user_id).await.unwrap();
        h.service.cancel_scheduled_deletion(&user_id).await.unwrap();

        assert!(!h.service.get_user(&user_id).await.unwrap().is_deletion_pending());
    }

    #[tokio::test]
    async fn test_register_survives_mail_failure() {
        let mut repository = MockTestUserRepository::new();
        let mut mail_dispatcher = MockTestMailDispatcher::new();

        repository
            .expect_find_by_email()
            .times(1)
            .returning(|_| Ok(None));
        repository
            .expect_create()
            .withf(|user| !user.is_verified && user.password_hash.starts_with("$argon2"))
            .times(1)
            .returning(|user| Ok(user));
        mail_dispatcher
            .expect_send_link_mail()
            .times(1)
            .returning(|_| Err(MailError::SendFailed("connection refused".to_string())));

        let service = UserService::new(
            Arc::new(repository),
            Arc::new(mail_dispatcher),
            hasher(),
            issuer(),
            SessionPolicy::default(),
        );

        let result = service
            .register(RegisterCommand::new(
                email("reader@example.com"),
                password(PASSWORD),
            ))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_register_unverified_leaves_hash_untouched() {
        let mut repository = MockTestUserRepository::new();
        let mut mail_dispatcher = MockTestMailDispatcher::new();

        let now = Utc::now();
        let existing = User::new_unverified(
            email("reader@example.com"),
            "$argon2id$original".to_string(),
            PendingToken::generate(now, Duration::hours(1)),
            now,
        );
        repository
            .expect_find_by_email()
            .times(1)
            .returning(move |_| Ok(Some(existing.clone())));
        repository
            .expect_set_verification_pending()
            .times(1)
            .returning(|_, _| Ok(true));
        repository.expect_create().times(0);
        repository.expect_update_password_and_clear_tokens().times(0);
        repository.expect_reset_password().times(0);
        mail_dispatcher
            .expect_send_link_mail()
            .times(1)
            .returning(|_| Ok(()));

        let service = UserService::new(
            Arc::new(repository),
            Arc::new(mail_dispatcher),
            hasher(),
            issuer(),
            SessionPolicy::default(),
        );

        let result = service
            .register(RegisterCommand::new(
                email("reader@example.com"),
                password(NEW_PASSWORD),
            ))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_register_swallows_duplicate_race() {
        let mut repository = MockTestUserRepository::new();
        let mut mail_dispatcher = MockTestMailDispatcher::new();

        repository
            .expect_find_by_email()
            .times(1)
            .returning(|_| Ok(None));
        repository
            .expect_create()
            .times(1)
            .returning(|user| Err(UserError::EmailAlreadyExists(user.email.to_string())));
        mail_dispatcher.expect_send_link_mail().times(0);

        let service = UserService::new(
            Arc::new(repository),
            Arc::new(mail_dispatcher),
            hasher(),
            issuer(),
            SessionPolicy::default(),
        );

        let result = service
            .register(RegisterCommand::new(
                email("reader@example.com"),
                password(PASSWORD),
            ))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_database_errors_propagate() {
        let mut repository = MockTestUserRepository::new();
        let mut mail_dispatcher = MockTestMailDispatcher::new();

        repository
            .expect_find_by_email()
            .returning(|_| Err(UserError::DatabaseError("connection reset".to_string())));
        repository
            .expect_find_by_id()
            .returning(|_| Err(UserError::DatabaseError("connection reset".to_string())));
        mail_dispatcher.expect_send_link_mail().times(0);

        let issuer = issuer();
        let pair = issuer
            .issue_pair(&UserId::new().to_string(), Utc::now())
            .unwrap();
        let service = UserService::new(
            Arc::new(repository),
            Arc::new(mail_dispatcher),
            hasher(),
            issuer,
            SessionPolicy::default(),
        );

        let login = service.login(&email("reader@example.com"), PASSWORD).await;
        assert!(matches!(login, Err(UserError::DatabaseError(_))));

        let refresh = service.refresh(&pair.refresh_token).await;
        assert!(matches!(refresh, Err(UserError::DatabaseError(_))));
    }
}
