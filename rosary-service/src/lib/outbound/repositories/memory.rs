use std::collections::BTreeMap;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::help::errors::HelpError;
use crate::domain::help::models::HelpContent;
use crate::domain::help::ports::HelpRepository;
use crate::domain::publication::errors::PublicationError;
use crate::domain::publication::models::Mystery;
use crate::domain::publication::models::Publication;
use crate::domain::publication::models::PublicationKey;
use crate::domain::publication::models::RosaryPart;
use crate::domain::publication::ports::PublicationRepository;
use crate::domain::user::errors::UserError;
use crate::domain::user::models::EmailAddress;
use crate::domain::user::models::PendingEmailChange;
use crate::domain::user::models::PendingToken;
use crate::domain::user::models::RefreshTokenRecord;
use crate::domain::user::models::ScheduledDeletion;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;
use crate::domain::user::ports::UserRepository;

/// Process-local user store.
///
/// Every conditional operation runs under a single write lock acquisition, so
/// it behaves like a row-level compare-and-swap.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn find_where<F>(&self, predicate: F) -> Result<Option<User>, UserError>
    where
        F: Fn(&User) -> bool,
    {
        let users = self.users.read().await;
        Ok(users.values().find(|user| predicate(user)).cloned())
    }

    async fn update_where<F, T>(&self, id: &UserId, apply: F) -> Result<T, UserError>
    where
        F: FnOnce(&mut User) -> T,
    {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(id)
            .ok_or_else(|| UserError::NotFound(id.to_string()))?;
        Ok(apply(user))
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, UserError> {
        let mut users = self.users.write().await;
        if users.values().any(|existing| existing.email == user.email) {
            return Err(UserError::EmailAlreadyExists(user.email.as_str().to_string()));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<User>, UserError> {
        self.find_where(|user| &user.email == email).await
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, UserError> {
        self.find_where(|user| {
            user.verification
                .as_ref()
                .is_some_and(|pending| pending.token == token)
        })
        .await
    }

    async fn find_by_email_change_token(&self, token: &str) -> Result<Option<User>, UserError> {
        self.find_where(|user| {
            user.email_change
                .as_ref()
                .is_some_and(|change| change.token == token)
        })
        .await
    }

    async fn find_by_password_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<User>, UserError> {
        self.find_where(|user| {
            user.password_reset
                .as_ref()
                .is_some_and(|reset| reset.token == token)
        })
        .await
    }

    async fn set_verification_pending(
        &self,
        id: &UserId,
        verification: PendingToken,
    ) -> Result<bool, UserError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(id).filter(|user| !user.is_verified) else {
            return Ok(false);
        };
        user.verification = Some(verification);
        Ok(true)
    }

    async fn verify_account(&self, id: &UserId, token: &str) -> Result<bool, UserError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(id) else {
            return Ok(false);
        };
        if !user
            .verification
            .as_ref()
            .is_some_and(|pending| pending.token == token)
        {
            return Ok(false);
        }
        user.is_verified = true;
        user.verification = None;
        Ok(true)
    }

    async fn add_refresh_token(
        &self,
        id: &UserId,
        record: RefreshTokenRecord,
    ) -> Result<(), UserError> {
        self.update_where(id, |user| user.refresh_tokens.push(record))
            .await
    }

    async fn prune_refresh_tokens(
        &self,
        id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, UserError> {
        self.update_where(id, |user| {
            let before = user.refresh_tokens.len();
            user.refresh_tokens.retain(|record| !record.is_expired(now));
            (before - user.refresh_tokens.len()) as u64
        })
        .await
    }

    async fn trim_refresh_tokens(&self, id: &UserId, max: usize) -> Result<u64, UserError> {
        self.update_where(id, |user| {
            let excess = user.refresh_tokens.len().saturating_sub(max);
            user.refresh_tokens = user.refresh_tokens.split_off(excess);
            excess as u64
        })
        .await
    }

    async fn replace_refresh_token(
        &self,
        id: &UserId,
        old_record_id: &Uuid,
        new_record: RefreshTokenRecord,
    ) -> Result<bool, UserError> {
        let mut users = self.users.write().await;
        let slot = users.get_mut(id).and_then(|user| {
            user.refresh_tokens
                .iter_mut()
                .find(|record| &record.id == old_record_id)
        });
        match slot {
            Some(record) => {
                *record = new_record;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_refresh_token(
        &self,
        id: &UserId,
        record_id: &Uuid,
    ) -> Result<bool, UserError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(id) else {
            return Ok(false);
        };
        let before = user.refresh_tokens.len();
        user.refresh_tokens.retain(|record| &record.id != record_id);
        Ok(user.refresh_tokens.len() < before)
    }

    async fn update_password_and_clear_tokens(
        &self,
        id: &UserId,
        password_hash: String,
    ) -> Result<(), UserError> {
        self.update_where(id, |user| {
            user.password_hash = password_hash;
            user.refresh_tokens.clear();
        })
        .await
    }

    async fn mark_email_change_pending(
        &self,
        id: &UserId,
        change: PendingEmailChange,
    ) -> Result<(), UserError> {
        self.update_where(id, |user| user.email_change = Some(change))
            .await
    }

    async fn confirm_email_change(
        &self,
        id: &UserId,
        token: &str,
        new_email: &EmailAddress,
    ) -> Result<bool, UserError> {
        let mut users = self.users.write().await;

        let pending = users
            .get(id)
            .and_then(|user| user.email_change.as_ref())
            .is_some_and(|change| change.token == token && &change.new_email == new_email);
        if !pending {
            return Ok(false);
        }
        if users
            .values()
            .any(|other| &other.id != id && &other.email == new_email)
        {
            return Err(UserError::EmailAlreadyExists(new_email.as_str().to_string()));
        }

        let Some(user) = users.get_mut(id) else {
            return Ok(false);
        };
        user.email = new_email.clone();
        user.email_change = None;
        Ok(true)
    }

    async fn set_password_reset_token(
        &self,
        id: &UserId,
        reset: PendingToken,
    ) -> Result<(), UserError> {
        self.update_where(id, |user| user.password_reset = Some(reset))
            .await
    }

    async fn reset_password(
        &self,
        id: &UserId,
        token: &str,
        password_hash: String,
    ) -> Result<bool, UserError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(id) else {
            return Ok(false);
        };
        if !user
            .password_reset
            .as_ref()
            .is_some_and(|reset| reset.token == token)
        {
            return Ok(false);
        }
        user.password_hash = password_hash;
        user.password_reset = None;
        user.refresh_tokens.clear();
        Ok(true)
    }

    async fn mark_for_deletion(
        &self,
        id: &UserId,
        deletion: ScheduledDeletion,
    ) -> Result<(), UserError> {
        self.update_where(id, |user| user.deletion = Some(deletion))
            .await
    }

    async fn cancel_scheduled_deletion(&self, id: &UserId) -> Result<bool, UserError> {
        self.update_where(id, |user| user.deletion.take().is_some())
            .await
    }
}

/// Process-local publication store, ordered by key.
#[derive(Default)]
pub struct InMemoryPublicationRepository {
    publications: RwLock<BTreeMap<PublicationKey, Publication>>,
}

impl InMemoryPublicationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PublicationRepository for InMemoryPublicationRepository {
    async fn create(&self, publication: Publication) -> Result<Publication, PublicationError> {
        let mut publications = self.publications.write().await;
        if publications.contains_key(&publication.key) {
            return Err(PublicationError::AlreadyExists(publication.key.to_string()));
        }
        publications.insert(publication.key, publication.clone());
        Ok(publication)
    }

    async fn update(&self, publication: Publication) -> Result<Publication, PublicationError> {
        let mut publications = self.publications.write().await;
        match publications.get_mut(&publication.key) {
            Some(stored) => {
                *stored = publication.clone();
                Ok(publication)
            }
            None => Err(PublicationError::NotFound(publication.key.to_string())),
        }
    }

    async fn find(&self, key: &PublicationKey) -> Result<Option<Publication>, PublicationError> {
        Ok(self.publications.read().await.get(key).cloned())
    }

    async fn list_keys(&self) -> Result<Vec<PublicationKey>, PublicationError> {
        Ok(self.publications.read().await.keys().copied().collect())
    }

    async fn list_indices(
        &self,
        part: RosaryPart,
        mystery: Mystery,
    ) -> Result<Vec<u32>, PublicationError> {
        Ok(self
            .publications
            .read()
            .await
            .keys()
            .filter(|key| key.part == part && key.mystery == mystery)
            .map(|key| key.index.get())
            .collect())
    }
}

/// Process-local help page.
#[derive(Default)]
pub struct InMemoryHelpRepository {
    content: RwLock<Option<HelpContent>>,
}

impl InMemoryHelpRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HelpRepository for InMemoryHelpRepository {
    async fn find(&self) -> Result<Option<HelpContent>, HelpError> {
        Ok(self.content.read().await.clone())
    }

    async fn upsert(&self, content: HelpContent) -> Result<HelpContent, HelpError> {
        *self.content.write().await = Some(content.clone());
        Ok(content)
    }
}
