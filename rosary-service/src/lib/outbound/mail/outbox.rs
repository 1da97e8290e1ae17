use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::user::errors::MailError;
use crate::domain::user::models::LinkMail;
use crate::domain::user::models::MailPurpose;
use crate::domain::user::ports::MailDispatcher;

/// Mail dispatcher that keeps messages in memory instead of delivering them.
///
/// Used when no SMTP relay is configured and by tests that need to follow the
/// mailed links.
#[derive(Default)]
pub struct OutboxMailDispatcher {
    sent: Mutex<Vec<LinkMail>>,
}

impl OutboxMailDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All mails dispatched so far, oldest first.
    pub async fn sent(&self) -> Vec<LinkMail> {
        self.sent.lock().await.clone()
    }

    /// Token of the most recent mail sent to `to` for `purpose`.
    pub async fn last_token(&self, to: &str, purpose: MailPurpose) -> Option<String> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|mail| mail.to.as_str() == to && mail.purpose == purpose)
            .map(|mail| mail.token.clone())
    }
}

#[async_trait]
impl MailDispatcher for OutboxMailDispatcher {
    async fn send_link_mail(&self, mail: &LinkMail) -> Result<(), MailError> {
        tracing::debug!(
            purpose = ?mail.purpose,
            base_url = %mail.base_url,
            path = %mail.path,
            "Link mail stored in outbox"
        );
        self.sent.lock().await.push(mail.clone());
        Ok(())
    }
}
