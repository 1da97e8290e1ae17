use async_trait::async_trait;
use lettre::address::AddressError;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::AsyncSmtpTransport;
use lettre::AsyncTransport;
use lettre::Message;
use lettre::Tokio1Executor;

use crate::domain::user::errors::MailError;
use crate::domain::user::models::LinkMail;
use crate::domain::user::ports::MailDispatcher;

/// Connection settings for an SMTP relay.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Upgrade the connection with STARTTLS; plain text otherwise
    pub starttls: bool,
    pub from_address: String,
}

/// Mail dispatcher delivering link mails through an SMTP relay.
pub struct SmtpMailDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailDispatcher {
    /// Create a dispatcher with a pooled SMTP transport.
    ///
    /// No connection is opened until the first mail is sent.
    ///
    /// # Arguments
    /// * `settings` - Relay host, port, credentials and sender
    ///
    /// # Returns
    /// Configured SmtpMailDispatcher
    ///
    /// # Errors
    /// * `InvalidAddress` - Sender address cannot be parsed
    /// * `SendFailed` - Relay host rejected by the TLS configuration
    pub fn new(settings: SmtpSettings) -> Result<Self, MailError> {
        let from: Mailbox = settings
            .from_address
            .parse()
            .map_err(|e: AddressError| MailError::InvalidAddress(e.to_string()))?;

        let builder = if settings.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| MailError::SendFailed(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
        };

        let builder = match (settings.username, settings.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username, password))
            }
            _ => builder,
        };

        Ok(Self {
            transport: builder.port(settings.port).build(),
            from,
        })
    }

    fn build_message(&self, mail: &LinkMail) -> Result<Message, MailError> {
        let to: Mailbox = mail
            .to
            .as_str()
            .parse()
            .map_err(|e: AddressError| MailError::InvalidAddress(e.to_string()))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.purpose.subject())
            .header(ContentType::TEXT_HTML)
            .body(render_body(mail))
            .map_err(|e| MailError::BuildFailed(e.to_string()))
    }
}

#[async_trait]
impl MailDispatcher for SmtpMailDispatcher {
    async fn send_link_mail(&self, mail: &LinkMail) -> Result<(), MailError> {
        let message = self.build_message(mail)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::SendFailed(e.to_string()))?;

        tracing::info!(purpose = ?mail.purpose, "Link mail sent");
        Ok(())
    }
}

fn render_body(mail: &LinkMail) -> String {
    let link = mail.link();
    format!(
        "<h3>Witaj!</h3>\
         <p>Kliknij w poniższy link:</p>\
         <a href=\"{link}\">{link}</a>\
         <p>Jeśli to nie Ty, zignoruj tę wiadomość.</p>"
    )
}
