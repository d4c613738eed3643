use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::MailConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a plain-text message. `recipient` of None addresses the site
    /// owner. Returns whether delivery was handed off successfully; never
    /// panics or raises into the caller.
    async fn send(&self, subject: &str, body: &str, recipient: Option<&str>) -> bool;
}

/// SMTP delivery over STARTTLS.
pub struct SmtpMailer {
    config: MailConfig,
}

impl SmtpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, subject: &str, body: &str, recipient: &str) -> Option<Message> {
        let from: Mailbox = match self.config.username.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                tracing::warn!("Invalid sender address {}: {}", self.config.username, e);
                return None;
            }
        };
        let to: Mailbox = match recipient.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                tracing::warn!("Invalid recipient address {}: {}", recipient, e);
                return None;
            }
        };
        match Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .body(body.to_string())
        {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!("Failed to build email: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, subject: &str, body: &str, recipient: Option<&str>) -> bool {
        let recipient = recipient.unwrap_or(&self.config.username);
        let Some(message) = self.build_message(subject, body, recipient) else {
            return false;
        };

        let transport = match AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
        {
            Ok(builder) => builder
                .port(self.config.port)
                .credentials(Credentials::new(
                    self.config.username.clone(),
                    self.config.password.clone(),
                ))
                .build(),
            Err(e) => {
                tracing::warn!("SMTP transport setup failed: {}", e);
                return false;
            }
        };

        match transport.send(message).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Error sending email to {}: {}", recipient, e);
                false
            }
        }
    }
}

/// Stand-in used when no [mail] section is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, subject: &str, _body: &str, recipient: Option<&str>) -> bool {
        tracing::warn!(
            "Mail transport not configured; dropping '{}' to {}",
            subject,
            recipient.unwrap_or("site owner")
        );
        false
    }
}
