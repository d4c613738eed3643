//! Outbound notifications. Senders live behind traits so handlers and tests
//! never depend on a real SMTP server or the Twilio API; the `Notifier`
//! facade bounds how many sends can be in flight at once. Send outcomes feed
//! flash messages only — the triggering state change has already committed.

pub mod email;
pub mod sms;

pub use email::{LogMailer, Mailer, SmtpMailer};
pub use sms::{LogTexter, SmsOutcome, TextSender, TwilioTexter};

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::Config;

const MAX_IN_FLIGHT_SENDS: usize = 4;

#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    texter: Arc<dyn TextSender>,
    permits: Arc<Semaphore>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, texter: Arc<dyn TextSender>) -> Self {
        Self {
            mailer,
            texter,
            permits: Arc::new(Semaphore::new(MAX_IN_FLIGHT_SENDS)),
        }
    }

    /// Wire up senders from config, falling back to log-only implementations
    /// for any collaborator left unconfigured.
    pub fn from_config(config: &Config) -> Self {
        let mailer: Arc<dyn Mailer> = match &config.mail {
            Some(mail) => Arc::new(SmtpMailer::new(mail.clone())),
            None => {
                tracing::warn!("No [mail] config; outbound email will be dropped");
                Arc::new(LogMailer)
            }
        };
        let texter: Arc<dyn TextSender> = match &config.sms {
            Some(sms) => Arc::new(TwilioTexter::new(sms.clone())),
            None => {
                tracing::warn!("No [sms] config; outbound texts will be dropped");
                Arc::new(LogTexter)
            }
        };
        Self::new(mailer, texter)
    }

    /// Send an email; `recipient` of None addresses the site owner.
    /// Returns whether the send succeeded.
    pub async fn email(&self, subject: &str, body: &str, recipient: Option<&str>) -> bool {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return false,
        };
        self.mailer.send(subject, body, recipient).await
    }

    /// Send an SMS to the site owner's configured number.
    pub async fn text(&self, body: &str) -> SmsOutcome {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return SmsOutcome::Failed {
                    error: "send queue closed".into(),
                    code: None,
                }
            }
        };
        self.texter.send(body).await
    }
}
