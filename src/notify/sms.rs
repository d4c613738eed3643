use async_trait::async_trait;

use crate::config::SmsConfig;

/// Result of an SMS send attempt, mirroring what the Twilio API reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsOutcome {
    Sent { status: String, sid: String },
    Failed { error: String, code: Option<i64> },
}

impl SmsOutcome {
    pub fn success(&self) -> bool {
        matches!(self, SmsOutcome::Sent { .. })
    }
}

#[async_trait]
pub trait TextSender: Send + Sync {
    async fn send(&self, body: &str) -> SmsOutcome;
}

/// Sends through the Twilio Messages REST endpoint.
pub struct TwilioTexter {
    http: reqwest::Client,
    config: SmsConfig,
}

impl TwilioTexter {
    pub fn new(config: SmsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl TextSender for TwilioTexter {
    async fn send(&self, body: &str) -> SmsOutcome {
        let endpoint = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.config.account_sid
        );
        let form = [
            ("To", self.config.to_number.as_str()),
            ("From", self.config.from_number.as_str()),
            ("Body", body),
        ];

        let response = match self
            .http
            .post(&endpoint)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Failed to reach Twilio: {}", e);
                return SmsOutcome::Failed {
                    error: e.to_string(),
                    code: None,
                };
            }
        };

        let status = response.status();
        let payload: serde_json::Value = match response.json().await {
            Ok(payload) => payload,
            Err(e) => {
                return SmsOutcome::Failed {
                    error: format!("unreadable Twilio response: {}", e),
                    code: None,
                }
            }
        };

        if status.is_success() {
            let message_status = payload["status"].as_str().unwrap_or("unknown").to_string();
            let sid = payload["sid"].as_str().unwrap_or_default().to_string();
            tracing::info!("SMS handed off, status: {}", message_status);
            SmsOutcome::Sent {
                status: message_status,
                sid,
            }
        } else {
            let error = payload["message"]
                .as_str()
                .unwrap_or("Twilio rejected the message")
                .to_string();
            let code = payload["code"].as_i64();
            tracing::warn!("Failed to send SMS: {} (code {:?})", error, code);
            SmsOutcome::Failed { error, code }
        }
    }
}

/// Stand-in used when no [sms] section is configured.
pub struct LogTexter;

#[async_trait]
impl TextSender for LogTexter {
    async fn send(&self, _body: &str) -> SmsOutcome {
        tracing::warn!("SMS transport not configured; dropping text");
        SmsOutcome::Failed {
            error: "sms transport not configured".into(),
            code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_success_tracks_variant() {
        let sent = SmsOutcome::Sent {
            status: "queued".into(),
            sid: "SM123".into(),
        };
        assert!(sent.success());

        let failed = SmsOutcome::Failed {
            error: "no balance".into(),
            code: Some(21608),
        };
        assert!(!failed.success());
    }
}
