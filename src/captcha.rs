use async_trait::async_trait;

use crate::config::CaptchaConfig;

/// Bot-check collaborator gating request-posting and contact submissions.
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    async fn verify(&self, response_token: &str) -> bool;
}

/// Google reCAPTCHA siteverify.
pub struct RecaptchaVerifier {
    http: reqwest::Client,
    secret: String,
}

impl RecaptchaVerifier {
    pub fn new(config: &CaptchaConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret: config.secret_key.clone(),
        }
    }
}

#[async_trait]
impl CaptchaVerifier for RecaptchaVerifier {
    async fn verify(&self, response_token: &str) -> bool {
        let form = [
            ("secret", self.secret.as_str()),
            ("response", response_token),
        ];
        let response = match self
            .http
            .post("https://www.google.com/recaptcha/api/siteverify")
            .form(&form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Captcha verification request failed: {}", e);
                return false;
            }
        };

        match response.json::<serde_json::Value>().await {
            Ok(payload) => payload["success"].as_bool().unwrap_or(false),
            Err(e) => {
                tracing::warn!("Unreadable captcha verification response: {}", e);
                false
            }
        }
    }
}

/// Used when no [captcha] section is configured; submissions pass unchecked.
pub struct AllowAll;

#[async_trait]
impl CaptchaVerifier for AllowAll {
    async fn verify(&self, _response_token: &str) -> bool {
        true
    }
}
