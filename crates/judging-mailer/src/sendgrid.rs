//! SendGrid v3 mail client
//!
//! Delivers rendered judging notifications through `POST /v3/mail/send`.
//! Any API speaking the same JSON shape can be targeted by overriding the
//! base URL.

use async_trait::async_trait;
use judging_core::{EmailTemplates, Notifier, NotifyError, OutgoingEmail};
use judging_state::{EntryDetail, Judge};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{MailerError, Result};

pub const DEFAULT_API_BASE: &str = "https://api.sendgrid.com";
pub const DEFAULT_FROM_NAME: &str = "Awards Team";

/// SendGrid configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendGridConfig {
    pub api_key: String,
    pub from_email: String,
    pub from_name: String,
    /// Base URL without trailing slash
    pub api_base: String,
}

impl SendGridConfig {
    pub fn new(api_key: &str, from_email: &str) -> Self {
        SendGridConfig {
            api_key: api_key.to_string(),
            from_email: from_email.to_string(),
            from_name: DEFAULT_FROM_NAME.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Read `SENDGRID_API_KEY`, `SENDGRID_FROM_EMAIL`, and the optional
    /// `SENDGRID_FROM_NAME` and `SENDGRID_API_BASE`.
    pub fn from_env() -> Result<Self> {
        let api_key =
            std::env::var("SENDGRID_API_KEY")
                .map_err(|_| MailerError::NotConfigured("SENDGRID_API_KEY"))?;
        let from_email = std::env::var("SENDGRID_FROM_EMAIL")
            .map_err(|_| MailerError::NotConfigured("SENDGRID_FROM_EMAIL"))?;
        let mut config = Self::new(&api_key, &from_email);
        if let Ok(name) = std::env::var("SENDGRID_FROM_NAME") {
            config = config.with_from_name(&name);
        }
        if let Ok(base) = std::env::var("SENDGRID_API_BASE") {
            config = config.with_api_base(&base);
        }
        Ok(config)
    }

    pub fn with_from_name(mut self, name: &str) -> Self {
        self.from_name = name.to_string();
        self
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn send_url(&self) -> String {
        format!("{}/v3/mail/send", self.api_base)
    }
}

/// Request body for one message.
pub fn build_payload(config: &SendGridConfig, email: &OutgoingEmail) -> Value {
    json!({
        "personalizations": [{
            "to": [{ "email": email.to_email, "name": email.to_name }]
        }],
        "from": { "email": config.from_email, "name": config.from_name },
        "subject": email.subject,
        "content": [{ "type": "text/plain", "value": email.body }]
    })
}

/// Notifier backed by the SendGrid HTTP API
pub struct SendGridMailer {
    config: SendGridConfig,
    templates: EmailTemplates,
    http_client: reqwest::Client,
}

impl SendGridMailer {
    pub fn new(config: SendGridConfig, templates: EmailTemplates) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("judging-mailer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(SendGridMailer {
            config,
            templates,
            http_client,
        })
    }

    pub fn from_env(templates: EmailTemplates) -> Result<Self> {
        Self::new(SendGridConfig::from_env()?, templates)
    }

    /// Send one rendered message.
    pub async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        debug!(to = %email.to_email, subject = %email.subject, "sending mail");

        let response = self
            .http_client
            .post(self.config.send_url())
            .bearer_auth(&self.config.api_key)
            .json(&build_payload(&self.config, email))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(to = %email.to_email, status = status.as_u16(), "mail accepted");
        Ok(())
    }
}

#[async_trait]
impl Notifier for SendGridMailer {
    async fn notify_judge_assigned(
        &self,
        judge: &Judge,
        entry: &EntryDetail,
    ) -> std::result::Result<(), NotifyError> {
        let email = self.templates.judge_assigned_email(judge, entry);
        Ok(self.send(&email).await?)
    }

    async fn notify_entry_shortlisted(
        &self,
        entry: &EntryDetail,
    ) -> std::result::Result<(), NotifyError> {
        let email = self.templates.entry_shortlisted_email(entry)?;
        Ok(self.send(&email).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_has_sendgrid_shape() {
        let config = SendGridConfig::new("key", "awards@example.org").with_from_name("Awards");
        let email = OutgoingEmail {
            to_email: "j1@example.org".into(),
            to_name: "Jo".into(),
            subject: "New entry".into(),
            body: "Please score entry-1".into(),
        };
        let payload = build_payload(&config, &email);
        assert_eq!(payload["personalizations"][0]["to"][0]["email"], "j1@example.org");
        assert_eq!(payload["from"]["name"], "Awards");
        assert_eq!(payload["subject"], "New entry");
        assert_eq!(payload["content"][0]["type"], "text/plain");
        assert_eq!(payload["content"][0]["value"], "Please score entry-1");
    }

    #[test]
    fn api_base_trailing_slash_is_trimmed() {
        let config = SendGridConfig::new("key", "a@x.org").with_api_base("http://localhost:8080/");
        assert_eq!(config.send_url(), "http://localhost:8080/v3/mail/send");
    }

    #[test]
    fn rejected_maps_to_notify_rejected() {
        let err: NotifyError = MailerError::Rejected {
            status: 401,
            body: "bad key".into(),
        }
        .into();
        assert!(matches!(err, NotifyError::Rejected { status: 401, .. }));

        let err: NotifyError = MailerError::NotConfigured("SENDGRID_API_KEY").into();
        assert!(matches!(err, NotifyError::Delivery(_)));
    }
}
