//! Notification seam and email templates.
//!
//! The engine and ranker render an [`OutgoingEmail`] from the configured
//! [`EmailTemplates`] and hand it to a [`Notifier`]. Delivery failures are
//! returned to the caller, which logs and counts them without aborting the
//! batch.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use judging_state::{EntryDetail, EntryId, Judge};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("entry {entry_id} has no contact email")]
    NoRecipient { entry_id: EntryId },

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub body: String,
}

/// Subject and body with `{{key}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub subject: String,
    pub body: String,
}

impl EmailTemplate {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Substitute every `{{key}}` in subject and body. Unknown placeholders
    /// are left untouched.
    pub fn render(&self, vars: &[(&str, &str)]) -> (String, String) {
        (render_str(&self.subject, vars), render_str(&self.body, vars))
    }
}

fn render_str(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), value)
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailTemplates {
    pub judge_assigned: EmailTemplate,
    pub entry_shortlisted: EmailTemplate,
}

impl Default for EmailTemplates {
    fn default() -> Self {
        Self {
            judge_assigned: EmailTemplate::new(
                "New entry to judge: {{award_name}}",
                "Hello {{judge_name}},\n\n\
                 You have been assigned entry {{entry_id}} from {{company_name}} \
                 in the {{award_name}} ({{award_category}}) category.\n\n\
                 Please log in to the judging portal to submit your score.",
            ),
            entry_shortlisted: EmailTemplate::new(
                "Shortlisted: {{award_name}}",
                "Dear {{contact_name}},\n\n\
                 Congratulations! The entry from {{company_name}} has been shortlisted \
                 for {{award_name}}.\n\n\
                 We will be in touch with details of the final judging stage.",
            ),
        }
    }
}

impl EmailTemplates {
    pub fn judge_assigned_email(&self, judge: &Judge, entry: &EntryDetail) -> OutgoingEmail {
        let (subject, body) = self.judge_assigned.render(&[
            ("judge_name", judge.name.as_str()),
            ("judge_email", judge.email.as_str()),
            ("entry_id", entry.entry.id.as_str()),
            ("company_name", entry.organisation.company_name.as_str()),
            ("award_name", entry.award.name.as_str()),
            ("award_category", entry.award.category.as_str()),
        ]);
        OutgoingEmail {
            to_email: judge.email.clone(),
            to_name: judge.name.clone(),
            subject,
            body,
        }
    }

    /// Fails when the organisation has no contact email.
    pub fn entry_shortlisted_email(
        &self,
        entry: &EntryDetail,
    ) -> Result<OutgoingEmail, NotifyError> {
        let organisation = &entry.organisation;
        let to_email = organisation
            .contact_email
            .clone()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| NotifyError::NoRecipient {
                entry_id: entry.entry.id.clone(),
            })?;
        let to_name = organisation
            .contact_name
            .clone()
            .unwrap_or_else(|| organisation.company_name.clone());
        let (subject, body) = self.entry_shortlisted.render(&[
            ("contact_name", to_name.as_str()),
            ("company_name", organisation.company_name.as_str()),
            ("entry_id", entry.entry.id.as_str()),
            ("award_name", entry.award.name.as_str()),
            ("award_category", entry.award.category.as_str()),
        ]);
        Ok(OutgoingEmail {
            to_email,
            to_name,
            subject,
            body,
        })
    }
}

/// Delivery channel for judging notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_judge_assigned(
        &self,
        judge: &Judge,
        entry: &EntryDetail,
    ) -> Result<(), NotifyError>;

    async fn notify_entry_shortlisted(&self, entry: &EntryDetail) -> Result<(), NotifyError>;
}

// ---------------------------------------------------------------------------
// TracingNotifier
// ---------------------------------------------------------------------------

/// Logs rendered messages instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier {
    templates: EmailTemplates,
}

impl TracingNotifier {
    pub fn new(templates: EmailTemplates) -> Self {
        Self { templates }
    }

    fn log(email: &OutgoingEmail, kind: &str) {
        info!(
            event = "notification.logged",
            kind = %kind,
            to = %email.to_email,
            subject = %email.subject,
        );
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify_judge_assigned(
        &self,
        judge: &Judge,
        entry: &EntryDetail,
    ) -> Result<(), NotifyError> {
        Self::log(&self.templates.judge_assigned_email(judge, entry), "judge_assigned");
        Ok(())
    }

    async fn notify_entry_shortlisted(&self, entry: &EntryDetail) -> Result<(), NotifyError> {
        Self::log(&self.templates.entry_shortlisted_email(entry)?, "entry_shortlisted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Captures rendered messages for assertions.
///
/// Recipients registered with [`RecordingNotifier::fail_for`] get a
/// `Delivery` error and nothing is recorded for them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    templates: EmailTemplates,
    sent: Mutex<Vec<OutgoingEmail>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates(templates: EmailTemplates) -> Self {
        Self {
            templates,
            ..Self::default()
        }
    }

    pub fn fail_for(&self, recipient: impl Into<String>) {
        self.failing.lock().unwrap().insert(recipient.into());
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.to_email.clone())
            .collect()
    }

    fn deliver(&self, email: OutgoingEmail) -> Result<(), NotifyError> {
        if self.failing.lock().unwrap().contains(&email.to_email) {
            return Err(NotifyError::Delivery(format!(
                "injected failure for {}",
                email.to_email
            )));
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_judge_assigned(
        &self,
        judge: &Judge,
        entry: &EntryDetail,
    ) -> Result<(), NotifyError> {
        self.deliver(self.templates.judge_assigned_email(judge, entry))
    }

    async fn notify_entry_shortlisted(&self, entry: &EntryDetail) -> Result<(), NotifyError> {
        self.deliver(self.templates.entry_shortlisted_email(entry)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use judging_state::{Award, Entry, Organisation};

    fn detail(contact: bool) -> EntryDetail {
        let mut organisation = Organisation::new("org-1", "Acme Ltd");
        if contact {
            organisation = organisation.with_contact("Ada", "ada@acme.com");
        }
        EntryDetail {
            entry: Entry::submitted("entry-1", "org-1", "award-1", Utc::now()),
            organisation,
            award: Award::new("award-1", "Retailer of the Year", "Retail"),
            scores: vec![],
        }
    }

    #[test]
    fn render_replaces_known_placeholders() {
        let template = EmailTemplate::new("Hi {{name}}", "{{name}} / {{missing}}");
        let (subject, body) = template.render(&[("name", "Jo")]);
        assert_eq!(subject, "Hi Jo");
        assert_eq!(body, "Jo / {{missing}}");
    }

    #[test]
    fn judge_email_uses_award_and_company() {
        let judge = Judge::new("j1@example.org", "Jo");
        let email = EmailTemplates::default().judge_assigned_email(&judge, &detail(true));
        assert_eq!(email.to_email, "j1@example.org");
        assert_eq!(email.subject, "New entry to judge: Retailer of the Year");
        assert!(email.body.contains("Acme Ltd"));
        assert!(email.body.contains("entry-1"));
    }

    #[test]
    fn shortlist_email_requires_contact() {
        let templates = EmailTemplates::default();
        let email = templates.entry_shortlisted_email(&detail(true)).unwrap();
        assert_eq!(email.to_email, "ada@acme.com");
        assert!(email.body.starts_with("Dear Ada,"));

        let err = templates.entry_shortlisted_email(&detail(false)).unwrap_err();
        assert!(matches!(err, NotifyError::NoRecipient { .. }));
    }

    #[tokio::test]
    async fn recording_notifier_injects_failures() {
        let notifier = RecordingNotifier::new();
        notifier.fail_for("bad@example.org");

        let entry = detail(true);
        notifier
            .notify_judge_assigned(&Judge::new("ok@example.org", "Ok"), &entry)
            .await
            .unwrap();
        assert!(notifier
            .notify_judge_assigned(&Judge::new("bad@example.org", "Bad"), &entry)
            .await
            .is_err());
        assert_eq!(notifier.recipients(), vec!["ok@example.org"]);
    }
}
