//! Error types for judging-mailer

use judging_core::NotifyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailerError {
    /// A required environment variable is missing
    #[error("mailer is not configured: {0} is not set")]
    NotConfigured(&'static str),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(String),

    /// The mail API answered with a non-success status
    #[error("mail API returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for MailerError {
    fn from(err: reqwest::Error) -> Self {
        MailerError::Http(err.to_string())
    }
}

impl From<MailerError> for NotifyError {
    fn from(err: MailerError) -> Self {
        match err {
            MailerError::Rejected { status, body } => NotifyError::Rejected { status, body },
            other => NotifyError::Delivery(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MailerError>;
