//! Judging-Mailer: email delivery for judging notifications
//!
//! Implements the `judging_core::Notifier` seam over a SendGrid-compatible
//! HTTP API. Messages are rendered by `judging_core::EmailTemplates`; this
//! crate only transports them.

pub mod error;
pub mod sendgrid;

pub use error::{MailerError, Result};
pub use sendgrid::{
    build_payload, SendGridConfig, SendGridMailer, DEFAULT_API_BASE, DEFAULT_FROM_NAME,
};
