//! Email delivery of the export file.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::{ExposeSecret, SecretString};

/// Port that expects TLS from the first byte rather than STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// A message carrying the export as an attachment.
#[derive(Debug, Clone)]
pub struct ExportEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment_name: String,
    pub attachment: Vec<u8>,
}

impl ExportEmail {
    /// Build the message for an export file already written to `path`.
    pub fn for_export(
        to: impl Into<String>,
        path: &Path,
        record_count: usize,
        date: NaiveDate,
    ) -> Result<Self> {
        let attachment = std::fs::read(path)
            .with_context(|| format!("Failed to read export file: {}", path.display()))?;
        let attachment_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "credit_list.csv".to_string());

        Ok(Self {
            to: to.into(),
            subject: format!("Unprocessed payments export ({date})"),
            body: format!(
                "Attached are {record_count} unprocessed Credit Card/ACH payments from the last 30 days."
            ),
            attachment_name,
            attachment,
        })
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &ExportEmail) -> Result<()>;
}

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from: String,
}

/// Mailer that relays through an authenticated SMTP server.
pub struct SmtpMailer {
    settings: SmtpSettings,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let host = self.settings.host.as_str();
        let builder = if self.settings.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        };
        let builder = builder.with_context(|| format!("Invalid SMTP host: {host}"))?;

        Ok(builder
            .port(self.settings.port)
            .credentials(Credentials::new(
                self.settings.username.clone(),
                self.settings.password.expose_secret().to_string(),
            ))
            .build())
    }

    fn message(&self, email: &ExportEmail) -> Result<Message> {
        let from: Mailbox = self
            .settings
            .from
            .parse()
            .with_context(|| format!("Invalid sender address: {}", self.settings.from))?;
        let to: Mailbox = email
            .to
            .parse()
            .with_context(|| format!("Invalid recipient address: {}", email.to))?;
        let csv_type = ContentType::parse("text/csv").context("Invalid attachment content type")?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.clone())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(email.body.clone()))
                    .singlepart(
                        Attachment::new(email.attachment_name.clone())
                            .body(email.attachment.clone(), csv_type),
                    ),
            )
            .context("Failed to build email message")
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &ExportEmail) -> Result<()> {
        let message = self.message(email)?;
        self.transport()?
            .send(message)
            .await
            .with_context(|| format!("SMTP delivery via {} failed", self.settings.host))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "reports@example.com".to_string(),
            password: SecretString::from("hunter2".to_string()),
            from: "Reports <reports@example.com>".to_string(),
        }
    }

    #[test]
    fn test_email_for_export_reads_attachment() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, "Payment_ID\nP1\n")?;
        let date = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();

        let email = ExportEmail::for_export("ops@example.com", file.path(), 1, date)?;

        assert_eq!(email.subject, "Unprocessed payments export (2024-06-30)");
        assert!(email.body.contains("1 unprocessed"));
        assert_eq!(email.attachment, b"Payment_ID\nP1\n");
        Ok(())
    }

    #[test]
    fn test_message_includes_attachment() -> Result<()> {
        let mailer = SmtpMailer::new(settings());
        let email = ExportEmail {
            to: "ops@example.com".to_string(),
            subject: "Export".to_string(),
            body: "See attached".to_string(),
            attachment_name: "credit_list.csv".to_string(),
            attachment: b"Payment_ID\n".to_vec(),
        };

        let raw = String::from_utf8(mailer.message(&email)?.formatted())?;
        assert!(raw.contains("To: ops@example.com"));
        assert!(raw.contains("filename=\"credit_list.csv\""));
        assert!(raw.contains("text/csv"));
        Ok(())
    }

    #[test]
    fn test_invalid_recipient_is_rejected() {
        let mailer = SmtpMailer::new(settings());
        let email = ExportEmail {
            to: "not an address".to_string(),
            subject: String::new(),
            body: String::new(),
            attachment_name: "x.csv".to_string(),
            attachment: Vec::new(),
        };
        assert!(mailer.message(&email).is_err());
    }
}
