//! Reminder delivery: email through SMTP, or the log when email is disabled

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
    models::borrow::{ReminderKind, ReminderMethod},
};

/// What a reminder tells the member
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderMessage {
    pub borrow_id: i32,
    pub kind: ReminderKind,
    pub member_name: String,
    pub member_email: Option<String>,
    pub book_title: String,
    pub due_date: DateTime<Utc>,
    pub days_overdue: i64,
    pub total_fines: Decimal,
}

impl ReminderMessage {
    fn subject(&self) -> String {
        match self.kind {
            ReminderKind::DueSoon => format!("\"{}\" is due soon", self.book_title),
            ReminderKind::Overdue => format!("\"{}\" is overdue", self.book_title),
            ReminderKind::FinalNotice => format!("Final notice: \"{}\"", self.book_title),
        }
    }

    fn body(&self) -> String {
        let due = self.due_date.format("%Y-%m-%d");
        let mut body = match self.kind {
            ReminderKind::DueSoon => format!(
                "Hello {},\n\n\"{}\" is due back on {}. You can renew it at the desk if no fine is pending.\n",
                self.member_name, self.book_title, due
            ),
            ReminderKind::Overdue => format!(
                "Hello {},\n\n\"{}\" was due on {} and is now {} day(s) overdue. Please return it as soon as possible.\n",
                self.member_name, self.book_title, due, self.days_overdue
            ),
            ReminderKind::FinalNotice => format!(
                "Hello {},\n\n\"{}\" is {} day(s) overdue (due {}). Without a return it will be written off as lost and charged to your account.\n",
                self.member_name, self.book_title, self.days_overdue, due
            ),
        };
        if self.total_fines > Decimal::ZERO {
            body.push_str(&format!("\nOutstanding fines on this borrow: {}\n", self.total_fines));
        }
        body
    }
}

/// Delivers reminders to members
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel recorded in `reminders_sent`
    fn method(&self) -> ReminderMethod;

    async fn send_reminder(&self, message: &ReminderMessage) -> AppResult<()>;
}

/// Sends reminders by email
#[derive(Clone)]
pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_email(&self, to: &str, subject: &str, body: &str) -> AppResult<Message> {
        let from_name = self
            .config
            .smtp_from_name
            .as_deref()
            .unwrap_or("Elidune");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Internal(format!("Invalid to address: {}", e)))?;

        Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!(
                                r#"<html><body><p>{}</p></body></html>"#,
                                body.replace('\n', "<br>")
                            )),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))
    }

    fn mailer(&self) -> AppResult<SmtpTransport> {
        let builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let builder = match (&self.config.smtp_username, &self.config.smtp_password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn method(&self) -> ReminderMethod {
        ReminderMethod::Email
    }

    async fn send_reminder(&self, message: &ReminderMessage) -> AppResult<()> {
        let to = message.member_email.as_deref().ok_or_else(|| {
            AppError::Validation(format!(
                "Member of borrow {} has no email address",
                message.borrow_id
            ))
        })?;

        let email = self.build_email(to, &message.subject(), &message.body())?;
        let mailer = self.mailer()?;

        // SmtpTransport is blocking
        tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        tracing::info!(
            borrow_id = message.borrow_id,
            kind = %message.kind,
            "Reminder email sent"
        );
        Ok(())
    }
}

/// Writes reminders to the log instead of delivering them
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn method(&self) -> ReminderMethod {
        ReminderMethod::Log
    }

    async fn send_reminder(&self, message: &ReminderMessage) -> AppResult<()> {
        tracing::info!(
            borrow_id = message.borrow_id,
            kind = %message.kind,
            member = %message.member_name,
            "{}",
            message.subject()
        );
        Ok(())
    }
}
