//! Outbound email transport.

use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport not enabled: {0}")]
    NotEnabled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Send error: {0}")]
    SendFailed(String),

    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Whether a later attempt could succeed without changing the reminder.
    /// A malformed recipient address never will.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::InvalidRecipient(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailReceipt {
    pub id: String,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, email: &EmailMessage) -> Result<EmailReceipt, TransportError>;
    async fn health_check(&self) -> Result<(), TransportError>;
    fn is_enabled(&self) -> bool;
}

pub struct SmtpTransport {
    config: SmtpConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpTransport {
    pub fn new(config: SmtpConfig) -> Result<Self, TransportError> {
        if !config.enabled {
            return Ok(Self {
                config,
                transport: None,
            });
        }

        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| {
                TransportError::Configuration(format!("Failed to create SMTP relay: {}", e))
            })?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            config,
            transport: Some(transport),
        })
    }

    fn build_message(&self, email: &EmailMessage) -> Result<Message, TransportError> {
        let from_mailbox: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| TransportError::Configuration(format!("Invalid from address: {}", e)))?;

        let to_mailbox: Mailbox = email
            .to
            .parse()
            .map_err(|e| TransportError::InvalidRecipient(format!("{}: {}", email.to, e)))?;

        let builder = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(&email.subject);

        let html = SinglePart::builder()
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone());

        let message = if email.attachments.is_empty() {
            builder.singlepart(html)
        } else {
            let mut parts = MultiPart::mixed().singlepart(html);
            for attachment in &email.attachments {
                let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                    TransportError::SendFailed(format!(
                        "Invalid attachment content type '{}': {}",
                        attachment.content_type, e
                    ))
                })?;
                parts = parts.singlepart(
                    lettre::message::Attachment::new(attachment.filename.clone())
                        .body(attachment.content.clone(), content_type),
                );
            }
            builder.multipart(parts)
        };

        message.map_err(|e| TransportError::SendFailed(format!("Failed to build message: {}", e)))
    }
}

#[async_trait]
impl EmailTransport for SmtpTransport {
    async fn send(&self, email: &EmailMessage) -> Result<EmailReceipt, TransportError> {
        if !self.config.enabled {
            return Err(TransportError::NotEnabled(
                "SMTP email transport is not enabled".to_string(),
            ));
        }

        let transport = self.transport.as_ref().ok_or_else(|| {
            TransportError::Configuration("SMTP transport not initialized".to_string())
        })?;

        let message = self.build_message(email)?;

        let response = transport
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed(format!("Failed to send email: {}", e)))?;

        let id = response
            .message()
            .next()
            .map(|s| s.to_string())
            .unwrap_or_default();

        tracing::info!(to = %email.to, subject = %email.subject, "Email sent");

        Ok(EmailReceipt { id })
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        if !self.config.enabled {
            return Ok(());
        }

        let transport = self.transport.as_ref().ok_or_else(|| {
            TransportError::Configuration("SMTP transport not initialized".to_string())
        })?;

        transport.test_connection().await.map_err(|e| {
            TransportError::SendFailed(format!("SMTP connection test failed: {}", e))
        })?;

        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

/// In-memory transport for tests and local development.
#[derive(Default)]
pub struct MockEmailTransport {
    send_count: AtomicU64,
    sent: Mutex<Vec<EmailMessage>>,
    failing_recipients: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    unreachable: AtomicBool,
}

impl MockEmailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Every send to `recipient` fails with a retryable error.
    pub fn fail_for(&self, recipient: impl Into<String>) {
        self.failing_recipients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(recipient.into());
    }

    pub fn recover(&self, recipient: &str) {
        self.failing_recipients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(recipient);
    }

    /// Delay every send, to exercise send timeouts.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Make `health_check` report the relay as unreachable.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmailTransport for MockEmailTransport {
    async fn send(&self, email: &EmailMessage) -> Result<EmailReceipt, TransportError> {
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if !email.to.contains('@') {
            return Err(TransportError::InvalidRecipient(email.to.clone()));
        }

        let failing = self
            .failing_recipients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&email.to);
        if failing {
            return Err(TransportError::SendFailed(format!(
                "Mock transport rejected {}",
                email.to
            )));
        }

        let count = self.send_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(email.clone());

        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "[MOCK] Email would be sent"
        );

        Ok(EmailReceipt {
            id: format!("mock-email-{}", count),
        })
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed(
                "Mock transport is unreachable".to_string(),
            ));
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }
}
