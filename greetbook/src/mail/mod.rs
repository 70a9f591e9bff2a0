//! Outbound email: transport trait, SMTP implementation, and an
//! in-memory mailer for tests.

pub mod templates;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Mutex;
use thiserror::Error;

pub use templates::MailContext;

/// Mail delivery errors. Delivery failures are non-fatal to the flows
/// that trigger them; callers log and carry on.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Result type for mail operations
pub type MailResult<T> = Result<T, MailError>;

/// Mail transport abstraction, trait-based so tests can record instead
/// of deliver.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> MailResult<()>;
}

/// SMTP transport configuration
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// From address, e.g. `Greetbook <no-reply@example.com>`
    pub from: String,
}

/// Mailer backed by an async SMTP relay with TLS
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> MailResult<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .port(config.port)
            .build();

        Ok(Self {
            transport,
            from: config.from.parse()?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> MailResult<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        self.transport.send(message).await?;
        log::debug!("Sent mail to {to}");
        Ok(())
    }
}

/// A message captured by [`MemoryMailer`]
#[derive(Debug, Clone)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mailer that records messages instead of delivering them. Used by the
/// test suites to assert on verification and reset mails.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutboundMail>>,
}

impl MemoryMailer {
    /// Snapshot of everything sent so far.
    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }

    pub fn clear(&self) {
        self.sent.lock().expect("mailer mutex poisoned").clear();
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> MailResult<()> {
        self.sent.lock().expect("mailer mutex poisoned").push(OutboundMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
