use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use html_escape::encode_text;

use keystone_shared::clients::email::{EmailClient, EmailError};
use keystone_shared::clients::smtp::SmtpClient;

/// Transactional messages the auth core sends. Carries owned copies so a
/// queued message never borrows from the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailMessage {
    Verification { name: String, token: String },
    PasswordReset { name: String, token: String },
    PasswordChanged { name: String },
}

impl EmailMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            EmailMessage::Verification { .. } => "verification",
            EmailMessage::PasswordReset { .. } => "password_reset",
            EmailMessage::PasswordChanged { .. } => "password_changed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub link: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmailTemplates {
    frontend_url: String,
    product_name: String,
}

impl EmailTemplates {
    pub fn new(frontend_url: &str, product_name: &str) -> Self {
        Self {
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            product_name: product_name.to_string(),
        }
    }

    /// Display names are user-supplied and are escaped before they reach the HTML body.
    pub fn render(&self, message: &EmailMessage) -> RenderedEmail {
        let product = &self.product_name;
        match message {
            EmailMessage::Verification { name, token } => {
                let name = encode_text(name);
                let link = format!("{}/verify-email?token={token}", self.frontend_url);
                RenderedEmail {
                    subject: format!("{product} - Verify your email"),
                    html: layout(
                        product,
                        &format!(
                            "<p>Hi {name},</p><p>Confirm your email address to finish setting up your account.</p>\
                             <p><a href=\"{link}\">Verify email</a></p>\
                             <p style=\"color: #666;\">This link expires in 24 hours.</p>"
                        ),
                    ),
                    link: Some(link),
                }
            }
            EmailMessage::PasswordReset { name, token } => {
                let name = encode_text(name);
                let link = format!("{}/reset-password?token={token}", self.frontend_url);
                RenderedEmail {
                    subject: format!("{product} - Reset your password"),
                    html: layout(
                        product,
                        &format!(
                            "<p>Hi {name},</p><p>Use the link below to choose a new password.</p>\
                             <p><a href=\"{link}\">Reset password</a></p>\
                             <p style=\"color: #666;\">This link expires in 1 hour. If you did not request it, ignore this email.</p>"
                        ),
                    ),
                    link: Some(link),
                }
            }
            EmailMessage::PasswordChanged { name } => {
                let name = encode_text(name);
                RenderedEmail {
                    subject: format!("{product} - Your password was changed"),
                    html: layout(
                        product,
                        &format!(
                            "<p>Hi {name},</p><p>Your password was just changed and every session was signed out.</p>\
                             <p style=\"color: #666;\">If this wasn't you, reset your password immediately.</p>"
                        ),
                    ),
                    link: None,
                }
            }
        }
    }
}

fn layout(product: &str, body: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
        <h2 style="color: #2563eb;">{}</h2>
        {body}
        </div>"#,
        encode_text(product)
    )
}

/// Delivery backend, chosen once at startup.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Writes messages to the log instead of delivering them.
pub struct LogEmailSender {
    templates: EmailTemplates,
}

impl LogEmailSender {
    pub fn new(templates: EmailTemplates) -> Self {
        Self { templates }
    }
}

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to: &str, message: &EmailMessage) -> Result<(), EmailError> {
        let rendered = self.templates.render(message);
        tracing::debug!(
            to = %to,
            subject = %rendered.subject,
            link = rendered.link.as_deref().unwrap_or("-"),
            "email (log backend)"
        );
        Ok(())
    }
}

pub struct ResendEmailSender {
    client: EmailClient,
    templates: EmailTemplates,
}

impl ResendEmailSender {
    pub fn new(client: EmailClient, templates: EmailTemplates) -> Self {
        Self { client, templates }
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send(&self, to: &str, message: &EmailMessage) -> Result<(), EmailError> {
        let rendered = self.templates.render(message);
        self.client.send_email(to, &rendered.subject, &rendered.html).await
    }
}

pub struct SmtpEmailSender {
    client: SmtpClient,
    templates: EmailTemplates,
}

impl SmtpEmailSender {
    pub fn new(client: SmtpClient, templates: EmailTemplates) -> Self {
        Self { client, templates }
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, to: &str, message: &EmailMessage) -> Result<(), EmailError> {
        let rendered = self.templates.render(message);
        self.client.send_email(to, &rendered.subject, &rendered.html).await
    }
}

/// Fire-and-forget dispatch. Never fails the caller.
pub trait Mailer: Send + Sync {
    fn dispatch(&self, to: &str, message: EmailMessage);
}

struct Envelope {
    to: String,
    message: EmailMessage,
}

/// Hands messages to a detached worker task over a bounded channel.
pub struct QueuedMailer {
    tx: mpsc::Sender<Envelope>,
}

impl QueuedMailer {
    /// Must be called from within a tokio runtime.
    pub fn spawn(sender: Arc<dyn EmailSender>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Envelope>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let kind = envelope.message.kind();
                match sender.send(&envelope.to, &envelope.message).await {
                    Ok(()) => tracing::debug!(kind, "email delivered"),
                    Err(e) => tracing::error!(kind, error = %e, "email delivery failed"),
                }
            }
            tracing::debug!("mail queue closed");
        });

        Self { tx }
    }
}

impl Mailer for QueuedMailer {
    fn dispatch(&self, to: &str, message: EmailMessage) {
        let kind = message.kind();
        let envelope = Envelope {
            to: to.to_string(),
            message,
        };
        if let Err(e) = self.tx.try_send(envelope) {
            tracing::error!(kind, error = %e, "email dropped, queue unavailable");
        }
    }
}
