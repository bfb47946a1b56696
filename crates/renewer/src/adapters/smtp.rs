//! Alert delivery over SMTP.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use autossl_common::CapabilityError;
use autossl_config::NotifierConfig;

use crate::ports::{Notification, Notifier};

/// Port that uses implicit TLS; every other port upgrades with STARTTLS.
const SMTPS_PORT: u16 = 465;

/// Sends notifications through an authenticated SMTP relay.
pub struct SmtpNotifier {
    sender: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(config: &NotifierConfig) -> Result<Self, CapabilityError> {
        let sender: Mailbox = config
            .sender
            .parse()
            .map_err(|e| CapabilityError::Other(format!("invalid sender address: {e}")))?;

        let relay = if config.smtp_port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        };
        let builder =
            relay.map_err(|e| CapabilityError::Other(format!("invalid SMTP relay: {e}")))?;

        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { sender, transport })
    }

    /// Build the MIME message for `notification`.
    fn message(&self, notification: &Notification) -> Result<Message, CapabilityError> {
        let mut builder = Message::builder()
            .from(self.sender.clone())
            .subject(notification.subject.as_str());
        for recipient in &notification.recipients {
            let to: Mailbox = recipient.parse().map_err(|e| {
                CapabilityError::Other(format!("invalid recipient {recipient}: {e}"))
            })?;
            builder = builder.to(to);
        }

        let alternative = MultiPart::alternative()
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(notification.text_body.clone()),
            )
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(notification.html_body.clone()),
            );

        let body = if notification.attachments.is_empty() {
            alternative
        } else {
            let mut mixed = MultiPart::mixed().multipart(alternative);
            for attachment in &notification.attachments {
                let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                    CapabilityError::Other(format!(
                        "invalid content type {}: {e}",
                        attachment.content_type
                    ))
                })?;
                mixed = mixed.singlepart(
                    MailAttachment::new(attachment.filename.clone())
                        .body(attachment.body.clone(), content_type),
                );
            }
            mixed
        };

        builder
            .multipart(body)
            .map_err(|e| CapabilityError::Other(format!("failed to build message: {e}")))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), CapabilityError> {
        let message = self.message(notification)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;

        info!(
            recipients = notification.recipients.len(),
            subject = %notification.subject,
            "Email sent"
        );
        Ok(())
    }
}

impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("sender", &self.sender.to_string())
            .finish()
    }
}
