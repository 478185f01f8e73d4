use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use super::NotifyError;
use crate::config::MailConfig;

#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<MailAttachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), NotifyError>;
}

/// SMTP delivery through lettre's tokio transport
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self, NotifyError> {
        let from = mailbox(Some(&config.from_name), &config.from_address)?;

        let credentials = match (&config.smtp_username, &config.smtp_password) {
            (Some(user), Some(pass)) => Some(Credentials::new(user.clone(), pass.clone())),
            _ => None,
        };

        // 465 is implicit TLS, authenticated relays use STARTTLS, anything else
        // (local mail catchers) is plain SMTP
        let builder = if config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
        } else if credentials.is_some() {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };

        let builder = builder.port(config.smtp_port);
        let transport = match credentials {
            Some(credentials) => builder.credentials(credentials).build(),
            None => builder.build(),
        };

        info!(host = %config.smtp_host, port = config.smtp_port, "SMTP mailer configured");
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), NotifyError> {
        let to = mailbox(mail.to_name.as_deref(), &mail.to)?;
        let message = build_message(self.from.clone(), to, &mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        Ok(())
    }
}

/// Mailer used when delivery is disabled; records intent in the log
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), NotifyError> {
        info!(
            to = %mail.to,
            attachments = mail.attachments.len(),
            "Mail delivery disabled, skipping '{}'",
            mail.subject
        );
        Ok(())
    }
}

fn mailbox(name: Option<&str>, address: &str) -> Result<Mailbox, NotifyError> {
    let address = address
        .trim()
        .parse::<Address>()
        .map_err(|e| NotifyError::Address(format!("{}: {}", address, e)))?;
    Ok(Mailbox::new(name.map(str::to_string).filter(|n| !n.is_empty()), address))
}

pub(crate) fn build_message(from: Mailbox, to: Mailbox, mail: &OutgoingMail) -> Result<Message, NotifyError> {
    let mut body = MultiPart::mixed().singlepart(SinglePart::html(mail.html.clone()));
    for attachment in &mail.attachments {
        let content_type = ContentType::parse(&attachment.content_type)
            .map_err(|e| NotifyError::Build(format!("{}: {}", attachment.content_type, e)))?;
        body = body.singlepart(Attachment::new(attachment.filename.clone()).body(attachment.data.clone(), content_type));
    }

    Message::builder()
        .from(from)
        .to(to)
        .subject(mail.subject.clone())
        .multipart(body)
        .map_err(|e| NotifyError::Build(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail() -> OutgoingMail {
        OutgoingMail {
            to: "buyer@example.com".to_string(),
            to_name: Some("Buyer".to_string()),
            subject: "Quote".to_string(),
            html: "<p>hi</p>".to_string(),
            attachments: vec![MailAttachment {
                filename: "q.xlsx".to_string(),
                content_type: crate::notify::quotation::QUOTATION_CONTENT_TYPE.to_string(),
                data: vec![1, 2, 3],
            }],
        }
    }

    #[test]
    fn builds_multipart_message() {
        let from = mailbox(Some("Store"), "no-reply@example.com").unwrap();
        let to = mailbox(Some("Buyer"), "buyer@example.com").unwrap();
        let message = build_message(from, to, &mail()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Quote"));
        assert!(raw.contains("q.xlsx"));
        assert!(raw.contains("multipart/mixed"));
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!(matches!(mailbox(None, "not an address"), Err(NotifyError::Address(_))));
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        assert!(LogMailer.send(mail()).await.is_ok());
    }

    #[test]
    fn plain_smtp_for_local_catchers() {
        let mut config = crate::config::AppConfig::development().mail;
        config.from_address = "no-reply@example.com".to_string();
        assert!(SmtpMailer::from_config(&config).is_ok());
    }
}
