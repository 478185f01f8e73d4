//! Post-commit side-channel for inquiries: quotation workbook plus email.
//!
//! Nothing here can fail a submission. Each step logs its own error and
//! the dispatcher moves on to the next one.

pub mod mailer;
pub mod quotation;
pub mod templates;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, InquiryConfig};

pub use mailer::{LogMailer, MailAttachment, Mailer, OutgoingMail, SmtpMailer};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Mail configuration error: {0}")]
    Config(String),

    #[error("Invalid mail address {0}")]
    Address(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Mail delivery failed: {0}")]
    Delivery(String),

    #[error("Failed to render quotation: {0}")]
    Quotation(String),
}

impl From<rust_xlsxwriter::XlsxError> for NotifyError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        NotifyError::Quotation(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NoticeCustomer {
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoticeAssignee {
    pub name: String,
    pub email: String,
}

/// Everything the side-channel needs, captured at commit time
#[derive(Debug, Clone, Serialize)]
pub struct InquiryNotice {
    pub inquiry_id: Uuid,
    pub site_id: Uuid,
    pub site_name: String,
    pub inquiry_no: String,
    pub created_at: DateTime<Utc>,
    pub customer: NoticeCustomer,
    pub product_name: String,
    pub sku_code: Option<String>,
    pub sku_spec: serde_json::Value,
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
    pub currency: Option<String>,
    pub message: Option<String>,
    pub assignee: Option<NoticeAssignee>,
    pub is_public: bool,
}

/// Outcome counts of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: u32,
    pub failed: u32,
    pub skipped: u32,
}

pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    notify_customer: bool,
    fallback_email: Option<String>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, config: &InquiryConfig) -> Self {
        Self {
            mailer,
            notify_customer: config.notify_customer,
            fallback_email: config.fallback_email.clone(),
        }
    }

    /// SMTP when mail is enabled, otherwise a logging mailer
    pub fn from_config(config: &AppConfig) -> Result<Self, NotifyError> {
        let mailer: Arc<dyn Mailer> = if config.mail.enabled {
            Arc::new(SmtpMailer::from_config(&config.mail)?)
        } else {
            info!("Mail disabled, notifications will only be logged");
            Arc::new(LogMailer)
        };
        Ok(Self::new(mailer, &config.inquiry))
    }

    /// Run the dispatch on its own task; the caller never awaits it
    pub fn spawn_inquiry(self: &Arc<Self>, notice: InquiryNotice) -> JoinHandle<DispatchReport> {
        let notifier = Arc::clone(self);
        tokio::spawn(async move { notifier.dispatch_inquiry(&notice).await })
    }

    pub async fn dispatch_inquiry(&self, notice: &InquiryNotice) -> DispatchReport {
        let mut report = DispatchReport::default();

        let attachments = match quotation::build_quotation(notice) {
            Ok(bytes) => vec![MailAttachment {
                filename: quotation::quotation_filename(&notice.inquiry_no),
                content_type: quotation::QUOTATION_CONTENT_TYPE.to_string(),
                data: bytes,
            }],
            Err(e) => {
                error!(inquiry_id = %notice.inquiry_id, "Failed to build quotation workbook: {}", e);
                Vec::new()
            }
        };

        let recipient = match &notice.assignee {
            Some(assignee) => Some((assignee.email.clone(), Some(assignee.name.clone()))),
            None => self.fallback_email.clone().map(|email| (email, None)),
        };

        match recipient {
            Some((to, to_name)) => {
                let (subject, html) = templates::salesperson_notice(notice);
                let mail = OutgoingMail {
                    to,
                    to_name,
                    subject,
                    html,
                    attachments,
                };
                self.deliver(notice, "salesperson notice", mail, &mut report).await;
            }
            None => {
                warn!(
                    inquiry_id = %notice.inquiry_id,
                    "Inquiry {} is in the public pool and no fallback address is configured",
                    notice.inquiry_no
                );
                report.skipped += 1;
            }
        }

        if self.notify_customer {
            let (subject, html) = templates::customer_confirmation(notice);
            let mail = OutgoingMail {
                to: notice.customer.email.clone(),
                to_name: Some(notice.customer.name.clone()),
                subject,
                html,
                attachments: Vec::new(),
            };
            self.deliver(notice, "customer confirmation", mail, &mut report).await;
        } else {
            report.skipped += 1;
        }

        report
    }

    async fn deliver(&self, notice: &InquiryNotice, what: &str, mail: OutgoingMail, report: &mut DispatchReport) {
        let to = mail.to.clone();
        match self.mailer.send(mail).await {
            Ok(()) => {
                info!(inquiry_id = %notice.inquiry_id, site_id = %notice.site_id, "Sent {} to {}", what, to);
                report.sent += 1;
            }
            Err(e) => {
                error!(inquiry_id = %notice.inquiry_id, site_id = %notice.site_id, "Failed to send {} to {}: {}", what, to, e);
                report.failed += 1;
            }
        }
    }
}
