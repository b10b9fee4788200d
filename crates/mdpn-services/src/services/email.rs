//! Email notifications for processed packages.
//!
//! Best effort: every failure is returned to the pipeline, which records it
//! and moves on.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;

use mdpn_core::constants::{BAG_INFO_FILE, FORMAT_REPORT_FILE, SCAN_REPORT_FILE};
use mdpn_core::{EmailConfig, NotificationError, PackageReport, StageOutcome};
use mdpn_processing::Notifier;

const DEBUG_FROM: &str = "mdpn-ingest@localhost";

enum Delivery {
    Disabled,
    Smtp(Arc<AsyncSmtpTransport<Tokio1Executor>>),
    /// Write rendered messages into this directory instead of sending.
    Debug(PathBuf),
}

/// A fully composed notification, independent of how it is delivered.
#[derive(Debug, Clone)]
pub struct ComposedEmail {
    pub from: String,
    pub to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<(String, Vec<u8>)>,
}

pub struct EmailNotifier {
    from: String,
    cc: Vec<String>,
    delivery: Delivery,
}

impl EmailNotifier {
    pub fn from_config(config: &EmailConfig) -> Result<Self, NotificationError> {
        if !config.enabled {
            tracing::debug!("Email notifications disabled (EMAIL_ENABLED=false)");
            return Ok(Self {
                from: DEBUG_FROM.to_string(),
                cc: config.cc.clone(),
                delivery: Delivery::Disabled,
            });
        }

        if config.debug {
            tracing::info!(dir = %config.debug_dir.display(), "Email debug mode: messages written to disk");
            return Ok(Self {
                from: config
                    .smtp_from
                    .clone()
                    .unwrap_or_else(|| DEBUG_FROM.to_string()),
                cc: config.cc.clone(),
                delivery: Delivery::Debug(config.debug_dir.clone()),
            });
        }

        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotificationError::Build("SMTP_HOST is not set".to_string()))?;
        let from = config
            .smtp_from
            .clone()
            .ok_or_else(|| NotificationError::Build("SMTP_FROM is not set".to_string()))?;
        let port = config.smtp_port;
        let credentials = match (&config.smtp_user, &config.smtp_password) {
            (Some(u), Some(p)) => Some(Credentials::new(u.clone(), p.clone())),
            _ => None,
        };

        let mailer = if config.smtp_tls {
            let b = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| NotificationError::Transport(e.to_string()))?
                .port(port);
            let b = match credentials {
                Some(c) => b.credentials(c),
                None => b,
            };
            tracing::info!(host = %host, port = port, "Email notifier initialized (SMTP with STARTTLS)");
            b.build()
        } else {
            let b = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port);
            let b = match credentials {
                Some(c) => b.credentials(c),
                None => b,
            };
            tracing::info!(host = %host, port = port, "Email notifier initialized (SMTP)");
            b.build()
        };

        Ok(Self {
            from,
            cc: config.cc.clone(),
            delivery: Delivery::Smtp(Arc::new(mailer)),
        })
    }

    /// Build the message for a report. Attachments are only included for
    /// staged packages.
    pub async fn compose(&self, report: &PackageReport) -> Result<ComposedEmail, NotificationError> {
        let to = report
            .metadata
            .contact_email()
            .ok_or(NotificationError::MissingRecipient)?
            .to_string();

        let mut attachments = Vec::new();
        if report.status.is_success() {
            if let Some(au_dir) = &report.au_dir {
                for name in [BAG_INFO_FILE, SCAN_REPORT_FILE, FORMAT_REPORT_FILE] {
                    match tokio::fs::read(au_dir.join(name)).await {
                        Ok(bytes) => attachments.push((name.to_string(), bytes)),
                        Err(e) => {
                            tracing::debug!(file = name, error = %e, "Attachment not available")
                        }
                    }
                }
            }
        }

        Ok(ComposedEmail {
            from: self.from.clone(),
            to,
            cc: self.cc.clone(),
            subject: format!(
                "MDPN ingest {}: {}",
                report.status,
                report.package.file_name()
            ),
            body: render_body(report),
            attachments,
        })
    }
}

fn render_body(report: &PackageReport) -> String {
    let meta = &report.metadata;
    let mut body = String::new();
    let _ = writeln!(body, "Package: {}", report.package.file_name());
    let _ = writeln!(body, "Status: {}", report.status);
    let _ = writeln!(
        body,
        "Received: {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(body, "Size: {} bytes", report.package.size);
    let _ = writeln!(body, "Organization: {}", meta.organization().unwrap_or("-"));
    let _ = writeln!(
        body,
        "External identifier: {}",
        meta.external_identifier().unwrap_or("-")
    );
    if let Some(auid) = &report.auid {
        let _ = writeln!(body, "LOCKSS AU Id: {}", auid);
    }
    if let Some(au_dir) = &report.au_dir {
        let _ = writeln!(body, "Location: {}", au_dir.display());
    }

    let failures: Vec<_> = report
        .outcomes
        .iter()
        .filter_map(|o| match o {
            StageOutcome::Failed { stage, error } => Some(format!("  - {}: {}", stage, error)),
            _ => None,
        })
        .collect();
    if !failures.is_empty() {
        body.push_str("\nProblems:\n");
        body.push_str(&failures.join("\n"));
        body.push('\n');
    }
    body
}

fn mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| NotificationError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

impl ComposedEmail {
    pub fn to_message(&self) -> Result<Message, NotificationError> {
        let mut builder = Message::builder()
            .from(mailbox(&self.from)?)
            .to(mailbox(&self.to)?)
            .subject(self.subject.as_str());
        for cc in &self.cc {
            match mailbox(cc) {
                Ok(mb) => builder = builder.cc(mb),
                Err(e) => tracing::warn!(error = %e, "Skipping invalid cc address"),
            }
        }

        let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(self.body.clone()));
        for (name, bytes) in &self.attachments {
            multipart = multipart.singlepart(
                Attachment::new(name.clone()).body(bytes.clone(), ContentType::TEXT_PLAIN),
            );
        }

        builder
            .multipart(multipart)
            .map_err(|e| NotificationError::Build(e.to_string()))
    }

    /// Human-readable rendering used by debug mode.
    pub fn render_debug(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "From: {}", self.from);
        let _ = writeln!(out, "To: {}", self.to);
        if !self.cc.is_empty() {
            let _ = writeln!(out, "Cc: {}", self.cc.join(", "));
        }
        let _ = writeln!(out, "Subject: {}", self.subject);
        let _ = writeln!(out, "Date: {}", Local::now().to_rfc2822());
        out.push('\n');
        out.push_str(&self.body);
        out.push_str("\n--- Attachments ---\n");
        if self.attachments.is_empty() {
            out.push_str("(none)\n");
        }
        for (name, bytes) in &self.attachments {
            let _ = writeln!(out, "{} ({} bytes)", name, bytes.len());
        }
        out
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, report: &PackageReport) -> Result<(), NotificationError> {
        if matches!(self.delivery, Delivery::Disabled) {
            return Ok(());
        }

        let email = self.compose(report).await?;

        match &self.delivery {
            Delivery::Disabled => Ok(()),
            Delivery::Debug(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                let path = dir.join(format!(
                    "{}_{}.txt",
                    Local::now().format("%Y%m%d_%H%M%S_%6f"),
                    report.package.au_name
                ));
                tokio::fs::write(&path, email.render_debug()).await?;
                tracing::info!(path = %path.display(), to = %email.to, "Email written to debug file");
                Ok(())
            }
            Delivery::Smtp(mailer) => {
                let message = email.to_message()?;
                mailer
                    .send(message)
                    .await
                    .map_err(|e| NotificationError::Transport(e.to_string()))?;
                tracing::info!(to = %email.to, cc = email.cc.len(), "Notification email sent");
                Ok(())
            }
        }
    }
}
