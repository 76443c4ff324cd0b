//! Outgoing mail.
//!
//! The only mail this system sends is the signup verification email.
//! When SMTP is fully configured the message goes out over STARTTLS via
//! `lettre`; otherwise delivery degrades to an info-level log line
//! carrying the verification URL, so local setups work without a relay.

use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;

/// Verification-mail sender. Cheap to clone into the shared app state.
#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Option<Mailbox>,
}

impl Mailer {
    /// Build a mailer from config. Returns an unconfigured (log-only)
    /// mailer unless every SMTP field is present.
    pub fn from_config(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let (Some(host), Some(port), Some(username), Some(password), Some(from_email)) = (
            cfg.host.as_ref(),
            cfg.port.as_ref(),
            cfg.username.as_ref(),
            cfg.password.as_ref(),
            cfg.from_email.as_ref(),
        ) else {
            return Ok(Self {
                transport: None,
                from: None,
            });
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
            .port(*port)
            .credentials(Credentials::new(username.clone(), password.clone()))
            .build();
        let from = from_email
            .parse::<Mailbox>()
            .map_err(|e| anyhow::anyhow!("invalid from_email {from_email:?}: {e}"))?;

        Ok(Self {
            transport: Some(transport),
            from: Some(from),
        })
    }

    /// Whether a real SMTP transport is behind this mailer.
    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    /// Send the signup verification email to `email_to`.
    pub async fn send_verification(
        &self,
        email_to: &str,
        verification_url: &str,
    ) -> anyhow::Result<()> {
        let (Some(transport), Some(from)) = (&self.transport, &self.from) else {
            tracing::info!(
                to = %email_to,
                url = %verification_url,
                "SMTP not configured; verification email suppressed"
            );
            return Ok(());
        };

        let to = email_to
            .parse::<Mailbox>()
            .map_err(|e| anyhow::anyhow!("invalid recipient address {email_to:?}: {e}"))?;

        let text = format!(
            "Hi,\nPlease verify your email by clicking the link below:\n{verification_url}\n"
        );
        let html = format!(
            "<html><body><p>Hi,<br>Please verify your email by clicking the link below:<br>\
             <a href=\"{verification_url}\">{verification_url}</a></p></body></html>"
        );

        let message = Message::builder()
            .from(from.clone())
            .to(to)
            .subject("Verify your email")
            .multipart(MultiPart::alternative_plain_html(text, html))?;

        transport.send(message).await?;
        tracing::debug!(to = %email_to, "verification email sent");
        Ok(())
    }
}

// -- Tests --------------------------------------------------------------------
