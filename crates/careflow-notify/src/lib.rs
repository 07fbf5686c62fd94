// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transactional email over SMTP via lettre.
//!
//! Email is best-effort: the [`NotificationSender`] contract returns a
//! bool and failures are logged, never propagated into the booking or
//! payment flow that triggered the notification.

use async_trait::async_trait;
use careflow_core::{CareflowError, NotificationSender};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

/// SMTP settings, from the `email` config section.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(settings: &SmtpSettings) -> Result<Self, CareflowError> {
        let from = settings
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| CareflowError::Config(format!("bad email.from_address: {e}")))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| CareflowError::Config(format!("bad email.smtp_host: {e}")))?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl NotificationSender for SmtpNotifier {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        correlation_id: &str,
    ) -> bool {
        let mailbox = match to.parse::<Mailbox>() {
            Ok(mb) => mb,
            Err(e) => {
                warn!(correlation_id, error = %e, "invalid recipient address, email skipped");
                return false;
            }
        };

        let message = match Message::builder()
            .from(self.from.clone())
            .to(mailbox)
            .subject(subject)
            .body(body.to_string())
        {
            Ok(msg) => msg,
            Err(e) => {
                warn!(correlation_id, error = %e, "failed to build email, skipped");
                return false;
            }
        };

        match self.transport.send(message).await {
            Ok(_) => {
                info!(correlation_id, subject, "confirmation email sent");
                true
            }
            Err(e) => {
                warn!(correlation_id, error = %e, "email delivery failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            host: "localhost".into(),
            port: 2525,
            username: "user".into(),
            password: "pass".into(),
            from_address: "Careflow <noreply@careflow.example>".into(),
        }
    }

    #[test]
    fn builds_with_valid_settings() {
        assert!(SmtpNotifier::new(&settings()).is_ok());
    }

    #[test]
    fn rejects_malformed_from_address() {
        let mut bad = settings();
        bad.from_address = "not an address".into();
        assert!(matches!(
            SmtpNotifier::new(&bad),
            Err(CareflowError::Config(_))
        ));
    }

    #[tokio::test]
    async fn invalid_recipient_returns_false_without_sending() {
        let notifier = SmtpNotifier::new(&settings()).unwrap();
        let sent = notifier
            .send_email("not an address", "subject", "body", "corr-1")
            .await;
        assert!(!sent);
    }
}
