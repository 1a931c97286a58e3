use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Outbound mail delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: &str,
    ) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?.port(port);

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }

        Ok(Self {
            transport: builder.build(),
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<()> {
        let message = Message::builder()
            .from(self.from.parse()?)
            .to(email.to.parse()?)
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.text)?;
        self.transport.send(message).await?;
        info!(to = %email.to, "email sent");
        Ok(())
    }
}

/// Used when no SMTP host is configured. The body carries the reset link,
/// so it is only printed at debug level.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<()> {
        info!(to = %email.to, subject = %email.subject, "no SMTP host configured; email not delivered");
        debug!(body = %email.text, "undelivered email body");
        Ok(())
    }
}

/// SMTP when `MAIL_HOST` is set, otherwise [`LogMailer`].
pub fn from_config(cfg: &MailConfig) -> Result<Arc<dyn Mailer>> {
    match cfg.host.as_deref() {
        Some(host) => Ok(Arc::new(SmtpMailer::new(
            host,
            cfg.port,
            cfg.username.as_deref(),
            cfg.password.as_deref(),
            &cfg.from,
        )?)),
        None => Ok(Arc::new(LogMailer)),
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps every email for inspection.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<Email>>,
    }

    impl RecordingMailer {
        pub fn last(&self) -> Option<Email> {
            self.sent.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: Email) -> Result<()> {
            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }

    pub struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _email: Email) -> Result<()> {
            anyhow::bail!("smtp connection refused")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_accepts_everything() {
        let email = Email {
            to: "ann@example.com".into(),
            subject: "hi".into(),
            text: "body".into(),
        };
        assert!(LogMailer.send(email).await.is_ok());
    }

    #[test]
    fn without_host_falls_back_to_logging() {
        let cfg = MailConfig {
            host: None,
            port: 587,
            username: None,
            password: None,
            from: "Tourbook <no-reply@tourbook.local>".into(),
        };
        assert!(from_config(&cfg).is_ok());
    }

    #[tokio::test]
    async fn smtp_mailer_rejects_bad_recipient_before_connecting() {
        let mailer = SmtpMailer::new("localhost", 2525, None, None, "Tourbook <no-reply@tourbook.local>")
            .unwrap();
        let email = Email {
            to: "not an address".into(),
            subject: "s".into(),
            text: "t".into(),
        };
        assert!(mailer.send(email).await.is_err());
    }
}
