use crate::config::{NotifyConfig, SmtpConfig, SmtpSecurity};
use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::recipients::{RecipientKind, RecipientSet};
use crate::{Message, NotificationChannel, RecipientResult, SendResponse};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::time::Duration;

/// Delivers alerts over SMTP, one message per recipient so that a bad
/// address only fails itself.
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    max_attempts: u32,
}

impl EmailChannel {
    pub fn new(smtp: &SmtpConfig, max_attempts: u32) -> Result<Self> {
        let from: Mailbox = smtp.from.parse().map_err(|e: lettre::address::AddressError| {
            NotifyError::AddressError {
                address: smtp.from.clone(),
                reason: e.to_string(),
            }
        })?;

        // The connection is opened lazily on first send.
        let mut builder = match smtp.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?,
            SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?,
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host),
        }
        .port(smtp.port);

        if let (Some(user), Some(pass)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            max_attempts: max_attempts.max(1),
        })
    }

    fn build_email(&self, to: &str, message: &Message) -> Result<lettre::Message> {
        let to: Mailbox = to.parse().map_err(|e: lettre::address::AddressError| NotifyError::AddressError {
            address: to.to_string(),
            reason: e.to_string(),
        })?;
        let content_type = if message.html {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };
        lettre::Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.as_str())
            .header(content_type)
            .body(message.body.clone())
            .map_err(|e| NotifyError::SmtpError(e.to_string()))
    }

    async fn send_with_retry(&self, recipient: &str, email: lettre::Message) -> (u32, Result<()>) {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.transport.send(email.clone()).await {
                Ok(_) => return (attempts - 1, Ok(())),
                Err(e) if attempts < self.max_attempts => {
                    tracing::warn!(
                        attempt = attempts,
                        recipient = %recipient,
                        error = %e,
                        "Email send failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempts - 1))).await;
                }
                Err(e) => return (attempts - 1, Err(e.into())),
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    async fn send(&self, message: &Message, recipients: &RecipientSet) -> Result<SendResponse> {
        if recipients.is_empty() {
            return Ok(SendResponse::skipped("no email addresses resolved"));
        }

        let mut response = SendResponse::default();
        for recipient in recipients.targets() {
            let result = match self.build_email(recipient, message) {
                Ok(email) => {
                    let (retries, result) = self.send_with_retry(recipient, email).await;
                    response.retry_count += retries;
                    result
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    tracing::info!(recipient = %recipient, "Email delivered");
                    response.recipient_results.push(RecipientResult::success(recipient));
                }
                Err(e) => {
                    tracing::error!(recipient = %recipient, error = %e, "Email delivery failed");
                    response.recipient_results.push(RecipientResult::failed(recipient, e));
                }
            }
        }
        Ok(response)
    }

    fn channel_type(&self) -> &str {
        "email"
    }

    fn recipient_kind(&self) -> RecipientKind {
        RecipientKind::Email
    }
}

// Plugin

pub struct EmailPlugin;

impl ChannelPlugin for EmailPlugin {
    fn name(&self) -> &str {
        "email"
    }

    fn validate_config(&self, config: &NotifyConfig) -> Result<()> {
        let smtp = config
            .smtp
            .as_ref()
            .ok_or_else(|| NotifyError::InvalidConfig("email requires an [smtp] section".to_string()))?;
        if smtp.host.trim().is_empty() {
            return Err(NotifyError::InvalidConfig("smtp.host is empty".to_string()));
        }
        if smtp.from.trim().is_empty() {
            return Err(NotifyError::InvalidConfig("smtp.from is empty".to_string()));
        }
        Ok(())
    }

    fn create_channel(&self, config: &NotifyConfig) -> Result<Box<dyn NotificationChannel>> {
        let smtp = config
            .smtp
            .as_ref()
            .ok_or_else(|| NotifyError::InvalidConfig("email requires an [smtp] section".to_string()))?;
        Ok(Box::new(EmailChannel::new(smtp, config.delivery.max_attempts)?))
    }
}
