use crate::channels::robot::{token_url, RobotClient};
use crate::config::NotifyConfig;
use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::recipients::{RecipientKind, RecipientSet};
use crate::{Message, NotificationChannel, SendResponse};
use async_trait::async_trait;
use serde_json::Value;

/// WeCom (WeChat Work) group robot. Each distinct robot key receives one
/// markdown message.
pub struct WecomChannel {
    robot: RobotClient,
    api_base: String,
    contact_key: String,
}

impl WecomChannel {
    pub fn new(api_base: &str, contact_key: &str, max_attempts: u32) -> Self {
        Self {
            robot: RobotClient::new("wecom", max_attempts),
            api_base: api_base.to_string(),
            contact_key: contact_key.to_string(),
        }
    }

    pub fn build_payload(message: &Message) -> Value {
        serde_json::json!({
            "msgtype": "markdown",
            "markdown": {
                "content": message.body,
            }
        })
    }
}

#[async_trait]
impl NotificationChannel for WecomChannel {
    async fn send(&self, message: &Message, recipients: &RecipientSet) -> Result<SendResponse> {
        let payload = Self::build_payload(message);
        Ok(self
            .robot
            .deliver(recipients.targets(), &payload, |t| Ok(token_url(&self.api_base, t)))
            .await)
    }

    fn channel_type(&self) -> &str {
        "wecom"
    }

    fn recipient_kind(&self) -> RecipientKind {
        RecipientKind::Contact {
            key: self.contact_key.clone(),
            mention_phones: false,
        }
    }
}

// Plugin

pub struct WecomPlugin;

impl ChannelPlugin for WecomPlugin {
    fn name(&self) -> &str {
        "wecom"
    }

    fn validate_config(&self, config: &NotifyConfig) -> Result<()> {
        match config.webhook_base("wecom") {
            Some(base) if !base.trim().is_empty() => Ok(()),
            _ => Err(NotifyError::InvalidConfig("wecom webhook base is empty".to_string())),
        }
    }

    fn create_channel(&self, config: &NotifyConfig) -> Result<Box<dyn NotificationChannel>> {
        let base = config.webhook_base("wecom").unwrap_or_default();
        Ok(Box::new(WecomChannel::new(
            &base,
            &config.robot.contact_key("wecom"),
            config.delivery.max_attempts,
        )))
    }
}
