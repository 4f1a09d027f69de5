use crate::channels::robot::{token_url, RobotClient};
use crate::config::NotifyConfig;
use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::recipients::{RecipientKind, RecipientSet};
use crate::{Message, NotificationChannel, SendResponse};
use async_trait::async_trait;
use serde_json::Value;

/// Feishu (Lark) custom bot. Sends plain text; the token is the last path
/// segment of the hook URL.
pub struct FeishuChannel {
    robot: RobotClient,
    api_base: String,
    contact_key: String,
    at_all: bool,
}

impl FeishuChannel {
    pub fn new(api_base: &str, contact_key: &str, at_all: bool, max_attempts: u32) -> Self {
        Self {
            robot: RobotClient::new("feishu", max_attempts),
            api_base: api_base.to_string(),
            contact_key: contact_key.to_string(),
            at_all,
        }
    }

    pub fn build_payload(&self, message: &Message, mentions: &[String]) -> Value {
        serde_json::json!({
            "msg_type": "text",
            "content": {
                "text": message.body,
            },
            "at": {
                "atMobiles": mentions,
                "isAtAll": self.at_all,
            }
        })
    }
}

#[async_trait]
impl NotificationChannel for FeishuChannel {
    async fn send(&self, message: &Message, recipients: &RecipientSet) -> Result<SendResponse> {
        let payload = self.build_payload(message, recipients.mentions());
        Ok(self
            .robot
            .deliver(recipients.targets(), &payload, |t| Ok(token_url(&self.api_base, t)))
            .await)
    }

    fn channel_type(&self) -> &str {
        "feishu"
    }

    fn recipient_kind(&self) -> RecipientKind {
        RecipientKind::Contact {
            key: self.contact_key.clone(),
            mention_phones: true,
        }
    }
}

// Plugin

pub struct FeishuPlugin;

impl ChannelPlugin for FeishuPlugin {
    fn name(&self) -> &str {
        "feishu"
    }

    fn validate_config(&self, config: &NotifyConfig) -> Result<()> {
        match config.webhook_base("feishu") {
            Some(base) if !base.trim().is_empty() => Ok(()),
            _ => Err(NotifyError::InvalidConfig("feishu webhook base is empty".to_string())),
        }
    }

    fn create_channel(&self, config: &NotifyConfig) -> Result<Box<dyn NotificationChannel>> {
        let base = config.webhook_base("feishu").unwrap_or_default();
        Ok(Box::new(FeishuChannel::new(
            &base,
            &config.robot.contact_key("feishu"),
            config.robot.at_all,
            config.delivery.max_attempts,
        )))
    }
}
