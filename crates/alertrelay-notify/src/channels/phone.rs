//! SMS and voice placeholders. No provider is wired up yet: the channels
//! record which numbers would have been reached and report success.

use crate::config::NotifyConfig;
use crate::error::Result;
use crate::plugin::ChannelPlugin;
use crate::recipients::{RecipientKind, RecipientSet};
use crate::{Message, NotificationChannel, RecipientResult, SendResponse};
use async_trait::async_trait;

pub struct PhoneStubChannel {
    name: &'static str,
}

impl PhoneStubChannel {
    pub fn sms() -> Self {
        Self { name: "sms" }
    }

    pub fn voice() -> Self {
        Self { name: "voice" }
    }
}

#[async_trait]
impl NotificationChannel for PhoneStubChannel {
    async fn send(&self, message: &Message, recipients: &RecipientSet) -> Result<SendResponse> {
        if recipients.is_empty() {
            return Ok(SendResponse::skipped("no phone numbers resolved"));
        }
        tracing::info!(
            channel = self.name,
            phones = ?recipients.targets(),
            title = %message.title,
            "No provider configured, message not sent"
        );
        Ok(SendResponse {
            recipient_results: recipients
                .targets()
                .iter()
                .map(RecipientResult::success)
                .collect(),
            note: Some(format!("{} is a stub: phones logged only", self.name)),
            ..Default::default()
        })
    }

    fn channel_type(&self) -> &str {
        self.name
    }

    fn recipient_kind(&self) -> RecipientKind {
        RecipientKind::Phone
    }
}

// Plugins

pub struct SmsPlugin;

impl ChannelPlugin for SmsPlugin {
    fn name(&self) -> &str {
        "sms"
    }

    fn validate_config(&self, _config: &NotifyConfig) -> Result<()> {
        Ok(())
    }

    fn create_channel(&self, _config: &NotifyConfig) -> Result<Box<dyn NotificationChannel>> {
        Ok(Box::new(PhoneStubChannel::sms()))
    }
}

pub struct VoicePlugin;

impl ChannelPlugin for VoicePlugin {
    fn name(&self) -> &str {
        "voice"
    }

    fn validate_config(&self, _config: &NotifyConfig) -> Result<()> {
        Ok(())
    }

    fn create_channel(&self, _config: &NotifyConfig) -> Result<Box<dyn NotificationChannel>> {
        Ok(Box::new(PhoneStubChannel::voice()))
    }
}
