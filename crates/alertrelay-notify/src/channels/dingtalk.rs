use crate::channels::robot::{token_url, RobotClient};
use crate::config::NotifyConfig;
use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::recipients::{RecipientKind, RecipientSet};
use crate::{Message, NotificationChannel, SendResponse};
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub struct DingTalkChannel {
    robot: RobotClient,
    api_base: String,
    contact_key: String,
    secret: Option<String>,
    at_all: bool,
}

impl DingTalkChannel {
    pub fn new(
        api_base: &str,
        contact_key: &str,
        secret: Option<String>,
        at_all: bool,
        max_attempts: u32,
    ) -> Self {
        Self {
            robot: RobotClient::new("dingtalk", max_attempts),
            api_base: api_base.to_string(),
            contact_key: contact_key.to_string(),
            secret,
            at_all,
        }
    }

    /// Appends `&timestamp=..&sign=..` when a signing secret is configured.
    pub fn sign_url(&self, base_url: &str) -> Result<String> {
        let Some(secret) = &self.secret else {
            return Ok(base_url.to_string());
        };

        let timestamp = chrono::Utc::now().timestamp_millis();
        let string_to_sign = format!("{}\n{}", timestamp, secret);

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| NotifyError::InvalidConfig(format!("dingtalk secret: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        let sign = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!(
            "{}&timestamp={}&sign={}",
            base_url,
            timestamp,
            urlencoding::encode(&sign)
        ))
    }

    pub fn build_payload(&self, message: &Message, mentions: &[String]) -> Value {
        let mut text = message.body.clone();
        if !mentions.is_empty() {
            let at: Vec<String> = mentions.iter().map(|p| format!("@{p}")).collect();
            text.push(' ');
            text.push_str(&at.join(" "));
        }
        serde_json::json!({
            "msgtype": "markdown",
            "markdown": {
                "title": message.title,
                "text": text,
            },
            "at": {
                "atMobiles": mentions,
                "isAtAll": self.at_all,
            }
        })
    }
}

#[async_trait]
impl NotificationChannel for DingTalkChannel {
    async fn send(&self, message: &Message, recipients: &RecipientSet) -> Result<SendResponse> {
        let payload = self.build_payload(message, recipients.mentions());
        // Signatures embed the current time, so each URL is signed right before use.
        Ok(self
            .robot
            .deliver(recipients.targets(), &payload, |t| {
                self.sign_url(&token_url(&self.api_base, t))
            })
            .await)
    }

    fn channel_type(&self) -> &str {
        "dingtalk"
    }

    fn recipient_kind(&self) -> RecipientKind {
        RecipientKind::Contact {
            key: self.contact_key.clone(),
            mention_phones: true,
        }
    }
}

// Plugin

pub struct DingTalkPlugin;

impl ChannelPlugin for DingTalkPlugin {
    fn name(&self) -> &str {
        "dingtalk"
    }

    fn validate_config(&self, config: &NotifyConfig) -> Result<()> {
        match config.webhook_base("dingtalk") {
            Some(base) if !base.trim().is_empty() => Ok(()),
            _ => Err(NotifyError::InvalidConfig("dingtalk webhook base is empty".to_string())),
        }
    }

    fn create_channel(&self, config: &NotifyConfig) -> Result<Box<dyn NotificationChannel>> {
        let base = config.webhook_base("dingtalk").unwrap_or_default();
        Ok(Box::new(DingTalkChannel::new(
            &base,
            &config.robot.contact_key("dingtalk"),
            config.robot.dingtalk_secret.clone(),
            config.robot.at_all,
            config.delivery.max_attempts,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn query(url: &str) -> HashMap<String, String> {
        let (_, q) = url.split_once('?').unwrap();
        q.split('&')
            .filter_map(|kv| kv.split_once('='))
            .map(|(k, v)| (k.to_string(), urlencoding::decode(v).unwrap().into_owned()))
            .collect()
    }

    #[test]
    fn sign_url_appends_timestamp_and_signature() {
        let secret = "SEC0123456789";
        let channel = DingTalkChannel::new("https://x/send?access_token=", "k", Some(secret.into()), false, 1);
        let signed = channel.sign_url("https://x/send?access_token=T1").unwrap();
        let params = query(&signed);

        assert_eq!(params["access_token"], "T1");
        let timestamp = &params["timestamp"];
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}\n{secret}").as_bytes());
        let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        assert_eq!(params["sign"], expected);
    }

    #[test]
    fn sign_url_without_secret_is_unchanged() {
        let channel = DingTalkChannel::new("https://x/send?access_token=", "k", None, false, 1);
        assert_eq!(channel.sign_url("https://x/send?access_token=T1").unwrap(), "https://x/send?access_token=T1");
    }
}
