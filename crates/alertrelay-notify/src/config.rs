use crate::render::RenderConfig;
use alertrelay_common::types::SeverityPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub const DINGTALK_API_BASE: &str = "https://oapi.dingtalk.com/robot/send?access_token=";
pub const WECOM_API_BASE: &str = "https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=";
pub const FEISHU_API_BASE: &str = "https://open.feishu.cn/open-apis/bot/v2/hook/";

/// Everything the dispatcher and its channels need, passed in at
/// construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    /// Channel name → robot API base URL. Unlisted channels use the public
    /// endpoints.
    #[serde(default)]
    pub webhook_bases: HashMap<String, String>,
    #[serde(default)]
    pub robot: RobotConfig,
    /// Historical channel name → canonical channel name.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub severity: SeverityPolicy,
    #[serde(default)]
    pub callback: Option<CallbackConfig>,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl NotifyConfig {
    pub fn webhook_base(&self, channel: &str) -> Option<String> {
        if let Some(base) = self.webhook_bases.get(channel) {
            return Some(base.clone());
        }
        match channel {
            "dingtalk" => Some(DINGTALK_API_BASE.to_string()),
            "wecom" => Some(WECOM_API_BASE.to_string()),
            "feishu" => Some(FEISHU_API_BASE.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_per_channel_timeout_secs")]
    pub per_channel_timeout_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Attempts per recipient, including the first. `1` disables retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            per_channel_timeout_secs: default_per_channel_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl DeliveryConfig {
    pub fn per_channel_timeout(&self) -> Duration {
        Duration::from_secs(self.per_channel_timeout_secs)
    }
}

fn default_per_channel_timeout_secs() -> u64 {
    5
}

fn default_max_concurrency() -> usize {
    8
}

fn default_max_attempts() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Implicit TLS (SMTPS).
    #[default]
    Tls,
    StartTls,
    /// Plaintext. Only for local relays and tests.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from: String,
    #[serde(default)]
    pub security: SmtpSecurity,
}

fn default_smtp_port() -> u16 {
    465
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Value of the `isAtAll` flag sent to robots that support it.
    #[serde(default)]
    pub at_all: bool,
    /// DingTalk "additional signature" secret; requests are signed when set.
    #[serde(default)]
    pub dingtalk_secret: Option<String>,
    /// Channel name → key in each user's `contacts` map holding the token.
    #[serde(default)]
    pub contact_keys: HashMap<String, String>,
}

impl RobotConfig {
    pub fn contact_key(&self, channel: &str) -> String {
        self.contact_keys
            .get(channel)
            .cloned()
            .unwrap_or_else(|| format!("{channel}_robot_token"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    pub url: String,
    #[serde(default)]
    pub basic_auth_user: Option<String>,
    #[serde(default)]
    pub basic_auth_pass: Option<String>,
    /// Flat `[name, value, name, value, ...]` list; ignored unless even.
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default = "default_callback_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_callback_timeout_secs() -> u64 {
    5
}
