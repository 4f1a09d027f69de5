use crate::config::NotifyConfig;
use crate::error::Result;
use crate::NotificationChannel;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory for [`NotificationChannel`] instances.
///
/// Each plugin validates the part of [`NotifyConfig`] its channel needs and
/// builds the channel once at startup.
pub trait ChannelPlugin: Send + Sync {
    /// Canonical channel name (e.g., `"email"`, `"dingtalk"`).
    fn name(&self) -> &str;

    fn validate_config(&self, config: &NotifyConfig) -> Result<()>;

    fn create_channel(&self, config: &NotifyConfig) -> Result<Box<dyn NotificationChannel>>;
}

/// Plugins for every built-in channel.
pub fn builtin_plugins() -> Vec<Box<dyn ChannelPlugin>> {
    vec![
        Box::new(crate::channels::email::EmailPlugin),
        Box::new(crate::channels::dingtalk::DingTalkPlugin),
        Box::new(crate::channels::wecom::WecomPlugin),
        Box::new(crate::channels::feishu::FeishuPlugin),
        Box::new(crate::channels::phone::SmsPlugin),
        Box::new(crate::channels::phone::VoicePlugin),
    ]
}

/// Outcome of looking a requested channel name up in the registry.
pub enum Lookup {
    Found(Arc<dyn NotificationChannel>),
    /// Known channel whose configuration was rejected at startup.
    Disabled(String),
    Unknown,
}

/// Maps channel names to live handlers. Read-only once built, so it is
/// shared across dispatch tasks behind an `Arc`.
///
/// # Examples
///
/// ```
/// use alertrelay_notify::config::NotifyConfig;
/// use alertrelay_notify::plugin::ChannelRegistry;
///
/// let registry = ChannelRegistry::from_config(&NotifyConfig::default());
/// assert!(registry.has_channel("dingtalk"));
/// assert!(registry.has_channel("sms"));
/// assert_eq!(registry.canonical_name(" WeiXin "), "wecom");
/// assert!(!registry.has_channel("pager"));
/// ```
#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, Arc<dyn NotificationChannel>>,
    disabled: HashMap<String, String>,
    aliases: HashMap<String, String>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `channel` under its own `channel_type()`.
    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        let name = channel.channel_type().to_lowercase();
        self.disabled.remove(&name);
        self.channels.insert(name, channel);
    }

    /// Makes `alias` resolve to `canonical`.
    pub fn alias(&mut self, alias: &str, canonical: &str) {
        self.aliases
            .insert(alias.trim().to_lowercase(), canonical.trim().to_lowercase());
    }

    /// Builds every built-in channel from `config`. A channel whose
    /// configuration is rejected stays registered as disabled, so requests
    /// for it fail with the reason instead of looking unknown.
    pub fn from_config(config: &NotifyConfig) -> Self {
        let mut registry = Self::new();
        for plugin in builtin_plugins() {
            let name = plugin.name().to_string();
            let built = plugin
                .validate_config(config)
                .and_then(|()| plugin.create_channel(config));
            match built {
                Ok(channel) => {
                    tracing::debug!(channel = %name, "Channel registered");
                    registry.register(Arc::from(channel));
                }
                Err(e) => {
                    tracing::warn!(channel = %name, error = %e, "Channel disabled");
                    registry.disabled.insert(name, e.to_string());
                }
            }
        }
        registry.alias("weixin", "wecom");
        registry.alias("wechat", "wecom");
        registry.alias("lark", "feishu");
        for (alias, canonical) in &config.aliases {
            registry.alias(alias, canonical);
        }
        registry
    }

    /// Trims, lowercases and resolves aliases.
    pub fn canonical_name(&self, requested: &str) -> String {
        let name = requested.trim().to_lowercase();
        match self.aliases.get(&name) {
            Some(canonical) => canonical.clone(),
            None => name,
        }
    }

    /// `name` must already be canonical.
    pub fn lookup(&self, name: &str) -> Lookup {
        if let Some(channel) = self.channels.get(name) {
            return Lookup::Found(Arc::clone(channel));
        }
        match self.disabled.get(name) {
            Some(reason) => Lookup::Disabled(reason.clone()),
            None => Lookup::Unknown,
        }
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(&self.canonical_name(name))
    }

    /// Registered channel names, sorted.
    pub fn channel_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
