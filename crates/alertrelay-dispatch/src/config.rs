use alertrelay_notify::config::NotifyConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/alertrelay.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Directory receiving one JSON file per dispatched payload.
    #[serde(default = "default_persist_dir")]
    pub persist_dir: PathBuf,
    #[serde(default = "default_persist_enabled")]
    pub persist_enabled: bool,
    #[serde(flatten)]
    pub notify: NotifyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            persist_dir: default_persist_dir(),
            persist_enabled: default_persist_enabled(),
            notify: NotifyConfig::default(),
        }
    }
}

fn default_persist_dir() -> PathBuf {
    PathBuf::from(".payloads")
}

fn default_persist_enabled() -> bool {
    true
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Loads `path` when given. Without one, the default location is used
    /// if it exists and built-in defaults otherwise.
    pub fn resolve(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertrelay_notify::config::SmtpSecurity;
    use alertrelay_notify::render::RenderStrategy;

    #[test]
    fn empty_file_yields_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.persist_dir, PathBuf::from(".payloads"));
        assert!(config.persist_enabled);
        assert_eq!(config.notify.delivery.per_channel_timeout_secs, 5);
        assert_eq!(config.notify.delivery.max_attempts, 1);
        assert!(config.notify.smtp.is_none());
        assert_eq!(config.notify.render.strategy, RenderStrategy::Auto);
    }

    #[test]
    fn parses_full_config() {
        let config = AppConfig::parse(
            r#"
persist_dir = "/var/lib/alertrelay"

[delivery]
per_channel_timeout_secs = 3
max_concurrency = 2
max_attempts = 3

[smtp]
host = "smtp.example.com"
username = "alerts"
password = "secret"
from = "alerts@example.com"
security = "starttls"

[webhook_bases]
dingtalk = "http://127.0.0.1:8080/send?access_token="

[robot]
at_all = true
dingtalk_secret = "SEC123"

[aliases]
ding = "dingtalk"

[render]
strategy = "text"
tag_separator = ", "

[severity]
default_priority = 3
labels = { critical = 1, fatal = 1 }

[callback]
url = "http://127.0.0.1:9000/cb"
headers = ["X-Token", "abc"]
"#,
        )
        .unwrap();

        assert_eq!(config.persist_dir, PathBuf::from("/var/lib/alertrelay"));
        assert_eq!(config.notify.delivery.max_concurrency, 2);
        let smtp = config.notify.smtp.as_ref().unwrap();
        assert_eq!(smtp.port, 465);
        assert_eq!(smtp.security, SmtpSecurity::StartTls);
        assert_eq!(
            config.notify.webhook_base("dingtalk").as_deref(),
            Some("http://127.0.0.1:8080/send?access_token=")
        );
        assert!(config.notify.webhook_base("wecom").unwrap().starts_with("https://qyapi.weixin.qq.com"));
        assert!(config.notify.robot.at_all);
        assert_eq!(config.notify.render.strategy, RenderStrategy::Text);
        assert_eq!(config.notify.severity.priority_for("fatal"), 1);
        assert_eq!(config.notify.callback.as_ref().unwrap().timeout_secs, 5);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(AppConfig::resolve(Some("/nonexistent/alertrelay.toml")).is_err());
    }
}
