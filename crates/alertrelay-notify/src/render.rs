use crate::Message;
use alertrelay_common::types::{format_epoch_in, format_tags, format_trigger_time, AlertEvent, Notice};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStrategy {
    /// `Template` when the payload carries templates, otherwise `Text`.
    #[default]
    Auto,
    /// Fixed-format summary built from event fields.
    Text,
    /// Pre-rendered content from the payload's `tpls` map.
    Template,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub strategy: RenderStrategy,
    /// Appended to the channel name to form the template key.
    #[serde(default = "default_template_suffix")]
    pub template_suffix: String,
    #[serde(default = "default_tag_separator")]
    pub tag_separator: String,
    #[serde(default = "default_alert_type")]
    pub alert_type: String,
    #[serde(default = "default_triggered_label")]
    pub triggered_label: String,
    #[serde(default = "default_recovered_label")]
    pub recovered_label: String,
    /// Priority (as a string key, e.g. `"1"`) → display label.
    #[serde(default)]
    pub priority_labels: HashMap<String, String>,
    /// Format trigger times in UTC instead of local time.
    #[serde(default)]
    pub utc: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            strategy: RenderStrategy::default(),
            template_suffix: default_template_suffix(),
            tag_separator: default_tag_separator(),
            alert_type: default_alert_type(),
            triggered_label: default_triggered_label(),
            recovered_label: default_recovered_label(),
            priority_labels: HashMap::new(),
            utc: false,
        }
    }
}

fn default_template_suffix() -> String {
    ".tpl".to_string()
}

fn default_tag_separator() -> String {
    " | ".to_string()
}

fn default_alert_type() -> String {
    "Monitoring alert".to_string()
}

fn default_triggered_label() -> String {
    "Triggered".to_string()
}

fn default_recovered_label() -> String {
    "Recovered".to_string()
}

/// Produces channel content from a notice. Never mutates the notice and
/// never fails: a missing template renders as `"<key> not found"`.
pub struct ContentRenderer {
    config: RenderConfig,
}

impl ContentRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Resolves `Auto` against the payload.
    pub fn strategy_for(&self, notice: &Notice) -> RenderStrategy {
        match self.config.strategy {
            RenderStrategy::Auto if notice.has_templates() => RenderStrategy::Template,
            RenderStrategy::Auto => RenderStrategy::Text,
            s => s,
        }
    }

    pub fn template_key(&self, name: &str) -> String {
        format!("{name}{}", self.config.template_suffix)
    }

    pub fn state_label(&self, event: &AlertEvent) -> &str {
        if event.is_recovery {
            &self.config.recovered_label
        } else {
            &self.config.triggered_label
        }
    }

    pub fn priority_label(&self, priority: i64) -> String {
        self.config
            .priority_labels
            .get(&priority.to_string())
            .cloned()
            .unwrap_or_else(|| format!("P{priority}"))
    }

    pub fn title(&self, event: &AlertEvent) -> String {
        format!("{} - {}", self.state_label(event), event.rule_name)
    }

    fn trigger_time(&self, ts: i64) -> String {
        if self.config.utc {
            format_epoch_in(ts, &chrono::Utc)
        } else {
            format_trigger_time(ts)
        }
    }

    /// Fixed-format summary in a deterministic field order.
    pub fn render_text(&self, event: &AlertEvent) -> String {
        format!(
            "Alert type: {alert_type}\n\
             Rule: {rule}\n\
             State: {state}\n\
             Priority: {priority}\n\
             Time: {time}\n\
             Expression: {expr}\n\
             Value: {value}\n\
             Tags: {tags}",
            alert_type = self.config.alert_type,
            rule = event.rule_name,
            state = self.state_label(event),
            priority = self.priority_label(event.priority),
            time = self.trigger_time(event.trigger_time),
            expr = event.readable_expression,
            value = event.current_value,
            tags = format_tags(&event.tags, &self.config.tag_separator),
        )
    }

    /// Looks up `<name><suffix>` in the payload templates.
    pub fn render_template(&self, notice: &Notice, name: &str) -> String {
        let key = self.template_key(name);
        match notice.template(&key) {
            Some(body) => body.to_string(),
            None => {
                tracing::warn!(template = %key, "Template missing from payload");
                format!("{key} not found")
            }
        }
    }

    pub fn render(&self, notice: &Notice, channel: &str) -> String {
        match self.strategy_for(notice) {
            RenderStrategy::Template => self.render_template(notice, channel),
            _ => self.render_text(&notice.event),
        }
    }

    /// Builds the full message for `channel`. `base` is content already
    /// rendered once for the whole dispatch (text strategy).
    pub fn message(&self, notice: &Notice, channel: &str, base: Option<&str>) -> Message {
        let strategy = self.strategy_for(notice);
        let body = match base {
            Some(b) => b.to_string(),
            None => self.render(notice, channel),
        };
        let title = self.title(&notice.event);
        let subject = match strategy {
            RenderStrategy::Template => {
                let key = self.template_key("subject");
                notice
                    .template(&key)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{key} not found"))
            }
            _ => title.clone(),
        };
        Message {
            title,
            subject,
            body,
            html: strategy == RenderStrategy::Template,
        }
    }
}
