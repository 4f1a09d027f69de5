use crate::error::{PayloadError, Result};
use chrono::{Local, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Maps textual severity labels onto numeric priorities.
///
/// Upstream engines disagree on whether an event carries a numeric
/// `priority` or a `severity` label, so the mapping is policy rather than a
/// constant.
///
/// # Examples
///
/// ```
/// use alertrelay_common::types::SeverityPolicy;
///
/// let policy = SeverityPolicy::default();
/// assert_eq!(policy.priority_for("critical"), 1);
/// assert_eq!(policy.priority_for("Warning"), 3);
/// assert_eq!(policy.priority_for("unheard-of"), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityPolicy {
    #[serde(default = "default_severity_labels")]
    pub labels: HashMap<String, i64>,
    #[serde(default = "default_priority")]
    pub default_priority: i64,
}

fn default_severity_labels() -> HashMap<String, i64> {
    HashMap::from([
        ("critical".to_string(), 1),
        ("warning".to_string(), 3),
        ("info".to_string(), 3),
    ])
}

fn default_priority() -> i64 {
    2
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        Self {
            labels: default_severity_labels(),
            default_priority: default_priority(),
        }
    }
}

impl SeverityPolicy {
    pub fn priority_for(&self, label: &str) -> i64 {
        self.labels
            .get(&label.trim().to_lowercase())
            .copied()
            .unwrap_or(self.default_priority)
    }
}

/// A user the alert should reach, as supplied by the upstream engine.
///
/// `contacts` holds per-channel credentials such as
/// `dingtalk_robot_token`. A "virtual user" whose only purpose is to carry a
/// group robot token is common.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipientUser {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "string_contacts")]
    pub contacts: BTreeMap<String, String>,
}

impl RecipientUser {
    /// Returns the credential stored under `key`, or `""` when absent.
    pub fn contact(&self, key: &str) -> &str {
        self.contacts.get(key).map(String::as_str).unwrap_or("")
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Ids are informational only, so a string or null id must not reject the payload.
fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

// Contacts arrive as a free-form JSON object; only string values are credentials.
fn string_contacts<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect())
}

/// One alert occurrence. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub event_id: String,
    pub rule_id: String,
    pub rule_name: String,
    /// Epoch seconds.
    pub trigger_time: i64,
    pub is_recovery: bool,
    pub priority: i64,
    pub readable_expression: String,
    pub current_value: String,
    pub tags: Vec<String>,
    /// Channel names in request order, as supplied (not yet deduplicated).
    pub requested_channels: Vec<String>,
    pub users: Vec<RecipientUser>,
}

/// A decoded payload: event, pre-rendered templates, and the original JSON.
#[derive(Debug, Clone)]
pub struct Notice {
    pub event: AlertEvent,
    pub tpls: HashMap<String, String>,
    /// The complete document as received, including fields the dispatcher
    /// does not interpret.
    pub raw: Value,
}

#[derive(Deserialize)]
struct WireNotice {
    event: Option<WireEvent>,
    #[serde(default)]
    tpls: Option<HashMap<String, Value>>,
    #[serde(default)]
    rule: Option<WireRule>,
    #[serde(default)]
    users: Option<Vec<RecipientUser>>,
}

#[derive(Deserialize)]
struct WireRule {
    id: Option<Value>,
}

#[derive(Deserialize)]
struct WireEvent {
    id: Option<Value>,
    rule_id: Option<Value>,
    rule_name: Option<String>,
    trigger_time: Option<Value>,
    #[serde(alias = "is_recovered")]
    is_recovery: Option<Value>,
    priority: Option<Value>,
    severity: Option<Value>,
    readable_expression: Option<String>,
    #[serde(alias = "values", alias = "trigger_value")]
    current_value: Option<Value>,
    tags: Option<Value>,
    notify_channels: Option<Value>,
    #[serde(alias = "notify_user_objs", alias = "users")]
    notify_users_obj: Option<Vec<RecipientUser>>,
}

impl Notice {
    /// Decodes a payload using the default [`SeverityPolicy`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Self::parse(bytes, &SeverityPolicy::default())
    }

    pub fn parse(bytes: &[u8], policy: &SeverityPolicy) -> Result<Self> {
        let raw: Value = serde_json::from_slice(bytes)?;
        Self::from_value(raw, policy)
    }

    pub fn from_value(raw: Value, policy: &SeverityPolicy) -> Result<Self> {
        if !raw.is_object() {
            return Err(PayloadError::InvalidField {
                field: "payload",
                reason: "top level must be a JSON object".to_string(),
            });
        }
        let wire: WireNotice = serde_json::from_value(raw.clone())?;
        let ev = wire.event.ok_or(PayloadError::MissingField("event"))?;

        let event_id = ev
            .id
            .as_ref()
            .and_then(scalar_string)
            .ok_or(PayloadError::MissingField("event.id"))?;

        let rule_id = ev
            .rule_id
            .as_ref()
            .and_then(scalar_string)
            .or_else(|| wire.rule.as_ref().and_then(|r| r.id.as_ref()).and_then(scalar_string))
            .ok_or(PayloadError::MissingField("event.rule_id"))?;

        let trigger_time = match ev.trigger_time {
            None | Some(Value::Null) => return Err(PayloadError::MissingField("event.trigger_time")),
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| PayloadError::InvalidField {
                field: "event.trigger_time",
                reason: format!("expected integer epoch seconds, got {n}"),
            })?,
            Some(other) => {
                return Err(PayloadError::InvalidField {
                    field: "event.trigger_time",
                    reason: format!("expected integer epoch seconds, got {other}"),
                })
            }
        };

        let requested_channels = match ev.notify_channels {
            None => return Err(PayloadError::MissingField("event.notify_channels")),
            Some(v) => parse_channel_list(&v)?,
        };

        let priority = match (ev.priority.as_ref(), ev.severity.as_ref()) {
            (Some(Value::Number(n)), _) => n.as_i64().unwrap_or(policy.default_priority),
            (_, Some(Value::Number(n))) => n.as_i64().unwrap_or(policy.default_priority),
            (_, Some(Value::String(label))) => policy.priority_for(label),
            _ => policy.default_priority,
        };

        let users = ev
            .notify_users_obj
            .filter(|u| !u.is_empty())
            .or(wire.users)
            .unwrap_or_default();

        let tpls = wire
            .tpls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) => Some((k, s)),
                _ => None,
            })
            .collect();

        let event = AlertEvent {
            event_id,
            rule_id,
            rule_name: ev.rule_name.unwrap_or_default(),
            trigger_time,
            is_recovery: ev.is_recovery.as_ref().map(truthy).unwrap_or(false),
            priority,
            readable_expression: ev.readable_expression.unwrap_or_default(),
            current_value: ev.current_value.as_ref().and_then(scalar_string).unwrap_or_default(),
            tags: ev.tags.as_ref().map(parse_tags).unwrap_or_default(),
            requested_channels,
            users,
        };

        Ok(Self { event, tpls, raw })
    }

    /// Looks up a pre-rendered template by key.
    pub fn template(&self, key: &str) -> Option<&str> {
        self.tpls.get(key).map(String::as_str)
    }

    pub fn has_templates(&self) -> bool {
        !self.tpls.is_empty()
    }

    /// The `event` object of the raw payload, for consumers that want the
    /// event exactly as the upstream engine produced it.
    pub fn raw_event(&self) -> &Value {
        self.raw.get("event").unwrap_or(&Value::Null)
    }
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim(), "1" | "true" | "True" | "TRUE"),
        _ => false,
    }
}

/// Splits a `notify_channels` value into channel names, keeping request
/// order and any duplicates.
///
/// # Examples
///
/// ```
/// use alertrelay_common::types::parse_channel_list;
/// use serde_json::json;
///
/// let list = parse_channel_list(&json!(" email  dingtalk email")).unwrap();
/// assert_eq!(list, vec!["email", "dingtalk", "email"]);
/// assert!(parse_channel_list(&json!("")).unwrap().is_empty());
/// ```
pub fn parse_channel_list(v: &Value) -> Result<Vec<String>> {
    match v {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(s.split_whitespace().map(str::to_string).collect()),
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                match item {
                    Value::String(s) => out.extend(s.split_whitespace().map(str::to_string)),
                    other => {
                        return Err(PayloadError::InvalidField {
                            field: "event.notify_channels",
                            reason: format!("channel names must be strings, got {other}"),
                        })
                    }
                }
            }
            Ok(out)
        }
        other => Err(PayloadError::InvalidField {
            field: "event.notify_channels",
            reason: format!("expected string or array, got {other}"),
        }),
    }
}

fn parse_tags(v: &Value) -> Vec<String> {
    match v {
        Value::String(s) => s
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        _ => Vec::new(),
    }
}

/// Formats epoch seconds as `YYYY-MM-DD HH:MM:SS` in the given zone.
///
/// Out-of-range timestamps fall back to the raw number.
///
/// # Examples
///
/// ```
/// use alertrelay_common::types::format_epoch_in;
///
/// assert_eq!(format_epoch_in(1625213114, &chrono::Utc), "2021-07-02 08:05:14");
/// ```
pub fn format_epoch_in<Tz: TimeZone>(ts: i64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match tz.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

/// Formats epoch seconds in the process's local time zone.
pub fn format_trigger_time(ts: i64) -> String {
    format_epoch_in(ts, &Local)
}

/// Joins tags with `sep`, preserving order.
pub fn format_tags(tags: &[String], sep: &str) -> String {
    tags.join(sep)
}
