//! Alert notification dispatch with pluggable channel support.
//!
//! A decoded [`Notice`](alertrelay_common::types::Notice) is persisted,
//! rendered, and delivered to every channel it requests through
//! [`NotificationChannel`] implementations registered in a
//! [`plugin::ChannelRegistry`]. Built-in channels are email (SMTP), the
//! DingTalk, WeCom and Feishu group robots, and SMS/voice stubs.
//!
//! Each channel runs in its own task with its own timeout; one channel's
//! failure is recorded as a [`DeliveryResult`] and never affects another.

pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod plugin;
pub mod recipients;
pub mod render;
pub mod utils;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use recipients::{RecipientKind, RecipientSet};
use serde::Serialize;
use std::path::PathBuf;

/// Channel-ready content produced by the renderer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Short headline, e.g. `"Triggered - cpu too high"`.
    pub title: String,
    /// Email subject line.
    pub subject: String,
    pub body: String,
    /// Whether `body` is HTML (template mode) rather than plain text.
    pub html: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    Success,
    Failed,
}

/// Outcome for a single target (address, phone, or redacted robot token).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipientResult {
    pub recipient: String,
    pub status: RecipientStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecipientResult {
    pub fn success(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            status: RecipientStatus::Success,
            error: None,
        }
    }

    pub fn failed(recipient: impl Into<String>, error: impl ToString) -> Self {
        Self {
            recipient: recipient.into(),
            status: RecipientStatus::Failed,
            error: Some(error.to_string()),
        }
    }
}

/// What a channel reports back after a send.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendResponse {
    pub recipient_results: Vec<RecipientResult>,
    /// Set when the channel deliberately did nothing (no recipients).
    pub skipped: Option<String>,
    /// Free-form note surfaced as the delivery reason.
    pub note: Option<String>,
    pub retry_count: u32,
}

impl SendResponse {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// A notification delivery channel that sends rendered content to an
/// external service (SMTP relay, robot webhook, ...).
///
/// Implementations are created by the corresponding [`plugin::ChannelPlugin`]
/// and registered in the [`plugin::ChannelRegistry`]. They hold no
/// per-dispatch state.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Delivers `message` to every target in `recipients`.
    ///
    /// An empty recipient set must not cause any outbound I/O.
    ///
    /// # Errors
    ///
    /// Returns an error only when the channel as a whole cannot proceed;
    /// per-recipient failures are reported in the response.
    async fn send(&self, message: &Message, recipients: &RecipientSet) -> error::Result<SendResponse>;

    /// Returns the channel type name (e.g. `"email"`, `"dingtalk"`).
    fn channel_type(&self) -> &str;

    /// Describes which targets the recipient resolver should extract.
    fn recipient_kind(&self) -> RecipientKind;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Every recipient succeeded (or the channel is a no-op stub).
    Success,
    /// Some recipients succeeded, some failed.
    Partial,
    Failed,
    /// Nothing to deliver to.
    Skipped,
    /// No handler is registered under the requested name.
    Unknown,
    TimedOut,
}

/// Per-channel outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryResult {
    pub channel: String,
    pub status: DeliveryStatus,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<RecipientResult>,
    pub retries: u32,
}

impl DeliveryResult {
    fn bare(channel: &str, status: DeliveryStatus, reason: Option<String>) -> Self {
        Self {
            channel: channel.to_string(),
            status,
            succeeded: 0,
            failed: 0,
            reason,
            recipients: Vec::new(),
            retries: 0,
        }
    }

    pub fn from_response(channel: &str, response: SendResponse) -> Self {
        if let Some(reason) = response.skipped {
            return Self::bare(channel, DeliveryStatus::Skipped, Some(reason));
        }
        let succeeded = response
            .recipient_results
            .iter()
            .filter(|r| r.status == RecipientStatus::Success)
            .count();
        let failed = response.recipient_results.len() - succeeded;
        let status = match (succeeded, failed) {
            (_, 0) => DeliveryStatus::Success,
            (0, _) => DeliveryStatus::Failed,
            _ => DeliveryStatus::Partial,
        };
        let reason = response.note.or_else(|| {
            response
                .recipient_results
                .iter()
                .find_map(|r| r.error.clone())
        });
        Self {
            channel: channel.to_string(),
            status,
            succeeded,
            failed,
            reason,
            recipients: response.recipient_results,
            retries: response.retry_count,
        }
    }

    pub fn failed(channel: &str, reason: impl ToString) -> Self {
        Self::bare(channel, DeliveryStatus::Failed, Some(reason.to_string()))
    }

    pub fn unknown(channel: &str) -> Self {
        Self::bare(channel, DeliveryStatus::Unknown, Some(format!("channel '{channel}' not found")))
    }

    pub fn timed_out(channel: &str, limit: std::time::Duration) -> Self {
        Self::bare(
            channel,
            DeliveryStatus::TimedOut,
            Some(format!("no response within {}ms", limit.as_millis())),
        )
    }

    pub fn is_success(&self) -> bool {
        self.status == DeliveryStatus::Success
    }
}

/// Everything one dispatch did, in request order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub event_id: String,
    pub rule_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted: Option<PathBuf>,
    pub results: Vec<DeliveryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback: Option<DeliveryResult>,
}

impl DispatchReport {
    pub fn count(&self, status: DeliveryStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// One-line outcome summary, e.g. `"3 channel(s): 1 success, 1 failed, 1 unknown"`.
    pub fn summary(&self) -> String {
        let parts: Vec<String> = [
            (DeliveryStatus::Success, "success"),
            (DeliveryStatus::Partial, "partial"),
            (DeliveryStatus::Failed, "failed"),
            (DeliveryStatus::TimedOut, "timed out"),
            (DeliveryStatus::Skipped, "skipped"),
            (DeliveryStatus::Unknown, "unknown"),
        ]
        .into_iter()
        .filter_map(|(status, label)| match self.count(status) {
            0 => None,
            n => Some(format!("{n} {label}")),
        })
        .collect();
        if parts.is_empty() {
            format!("{} channel(s)", self.results.len())
        } else {
            format!("{} channel(s): {}", self.results.len(), parts.join(", "))
        }
    }
}
