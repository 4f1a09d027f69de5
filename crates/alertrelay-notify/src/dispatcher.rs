use crate::channels::webhook::CallbackClient;
use crate::config::NotifyConfig;
use crate::plugin::{ChannelRegistry, Lookup};
use crate::recipients::resolve;
use crate::render::{ContentRenderer, RenderStrategy};
use crate::{DeliveryResult, DispatchReport};
use alertrelay_common::types::Notice;
use alertrelay_storage::AuditSink;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

/// Runs one notice through persistence, rendering and delivery.
///
/// Channels are delivered concurrently, at most `max_concurrency` at a
/// time, each under its own timeout. Persistence runs on the blocking pool
/// alongside delivery.
pub struct Dispatcher {
    registry: Arc<ChannelRegistry>,
    renderer: Arc<ContentRenderer>,
    audit: Option<Arc<dyn AuditSink>>,
    callback: Option<Arc<CallbackClient>>,
    per_channel_timeout: Duration,
    max_concurrency: usize,
}

impl Dispatcher {
    pub fn new(registry: ChannelRegistry, renderer: ContentRenderer) -> Self {
        Self {
            registry: Arc::new(registry),
            renderer: Arc::new(renderer),
            audit: None,
            callback: None,
            per_channel_timeout: Duration::from_secs(5),
            max_concurrency: 8,
        }
    }

    /// Builds the registry, renderer and callback client from `config`.
    /// A broken callback configuration is logged and the callback disabled.
    pub fn from_config(config: &NotifyConfig) -> Self {
        let mut dispatcher = Self::new(
            ChannelRegistry::from_config(config),
            ContentRenderer::new(config.render.clone()),
        )
        .with_timeout(config.delivery.per_channel_timeout())
        .with_max_concurrency(config.delivery.max_concurrency);

        if let Some(cb) = &config.callback {
            match CallbackClient::new(cb) {
                Ok(client) => dispatcher = dispatcher.with_callback(client),
                Err(e) => tracing::warn!(error = %e, "Callback disabled"),
            }
        }
        dispatcher
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_callback(mut self, callback: CallbackClient) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn with_timeout(mut self, per_channel_timeout: Duration) -> Self {
        self.per_channel_timeout = per_channel_timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Canonical channel names in first-seen order, without duplicates or
    /// blanks.
    pub fn normalize_channels(&self, requested: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        requested
            .iter()
            .filter(|c| !c.trim().is_empty())
            .map(|c| self.registry.canonical_name(c))
            .filter(|c| seen.insert(c.clone()))
            .collect()
    }

    /// Delivers `notice` to every channel it requests. Never fails: every
    /// problem ends up in the report.
    pub async fn dispatch(&self, notice: &Notice) -> DispatchReport {
        let event = &notice.event;
        tracing::info!(
            event_id = %event.event_id,
            rule_id = %event.rule_id,
            recovery = event.is_recovery,
            "Dispatching alert"
        );

        let persist_task = self.audit.clone().map(|audit| {
            let notice = notice.clone();
            tokio::task::spawn_blocking(move || audit.persist(&notice))
        });

        let channels = self.normalize_channels(&event.requested_channels);
        if channels.is_empty() {
            tracing::warn!(event_id = %event.event_id, "No notification channels requested");
        }

        // Text content does not depend on the channel, so render it once.
        let shared_text = match self.renderer.strategy_for(notice) {
            RenderStrategy::Template => None,
            _ => Some(self.renderer.render_text(event)),
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = Vec::with_capacity(channels.len());
        for name in &channels {
            let channel = match self.registry.lookup(name) {
                Lookup::Found(channel) => channel,
                Lookup::Disabled(reason) => {
                    tracing::warn!(channel = %name, reason = %reason, "Channel is disabled");
                    tasks.push(Pending::Ready(DeliveryResult::failed(name, reason)));
                    continue;
                }
                Lookup::Unknown => {
                    tracing::warn!(channel = %name, "Unknown notification channel");
                    tasks.push(Pending::Ready(DeliveryResult::unknown(name)));
                    continue;
                }
            };

            let recipients = resolve(&event.users, &channel.recipient_kind());
            let message = self.renderer.message(notice, name, shared_text.as_deref());
            let sem = Arc::clone(&semaphore);
            let limit = self.per_channel_timeout;
            let channel_name = name.clone();

            let handle = tokio::spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return DeliveryResult::failed(&channel_name, e),
                };
                match timeout(limit, channel.send(&message, &recipients)).await {
                    Ok(Ok(response)) => DeliveryResult::from_response(&channel_name, response),
                    Ok(Err(e)) => DeliveryResult::failed(&channel_name, e),
                    Err(_) => DeliveryResult::timed_out(&channel_name, limit),
                }
            });
            tasks.push(Pending::Running(name.clone(), handle));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            let result = match task {
                Pending::Ready(result) => result,
                Pending::Running(name, handle) => match handle.await {
                    Ok(result) => result,
                    Err(e) => DeliveryResult::failed(&name, format!("delivery task aborted: {e}")),
                },
            };
            log_result(&result);
            results.push(result);
        }

        let callback = match &self.callback {
            Some(client) => {
                let result = client.post(notice.raw_event()).await;
                log_result(&result);
                Some(result)
            }
            None => None,
        };

        let persisted = match persist_task {
            Some(task) => match task.await {
                Ok(Ok(path)) => Some(path),
                Ok(Err(e)) => {
                    tracing::error!(event_id = %event.event_id, error = %e, "Failed to persist payload");
                    None
                }
                Err(e) => {
                    tracing::error!(event_id = %event.event_id, error = %e, "Persist task aborted");
                    None
                }
            },
            None => None,
        };

        let report = DispatchReport {
            event_id: event.event_id.clone(),
            rule_id: event.rule_id.clone(),
            persisted,
            results,
            callback,
        };
        tracing::info!(event_id = %report.event_id, summary = %report.summary(), "Dispatch finished");
        report
    }
}

enum Pending {
    Ready(DeliveryResult),
    Running(String, tokio::task::JoinHandle<DeliveryResult>),
}

fn log_result(result: &DeliveryResult) {
    if result.is_success() {
        tracing::info!(
            channel = %result.channel,
            succeeded = result.succeeded,
            retries = result.retries,
            "Channel delivered"
        );
    } else {
        tracing::warn!(
            channel = %result.channel,
            status = ?result.status,
            succeeded = result.succeeded,
            failed = result.failed,
            reason = result.reason.as_deref().unwrap_or(""),
            "Channel not fully delivered"
        );
    }
}
