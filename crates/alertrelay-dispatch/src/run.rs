use crate::config::AppConfig;
use alertrelay_common::types::Notice;
use alertrelay_notify::dispatcher::Dispatcher;
use alertrelay_notify::DispatchReport;
use alertrelay_storage::file::FileAuditStore;
use anyhow::Context;
use std::io::Read;
use std::sync::Arc;

/// Wires a [`Dispatcher`] from the application configuration.
pub fn build_dispatcher(config: &AppConfig) -> Dispatcher {
    let dispatcher = Dispatcher::from_config(&config.notify);
    if config.persist_enabled {
        dispatcher.with_audit(Arc::new(FileAuditStore::new(&config.persist_dir)))
    } else {
        dispatcher
    }
}

/// Decodes one payload and dispatches it. Only a malformed payload is an
/// error; delivery problems are part of the report.
pub async fn dispatch_bytes(config: &AppConfig, input: &[u8]) -> anyhow::Result<DispatchReport> {
    let notice = Notice::parse(input, &config.notify.severity).context("invalid alert payload")?;
    let dispatcher = build_dispatcher(config);
    tracing::debug!(channels = ?dispatcher.registry().channel_names(), "Channels available");
    Ok(dispatcher.dispatch(&notice).await)
}

pub async fn dispatch_reader(config: &AppConfig, mut reader: impl Read) -> anyhow::Result<DispatchReport> {
    let mut input = Vec::new();
    reader.read_to_end(&mut input).context("failed to read payload")?;
    dispatch_bytes(config, &input).await
}
