use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

pub(crate) const MIRROR_SKIPPED_TOTAL: &str = "quiz_sync_mirror_skipped_total";

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    metrics::describe_counter!(
        MIRROR_SKIPPED_TOTAL,
        "Mirrored writes that were skipped or failed, by target backend, entity and reason"
    );
    Ok(())
}

pub(crate) fn record_mirror_skip(backend: &'static str, entity: &'static str, reason: &'static str) {
    metrics::counter!(
        MIRROR_SKIPPED_TOTAL,
        "backend" => backend,
        "entity" => entity,
        "reason" => reason
    )
    .increment(1);
}

/// Scrape text for the host application's metrics endpoint, when a recorder
/// is installed.
pub fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
