// ABOUTME: Metric recording helpers for worker tasks, recovery, and tool resolution.
// ABOUTME: Thin wrappers over the metrics facade plus an optional Prometheus exporter.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter serving `/metrics` on `listen`.
///
/// Must be called from within a Tokio runtime.
pub fn init_prometheus(listen: &str) -> Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("Invalid metrics listen address: {}", listen))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    tracing::info!(listen = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_task_created(kind: &str) {
    metrics::counter!("conductor_tasks_created_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_task_killed() {
    metrics::counter!("conductor_tasks_killed_total").increment(1);
}

pub fn set_active_tasks(count: usize) {
    metrics::gauge!("conductor_active_tasks").set(count as f64);
}

/// A conversation recovered from the given persistence tier
pub fn record_recovery(tier: &str) {
    metrics::counter!("conductor_recoveries_total", "tier" => tier.to_string()).increment(1);
}

pub fn record_recovery_miss() {
    metrics::counter!("conductor_recovery_misses_total").increment(1);
}

/// An event resolved to a descriptor; `source` is builtin, mcp, generic_mcp or unknown
pub fn record_tool_resolution(source: &'static str) {
    metrics::counter!("conductor_tool_resolutions_total", "source" => source).increment(1);
}

pub fn record_error(error_type: &str) {
    metrics::counter!("conductor_errors_total", "type" => error_type.to_string()).increment(1);
}
