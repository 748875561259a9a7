//! Prometheus-compatible counters and gauges for the coordinator. Ambient
//! observability, not a feature named by the spec — kept in the teacher's
//! idiom (idempotent `init_metrics`, `metrics` facade macros,
//! `metrics-exporter-prometheus` HTTP listener) but scoped down to this
//! crate's own counters instead of the teacher's erasure-coding telemetry.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("failed to set up metrics exporter: {0}")]
    SetupFailed(String),
}

/// Registers metric descriptions. Safe to call more than once; only the
/// first call has any effect.
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    describe_counter!("chunkrelay_chunks_received_total", "Total chunk uploads accepted");
    describe_counter!(
        "chunkrelay_chunk_errors_total",
        "Total chunk uploads rejected (checksum mismatch, malformed, conflict)"
    );
    describe_counter!("chunkrelay_bytes_received_total", "Total bytes accepted across all transfers");
    describe_counter!("chunkrelay_transfers_started_total", "Total manifests registered");
    describe_counter!("chunkrelay_transfers_completed_total", "Total transfers assembled successfully");
    describe_counter!("chunkrelay_transfers_stale_total", "Total transfers swept to stale");

    describe_gauge!("chunkrelay_active_transfers", "Number of transfers currently active");
}

pub fn record_chunk_received(bytes: u64) {
    counter!("chunkrelay_chunks_received_total").increment(1);
    counter!("chunkrelay_bytes_received_total").increment(bytes);
}

pub fn record_chunk_error() {
    counter!("chunkrelay_chunk_errors_total").increment(1);
}

pub fn record_transfer_started() {
    counter!("chunkrelay_transfers_started_total").increment(1);
    gauge!("chunkrelay_active_transfers").increment(1.0);
}

pub fn record_transfer_completed() {
    counter!("chunkrelay_transfers_completed_total").increment(1);
    gauge!("chunkrelay_active_transfers").decrement(1.0);
}

pub fn record_transfers_swept_stale(count: u64) {
    counter!("chunkrelay_transfers_stale_total").increment(count);
    gauge!("chunkrelay_active_transfers").decrement(count as f64);
}

/// Installs the Prometheus HTTP exporter. Idempotent: a second call
/// returns the handle already installed by the first.
pub fn start_metrics_server(listen_addr: SocketAddr) -> Result<&'static PrometheusHandle, MetricsError> {
    init_metrics();

    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }

    let handle = PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install_recorder()
        .map_err(|e| MetricsError::SetupFailed(e.to_string()))?;

    let _ = PROMETHEUS_HANDLE.set(handle);
    Ok(PROMETHEUS_HANDLE.get().unwrap())
}
