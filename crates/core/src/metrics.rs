//! Prometheus metrics for the scheduler and its collaborators.
//!
//! This module provides metrics for:
//! - Preparation requests (by outcome)
//! - Downloads and lease resets
//! - Per-sensor uploads and completed trajectories
//! - Queue gauges refreshed every scheduler cycle
//!
//! The process has no HTTP surface; `write_textfile` dumps the registry in
//! text exposition format for node-exporter's textfile collector.

use std::path::Path;

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for metric in all_metrics() {
        // Only fails on duplicate names, which `all_metrics` never yields.
        let _ = registry.register(metric);
    }
    registry
});

// =============================================================================
// Preparation
// =============================================================================

/// Preparation attempts by outcome.
pub static PREPARATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "kappasync_preparations_total",
            "Download preparation attempts",
        ),
        &["outcome"], // "prepared", "oversized", "failed", "no_footprint"
    )
    .unwrap()
});

// =============================================================================
// Downloads
// =============================================================================

/// Downloads by outcome.
pub static DOWNLOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("kappasync_downloads_total", "Archive downloads"),
        &["outcome"], // "succeeded", "failed", "rejected"
    )
    .unwrap()
});

/// Lease resets by reason.
pub static RESETS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("kappasync_resets_total", "Download lease resets"),
        &["reason"], // "expiring", "fetch_failed", "invalid_archive"
    )
    .unwrap()
});

// =============================================================================
// Publishing
// =============================================================================

/// Successful uploads by sensor.
pub static UPLOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("kappasync_uploads_total", "Successful sensor uploads"),
        &["sensor"],
    )
    .unwrap()
});

/// Trajectories with all sensors published.
pub static TRAJECTORIES_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "kappasync_trajectories_completed_total",
        "Trajectories completed during this run",
    )
    .unwrap()
});

// =============================================================================
// Queue gauges
// =============================================================================

pub static UNCOMPLETED_TRAJECTORIES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "kappasync_uncompleted_trajectories",
        "Trajectories with at least one pending sensor",
    )
    .unwrap()
});

pub static READY_TRAJECTORIES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "kappasync_ready_trajectories",
        "Trajectories whose download is ready",
    )
    .unwrap()
});

pub static LIVE_DOWNLOADS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "kappasync_live_downloads",
        "Trajectories holding a download id",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(PREPARATIONS.clone()),
        Box::new(DOWNLOADS.clone()),
        Box::new(RESETS.clone()),
        Box::new(UPLOADS.clone()),
        Box::new(TRAJECTORIES_COMPLETED.clone()),
        Box::new(UNCOMPLETED_TRAJECTORIES.clone()),
        Box::new(READY_TRAJECTORIES.clone()),
        Box::new(LIVE_DOWNLOADS.clone()),
    ]
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Atomically replace `path` with the current metrics.
pub fn write_textfile(path: &Path) -> std::io::Result<()> {
    let body = encode_metrics().map_err(std::io::Error::other)?;
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)
}
