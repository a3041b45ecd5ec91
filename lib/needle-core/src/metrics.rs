//! Prometheus metrics for dtab synchronization

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Counters and timings recorded by the notifier and the synchronizer.
/// Clones share the same registry.
#[derive(Clone)]
pub struct SyncMetrics {
    /// Convergence passes by result (`ok` or `error`)
    pub syncs_total: IntCounterVec,
    /// Time spent reading the store and replacing a dtab in namerd
    pub sync_duration_seconds: Histogram,
    /// Notifications dropped because the queue was full
    pub notifications_dropped_total: IntCounter,
    pub registry: Arc<Registry>,
}

impl SyncMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let syncs_total = IntCounterVec::new(
            Opts::new("needle_dtab_syncs_total", "Total dtab convergence passes"),
            &["result"],
        )?;

        let sync_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "needle_dtab_sync_duration_seconds",
            "Dtab convergence latency in seconds",
        ))?;

        let notifications_dropped_total = IntCounter::new(
            "needle_dtab_notifications_dropped_total",
            "Dtab change notifications dropped on a full queue",
        )?;

        registry.register(Box::new(syncs_total.clone()))?;
        registry.register(Box::new(sync_duration_seconds.clone()))?;
        registry.register(Box::new(notifications_dropped_total.clone()))?;

        Ok(Self {
            syncs_total,
            sync_duration_seconds,
            notifications_dropped_total,
            registry,
        })
    }

    pub fn record_sync(&self, ok: bool, elapsed: Duration) {
        let result = if ok { "ok" } else { "error" };
        self.syncs_total.with_label_values(&[result]).inc();
        self.sync_duration_seconds.observe(elapsed.as_secs_f64());
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
