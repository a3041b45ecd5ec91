//! Synchronizer converging namerd with the store
//!
//! A single long-lived task owns the receiving half of the dtab queue. Each
//! notification triggers a full replace of that dtab in namerd from the
//! current store state, so notifications carry no payload beyond the dtab
//! name and repeated or stale notifications are harmless.
//!
//! Sweeps cover every dtab in the store plus every dtab this synchronizer
//! has pushed rules to or failed to push. A dtab leaves that set once an
//! empty table was pushed for it, so a deleted table whose push failed or
//! whose notification was dropped is still emptied by the next sweep.

use needle_api::{render_dtab, DtabEntry};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::{self, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::metrics::SyncMetrics;
use crate::naming::NamingService;
use crate::notify::DtabReceiver;
use crate::store::Store;
use crate::Result;

pub struct Synchronizer {
    store: Store,
    naming: Arc<dyn NamingService>,
    receiver: DtabReceiver,
    reconcile_interval: Option<Duration>,
    metrics: Option<SyncMetrics>,
    // dtabs namerd may still hold rules for
    tracked: Mutex<BTreeSet<String>>,
}

impl Synchronizer {
    pub fn new(store: Store, naming: Arc<dyn NamingService>, receiver: DtabReceiver) -> Self {
        Self {
            store,
            naming,
            receiver,
            reconcile_interval: None,
            metrics: None,
            tracked: Mutex::default(),
        }
    }

    /// Re-push every dtab on this period. A zero period disables the sweep.
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    pub fn with_metrics(mut self, metrics: SyncMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Starts with a full sweep so that changes made while no synchronizer
    /// was running reach namerd. A pass in progress when `shutdown` fires
    /// finishes the dtab it is on; nothing further is drained.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            reconcile_interval = ?self.reconcile_interval,
            "starting dtab synchronizer"
        );
        let mut ticker = self.reconcile_interval.map(|period| {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        self.reconcile_all(&shutdown).await;

        let mut pending = Vec::new();
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                // ahead of recv so a busy queue cannot starve the sweep
                _ = tick(&mut ticker) => {
                    self.reconcile_all(&shutdown).await;
                }

                next = self.receiver.recv() => {
                    let Some(dtab) = next else {
                        debug!("all dtab notifiers dropped");
                        break;
                    };
                    pending.push(dtab);
                    self.receiver.drain_into(&mut pending);
                    for dtab in pending.drain(..) {
                        if shutdown.is_cancelled() {
                            break;
                        }
                        self.converge(&dtab).await;
                    }
                }
            }
        }

        info!("dtab synchronizer stopped");
    }

    /// Replace `dtab` in namerd with the store's current rules, returning the
    /// number of rules pushed
    pub async fn sync_dtab(&self, dtab: &str) -> Result<usize> {
        let result = self.push(dtab).await;
        let mut tracked = self.tracked.lock().unwrap_or_else(|e| e.into_inner());
        match &result {
            Ok(0) => {
                tracked.remove(dtab);
            }
            _ => {
                tracked.insert(dtab.to_string());
            }
        }
        result
    }

    async fn push(&self, dtab: &str) -> Result<usize> {
        let entries: Vec<DtabEntry> = self
            .store
            .list_dentries_by_dtab(dtab)
            .await?
            .iter()
            .map(DtabEntry::from)
            .collect();
        debug!(dtab, rules = %render_dtab(&entries), "replacing dtab");
        self.naming.replace_dentries(dtab, &entries).await?;
        Ok(entries.len())
    }

    /// Converge every dtab in the store and every dtab namerd may still
    /// hold rules for
    pub async fn reconcile_all(&self, shutdown: &CancellationToken) {
        let mut dtabs: BTreeSet<String> = match self.store.list_delegation_tables().await {
            Ok(dtabs) => dtabs.into_iter().collect(),
            Err(e) => {
                error!(error = %e, "failed to list delegation tables for reconcile");
                return;
            }
        };
        dtabs.extend(
            self.tracked
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .cloned(),
        );
        debug!(count = dtabs.len(), "reconciling all delegation tables");
        for dtab in &dtabs {
            if shutdown.is_cancelled() {
                return;
            }
            self.converge(dtab).await;
        }
    }

    async fn converge(&self, dtab: &str) {
        let started = Instant::now();
        let result = self.sync_dtab(dtab).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_sync(result.is_ok(), started.elapsed());
        }
        match result {
            Ok(entries) => info!(dtab, entries, "synchronized dtab"),
            Err(e) => error!(dtab, error = %e, "failed to synchronize dtab"),
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
