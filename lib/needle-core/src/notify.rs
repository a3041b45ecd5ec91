//! Change notification from the store to the synchronizer
//!
//! A bounded multi-producer, single-consumer queue of dtab names. Writers
//! never wait on it: when the queue is full the notification is dropped and
//! counted. The synchronizer always re-reads the store, so a dropped
//! notification only delays convergence until the next one for that dtab.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::metrics::SyncMetrics;

/// Create a connected notifier and receiver holding up to `capacity`
/// pending notifications
pub fn dtab_channel(capacity: usize) -> (DtabNotifier, DtabReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        DtabNotifier { tx, metrics: None },
        DtabReceiver { rx },
    )
}

/// Sending half, cloned into every store handle
#[derive(Clone)]
pub struct DtabNotifier {
    tx: mpsc::Sender<String>,
    metrics: Option<SyncMetrics>,
}

impl DtabNotifier {
    pub fn with_metrics(mut self, metrics: SyncMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Enqueue a sync for `dtab` without waiting. Returns whether the
    /// notification was queued.
    pub fn notify(&self, dtab: &str) -> bool {
        match self.tx.try_send(dtab.to_string()) {
            Ok(()) => {
                debug!(dtab, "queued dtab sync");
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(dtab, "dtab sync queue full, dropping notification");
                if let Some(metrics) = &self.metrics {
                    metrics.notifications_dropped_total.inc();
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(dtab, "dtab synchronizer stopped, dropping notification");
                false
            }
        }
    }
}

/// Receiving half, owned by the synchronizer
pub struct DtabReceiver {
    rx: mpsc::Receiver<String>,
}

impl DtabReceiver {
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Move every notification already queued into `pending`, skipping
    /// dtabs that are pending already
    pub fn drain_into(&mut self, pending: &mut Vec<String>) {
        while let Ok(dtab) = self.rx.try_recv() {
            if !pending.contains(&dtab) {
                pending.push(dtab);
            }
        }
    }
}
