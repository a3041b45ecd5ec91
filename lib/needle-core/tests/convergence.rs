//! Store and synchronizer running together on the memory backend

use async_trait::async_trait;
use needle_api::{DentrySpec, DtabEntry};
use needle_core::{dtab_channel, MemoryBackend, NamingService, Result, Store, Synchronizer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct FakeNamerd {
    tables: Mutex<HashMap<String, Vec<DtabEntry>>>,
}

#[async_trait]
impl NamingService for FakeNamerd {
    async fn fetch_dentries(&self, dtab: &str) -> Result<Vec<DtabEntry>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(dtab)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_dentries(&self, dtab: &str, entries: &[DtabEntry]) -> Result<()> {
        self.tables
            .lock()
            .unwrap()
            .insert(dtab.to_string(), entries.to_vec());
        Ok(())
    }
}

struct Harness {
    store: Store,
    namerd: Arc<FakeNamerd>,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl Harness {
    fn start() -> Self {
        let (notifier, receiver) = dtab_channel(64);
        let store = Store::new(Arc::new(MemoryBackend::new()), notifier);
        let namerd = Arc::new(FakeNamerd::default());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            Synchronizer::new(store.clone(), namerd.clone(), receiver).run(shutdown.clone()),
        );
        Self {
            store,
            namerd,
            shutdown,
            handle,
        }
    }

    /// Wait until namerd holds exactly what the store holds for `dtab`
    async fn converged(&self, dtab: &str) -> Vec<DtabEntry> {
        let expected: Vec<DtabEntry> = self
            .store
            .list_dentries_by_dtab(dtab)
            .await
            .unwrap()
            .iter()
            .map(DtabEntry::from)
            .collect();
        for _ in 0..200 {
            let held = self.namerd.fetch_dentries(dtab).await.unwrap();
            if held == expected {
                return held;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("dtab {dtab} did not converge to {expected:?}");
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_upsert_replaces_destination() {
    let harness = Harness::start();
    harness
        .store
        .put_dentry(DentrySpec::new("default", "/svc/foo", "/#/foo-v1", 100))
        .await
        .unwrap();
    harness
        .store
        .put_dentry(DentrySpec::new("default", "/svc/foo", "/#/foo-v2", 100))
        .await
        .unwrap();

    let rows = harness.store.list_dentries_by_dtab("default").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].destination, "/#/foo-v2");

    let held = harness.converged("default").await;
    assert_eq!(held, vec![DtabEntry::new("/svc/foo", "/#/foo-v2")]);
    harness.stop().await;
}

#[tokio::test]
async fn test_pushes_in_priority_order() {
    let harness = Harness::start();
    harness
        .store
        .put_dentry(DentrySpec::new("default", "/svc/slow", "/#/slow", 50))
        .await
        .unwrap();
    harness
        .store
        .put_dentry(DentrySpec::new("default", "/svc/fast", "/#/fast", 10))
        .await
        .unwrap();

    let held = harness.converged("default").await;
    assert_eq!(
        held,
        vec![
            DtabEntry::new("/svc/fast", "/#/fast"),
            DtabEntry::new("/svc/slow", "/#/slow"),
        ]
    );
    harness.stop().await;
}

#[tokio::test]
async fn test_delete_converges_to_empty_table() {
    let harness = Harness::start();
    let dentry = harness
        .store
        .put_dentry(DentrySpec::new("edge", "/svc/foo", "/#/foo", 0))
        .await
        .unwrap();
    assert_eq!(harness.converged("edge").await.len(), 1);

    assert_eq!(harness.store.delete_dentry_by_id(dentry.id).await.unwrap(), 1);
    assert!(harness.converged("edge").await.is_empty());
    assert!(harness.store.list_delegation_tables().await.unwrap().is_empty());
    harness.stop().await;
}

#[tokio::test]
async fn test_cold_start_pushes_existing_tables() {
    let (notifier, receiver) = dtab_channel(1);
    let store = Store::new(Arc::new(MemoryBackend::new()), notifier);
    for prefix in ["/svc/a", "/svc/b", "/svc/c"] {
        store
            .put_dentry(DentrySpec::new("default", prefix, "/#/x", 0))
            .await
            .unwrap();
    }
    assert_eq!(store.list_dentries_by_dtab("default").await.unwrap().len(), 3);

    let namerd = Arc::new(FakeNamerd::default());
    let shutdown = CancellationToken::new();
    let synchronizer = Synchronizer::new(store.clone(), namerd.clone(), receiver);
    synchronizer.reconcile_all(&shutdown).await;

    assert_eq!(namerd.fetch_dentries("default").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_independent_dtabs_converge() {
    let harness = Harness::start();
    for dtab in ["default", "edge", "internal"] {
        harness
            .store
            .put_dentry(DentrySpec::new(dtab, "/svc/foo", format!("/#/{dtab}"), 0))
            .await
            .unwrap();
    }
    for dtab in ["default", "edge", "internal"] {
        let held = harness.converged(dtab).await;
        assert_eq!(held, vec![DtabEntry::new("/svc/foo", format!("/#/{dtab}"))]);
    }
    harness.stop().await;
}
