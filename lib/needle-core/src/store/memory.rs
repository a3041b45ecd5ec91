//! In-process backend for local development and tests

use async_trait::async_trait;
use chrono::Utc;
use needle_api::{Dentry, DentrySpec, Service, ServiceSpec};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Backend, Deletion};
use crate::Result;

/// MemoryBackend keeps services and dentries in maps with the same
/// uniqueness rules as the Postgres schema
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    // logical_name -> service
    services: HashMap<String, Service>,
    // (dtab, prefix) -> dentry
    dentries: HashMap<(String, String), Dentry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn dentry_count(&self) -> usize {
        self.state.read().await.dentries.len()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn upsert_service(&self, spec: &ServiceSpec) -> Result<Service> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let service = state
            .services
            .entry(spec.logical_name.clone())
            .and_modify(|existing| {
                existing.update_date = now;
                existing.namespace = spec.namespace.clone();
                existing.description = spec.description.clone();
            })
            .or_insert_with(|| Service {
                id: Uuid::new_v4(),
                create_date: now,
                update_date: now,
                logical_name: spec.logical_name.clone(),
                namespace: spec.namespace.clone(),
                description: spec.description.clone(),
            });
        Ok(service.clone())
    }

    async fn service_by_logical_name(&self, logical_name: &str) -> Result<Option<Service>> {
        let state = self.state.read().await;
        Ok(state.services.get(logical_name).cloned())
    }

    async fn upsert_dentry(&self, spec: &DentrySpec) -> Result<Dentry> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let dentry = state
            .dentries
            .entry((spec.dtab.clone(), spec.prefix.clone()))
            .and_modify(|existing| {
                existing.update_date = now;
                existing.destination = spec.destination.clone();
                existing.priority = spec.priority;
            })
            .or_insert_with(|| Dentry {
                id: Uuid::new_v4(),
                create_date: now,
                update_date: now,
                dtab: spec.dtab.clone(),
                prefix: spec.prefix.clone(),
                destination: spec.destination.clone(),
                priority: spec.priority,
            });
        Ok(dentry.clone())
    }

    async fn delete_dentry_by_id(&self, id: Uuid) -> Result<Option<Deletion>> {
        let mut state = self.state.write().await;
        let key = state
            .dentries
            .iter()
            .find(|(_, dentry)| dentry.id == id)
            .map(|(key, _)| key.clone());

        Ok(key.and_then(|key| state.dentries.remove(&key)).map(|removed| Deletion {
            dtab: removed.dtab,
            affected: 1,
        }))
    }

    async fn delete_dentry_by_prefix(&self, dtab: &str, prefix: &str) -> Result<u64> {
        let mut state = self.state.write().await;
        let removed = state
            .dentries
            .remove(&(dtab.to_string(), prefix.to_string()));
        Ok(removed.map_or(0, |_| 1))
    }

    async fn dentries_by_dtab(&self, dtab: &str) -> Result<Vec<Dentry>> {
        let state = self.state.read().await;
        let mut dentries: Vec<Dentry> = state
            .dentries
            .values()
            .filter(|dentry| dentry.dtab == dtab)
            .cloned()
            .collect();
        dentries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(dentries)
    }

    async fn delegation_tables(&self) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let tables: BTreeSet<&String> = state.dentries.keys().map(|(dtab, _)| dtab).collect();
        Ok(tables.into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_dentry_replaces_destination() {
        let backend = MemoryBackend::new();
        let first = backend
            .upsert_dentry(&DentrySpec::new("default", "/svc/foo", "/#/foo-v1", 100))
            .await
            .unwrap();
        let second = backend
            .upsert_dentry(&DentrySpec::new("default", "/svc/foo", "/#/foo-v2", 100))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.create_date, second.create_date);
        assert!(second.update_date >= first.update_date);
        assert_eq!(second.destination, "/#/foo-v2");
        assert_eq!(backend.dentry_count().await, 1);
    }

    #[tokio::test]
    async fn test_same_prefix_in_different_dtabs() {
        let backend = MemoryBackend::new();
        backend
            .upsert_dentry(&DentrySpec::new("a", "/svc/foo", "/#/foo", 1))
            .await
            .unwrap();
        backend
            .upsert_dentry(&DentrySpec::new("b", "/svc/foo", "/#/foo", 1))
            .await
            .unwrap();

        assert_eq!(backend.dentry_count().await, 2);
        assert_eq!(backend.delegation_tables().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_dentries_ordered_by_priority() {
        let backend = MemoryBackend::new();
        for (prefix, priority) in [("/svc/c", 50), ("/svc/b", 10), ("/svc/a", 50)] {
            backend
                .upsert_dentry(&DentrySpec::new("default", prefix, "/#/x", priority))
                .await
                .unwrap();
        }

        let prefixes: Vec<String> = backend
            .dentries_by_dtab("default")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.prefix)
            .collect();
        assert_eq!(prefixes, vec!["/svc/b", "/svc/a", "/svc/c"]);
    }

    #[tokio::test]
    async fn test_delete_by_id_reports_dtab() {
        let backend = MemoryBackend::new();
        let dentry = backend
            .upsert_dentry(&DentrySpec::new("edge", "/svc/foo", "/#/foo", 1))
            .await
            .unwrap();

        let deletion = backend.delete_dentry_by_id(dentry.id).await.unwrap();
        assert_eq!(
            deletion,
            Some(Deletion {
                dtab: "edge".to_string(),
                affected: 1
            })
        );
        assert_eq!(backend.delete_dentry_by_id(dentry.id).await.unwrap(), None);
        assert!(backend.delegation_tables().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_service_by_logical_name() {
        let backend = MemoryBackend::new();
        let first = backend
            .upsert_service(&ServiceSpec::new("checkout", "shop", "v1"))
            .await
            .unwrap();
        let second = backend
            .upsert_service(&ServiceSpec::new("checkout", "shop-next", "v2"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.namespace, "shop-next");
        assert_eq!(
            backend.service_by_logical_name("checkout").await.unwrap(),
            Some(second)
        );
        assert_eq!(backend.service_by_logical_name("cart").await.unwrap(), None);
    }
}
