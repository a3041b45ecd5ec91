//! Store for services and dentries
//!
//! `Store` is the only writer of persisted state. It validates writes,
//! delegates persistence to a [`Backend`] and, for every dentry mutation
//! that changed a row, notifies the synchronizer of the affected dtab.

pub mod memory;
pub mod postgres;

pub use memory::MemoryBackend;
pub use postgres::{PostgresBackend, PostgresConfig};

use async_trait::async_trait;
use needle_api::{Dentry, DentrySpec, Service, ServiceSpec};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::notify::DtabNotifier;
use crate::{CoreError, Result};

/// Outcome of deleting a dentry by id: the dtab it belonged to and the
/// number of rows removed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deletion {
    pub dtab: String,
    pub affected: u64,
}

/// Persistence for services and dentries
#[async_trait]
pub trait Backend: Send + Sync {
    /// Insert or update the service keyed by `logical_name`
    async fn upsert_service(&self, spec: &ServiceSpec) -> Result<Service>;

    async fn service_by_logical_name(&self, logical_name: &str) -> Result<Option<Service>>;

    /// Insert or update the dentry keyed by `(dtab, prefix)`
    async fn upsert_dentry(&self, spec: &DentrySpec) -> Result<Dentry>;

    /// Delete a dentry by id, reporting the dtab it belonged to. `None`
    /// when no such dentry exists.
    async fn delete_dentry_by_id(&self, id: Uuid) -> Result<Option<Deletion>>;

    async fn delete_dentry_by_prefix(&self, dtab: &str, prefix: &str) -> Result<u64>;

    /// Dentries of `dtab` ordered by priority, then prefix
    async fn dentries_by_dtab(&self, dtab: &str) -> Result<Vec<Dentry>>;

    /// Distinct dtab names, sorted
    async fn delegation_tables(&self) -> Result<Vec<String>>;
}

/// Store handle shared by RPC handlers, the version router and the
/// synchronizer
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn Backend>,
    notifier: DtabNotifier,
}

impl Store {
    pub fn new(backend: Arc<dyn Backend>, notifier: DtabNotifier) -> Self {
        Self { backend, notifier }
    }

    /// Create or update a service by logical name
    pub async fn put_service(&self, spec: ServiceSpec) -> Result<Service> {
        spec.validate()?;
        let service = self.backend.upsert_service(&spec).await?;
        debug!(logical_name = %service.logical_name, "put service");
        Ok(service)
    }

    pub async fn get_service_by_logical_name(&self, logical_name: &str) -> Result<Service> {
        self.backend
            .service_by_logical_name(logical_name)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("service {}", logical_name)))
    }

    /// Create or update a dentry, then queue a sync of its dtab
    pub async fn put_dentry(&self, spec: DentrySpec) -> Result<Dentry> {
        spec.validate()?;
        let dentry = self.backend.upsert_dentry(&spec).await?;
        debug!(dtab = %dentry.dtab, prefix = %dentry.prefix, "put dentry");
        self.notifier.notify(&dentry.dtab);
        Ok(dentry)
    }

    /// Delete a dentry by id. Deleting an unknown id affects nothing.
    pub async fn delete_dentry_by_id(&self, id: Uuid) -> Result<u64> {
        match self.backend.delete_dentry_by_id(id).await? {
            Some(deletion) => {
                debug!(%id, dtab = %deletion.dtab, "deleted dentry");
                if deletion.affected > 0 {
                    self.notifier.notify(&deletion.dtab);
                }
                Ok(deletion.affected)
            }
            None => Ok(0),
        }
    }

    pub async fn delete_dentry_by_prefix(&self, dtab: &str, prefix: &str) -> Result<u64> {
        let affected = self.backend.delete_dentry_by_prefix(dtab, prefix).await?;
        if affected > 0 {
            debug!(dtab, prefix, "deleted dentry");
            self.notifier.notify(dtab);
        }
        Ok(affected)
    }

    pub async fn list_dentries_by_dtab(&self, dtab: &str) -> Result<Vec<Dentry>> {
        self.backend.dentries_by_dtab(dtab).await
    }

    pub async fn list_delegation_tables(&self) -> Result<Vec<String>> {
        self.backend.delegation_tables().await
    }
}
