//! Delegation table synchronization
//!
//! This library provides:
//! - Store for services and dentries, backed by Postgres or memory
//! - Change notification from the store to the synchronizer
//! - Synchronizer that converges namerd with the store
//! - Version router that derives dentries from cluster state

pub mod error;
pub mod metrics;
pub mod naming;
pub mod notify;
pub mod router;
pub mod store;
pub mod sync;

pub use error::{CoreError, Result};
pub use metrics::SyncMetrics;
pub use naming::NamingService;
pub use notify::{dtab_channel, DtabNotifier, DtabReceiver};
pub use router::{Instance, InstanceLister, Labels, VersionRouter};
pub use store::{Backend, MemoryBackend, PostgresBackend, PostgresConfig, Store};
pub use sync::Synchronizer;
