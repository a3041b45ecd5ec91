//! The naming service the synchronizer pushes delegation tables to

use async_trait::async_trait;
use needle_api::DtabEntry;

use crate::Result;

/// A stateless proxy to the delegation table API of the naming service
#[async_trait]
pub trait NamingService: Send + Sync {
    /// The ordered rules currently held for `dtab`
    async fn fetch_dentries(&self, dtab: &str) -> Result<Vec<DtabEntry>>;

    /// Replace everything held for `dtab` with exactly `entries`, in order
    async fn replace_dentries(&self, dtab: &str, entries: &[DtabEntry]) -> Result<()>;
}
