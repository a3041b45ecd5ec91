//! Persisted entities managed by needle

pub mod dentry;
pub mod service;

pub use dentry::{Dentry, DentrySpec};
pub use service::{Service, ServiceSpec};

use thiserror::Error;

/// A write rejected before it reaches storage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("prefix must start with '/': {0:?}")]
    Prefix(String),
}

pub(crate) fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty(field));
    }
    Ok(())
}
