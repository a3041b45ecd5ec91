use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{require, ValidationError};
use crate::dtab::DtabEntry;

/// Dentry is one routing rule inside the delegation table named by `dtab`.
///
/// `(dtab, prefix)` is unique. Rules are applied to namerd in ascending
/// `priority` order, so a lower value takes precedence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dentry {
    pub id: Uuid,
    pub create_date: DateTime<Utc>,
    pub update_date: DateTime<Utc>,
    pub dtab: String,
    pub prefix: String,
    pub destination: String,
    pub priority: i32,
}

impl Dentry {
    /// Ordering used wherever a table is listed or pushed: priority first,
    /// then prefix, which is unique within a dtab
    pub fn sort_key(&self) -> (i32, &str) {
        (self.priority, self.prefix.as_str())
    }
}

impl From<&Dentry> for DtabEntry {
    fn from(dentry: &Dentry) -> Self {
        DtabEntry::new(dentry.prefix.clone(), dentry.destination.clone())
    }
}

/// The writable fields of a Dentry, upserted by `(dtab, prefix)`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DentrySpec {
    pub dtab: String,
    pub prefix: String,
    pub destination: String,
    #[serde(default)]
    pub priority: i32,
}

impl DentrySpec {
    pub fn new(
        dtab: impl Into<String>,
        prefix: impl Into<String>,
        destination: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            dtab: dtab.into(),
            prefix: prefix.into(),
            destination: destination.into(),
            priority,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require("dtab", &self.dtab)?;
        require("destination", &self.destination)?;
        if !self.prefix.starts_with('/') {
            return Err(ValidationError::Prefix(self.prefix.clone()));
        }
        Ok(())
    }
}
