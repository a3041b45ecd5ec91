use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{require, ValidationError};

/// Service is a logical, operator assigned name for a deployable
/// application. `namespace` is where its running instances live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Uuid,
    pub create_date: DateTime<Utc>,
    pub update_date: DateTime<Utc>,
    /// Unique across all services
    pub logical_name: String,
    pub namespace: String,
    pub description: String,
}

/// The writable fields of a Service, upserted by `logical_name`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    pub logical_name: String,
    pub namespace: String,
    #[serde(default)]
    pub description: String,
}

impl ServiceSpec {
    pub fn new(
        logical_name: impl Into<String>,
        namespace: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            logical_name: logical_name.into(),
            namespace: namespace.into(),
            description: description.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require("logical_name", &self.logical_name)?;
        require("namespace", &self.namespace)
    }
}
