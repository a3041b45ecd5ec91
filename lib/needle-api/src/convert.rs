//! Conversions between the model and the generated protobuf types

use chrono::{DateTime, Utc};

use crate::model::{Dentry, DentrySpec, Service, ServiceSpec};
use crate::proto;

fn timestamp(at: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

impl From<Service> for proto::Service {
    fn from(service: Service) -> Self {
        Self {
            id: service.id.to_string(),
            create_date: Some(timestamp(service.create_date)),
            update_date: Some(timestamp(service.update_date)),
            logical_name: service.logical_name,
            namespace: service.namespace,
            description: service.description,
        }
    }
}

impl From<Dentry> for proto::Dentry {
    fn from(dentry: Dentry) -> Self {
        Self {
            id: dentry.id.to_string(),
            create_date: Some(timestamp(dentry.create_date)),
            update_date: Some(timestamp(dentry.update_date)),
            dtab: dentry.dtab,
            prefix: dentry.prefix,
            destination: dentry.destination,
            priority: dentry.priority,
        }
    }
}

// Ids and dates on incoming messages are ignored: the store owns them.

impl From<proto::Service> for ServiceSpec {
    fn from(service: proto::Service) -> Self {
        ServiceSpec::new(service.logical_name, service.namespace, service.description)
    }
}

impl From<proto::Dentry> for DentrySpec {
    fn from(dentry: proto::Dentry) -> Self {
        DentrySpec::new(
            dentry.dtab,
            dentry.prefix,
            dentry.destination,
            dentry.priority,
        )
    }
}
