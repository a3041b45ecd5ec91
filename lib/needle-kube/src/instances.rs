//! Instance discovery from Kubernetes Service objects

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use needle_core::{Instance, InstanceLister, Labels, Result};
use tracing::debug;

use crate::KubeClient;

/// KubeInstanceLister resolves instances to the labelled Services in a
/// namespace
#[derive(Clone)]
pub struct KubeInstanceLister {
    client: Client,
}

impl KubeInstanceLister {
    pub fn new(client: &KubeClient) -> Self {
        Self {
            client: client.clone_client(),
        }
    }
}

#[async_trait]
impl InstanceLister for KubeInstanceLister {
    async fn list_instances(&self, namespace: &str, labels: &Labels) -> Result<Vec<Instance>> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let selector = selector_string(labels);
        let list = services
            .list(&ListParams::default().labels(&selector))
            .await?;

        debug!(namespace, %selector, "Discovered {} services", list.items.len());
        Ok(list.items.iter().map(instance_from_service).collect())
    }
}

/// Render an equality selector, `k1=v1,k2=v2`
pub fn selector_string(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn instance_from_service(service: &Service) -> Instance {
    Instance {
        name: service.name_any(),
        namespace: service.namespace().unwrap_or_default(),
        annotations: service
            .annotations()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}
