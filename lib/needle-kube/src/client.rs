//! Kubernetes client construction

use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use tracing::info;

/// KubeClient wraps the Kubernetes client used for instance lookups
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    /// Connect using `context` from the local kubeconfig, or the default
    /// in-cluster / kubeconfig resolution when none is given
    pub async fn connect(context: Option<&str>) -> anyhow::Result<Self> {
        let client = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..Default::default()
                };
                let config = Config::from_kubeconfig(&options).await?;
                Client::try_from(config)?
            }
            None => Client::try_default().await?,
        };
        info!(context = context.unwrap_or("default"), "connected to kubernetes");
        Ok(Self { client })
    }

    /// Get a clone of the Kubernetes client
    pub fn clone_client(&self) -> Client {
        self.client.clone()
    }
}
