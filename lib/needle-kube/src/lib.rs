//! Kubernetes integration
pub mod client;
pub mod instances;

pub use client::KubeClient;
pub use instances::KubeInstanceLister;
