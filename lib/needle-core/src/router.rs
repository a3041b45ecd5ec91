//! Version routing
//!
//! Points a logical service at one deployed version by looking the version
//! up in the cluster and deriving a dentry from the instance's annotations.

use async_trait::async_trait;
use needle_api::{Dentry, DentrySpec, Service};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::store::Store;
use crate::{CoreError, Result};

/// Label holding the logical name an instance belongs to
pub const LOGICAL_NAME_LABEL: &str = "logicalName";
/// Label holding the version an instance runs
pub const VERSION_LABEL: &str = "version";

pub const DTAB_ANNOTATION: &str = "needle.io/dtab";
pub const PORT_NAME_ANNOTATION: &str = "needle.io/port-name";
pub const PRIORITY_ANNOTATION: &str = "needle.io/dentry-priority";
pub const PREFIX_ANNOTATION: &str = "needle.io/dentry-prefix";

/// Equality label selector, rendered as `k1=v1,k2=v2`
pub type Labels = BTreeMap<String, String>;

/// A running instance of a service version as the cluster reports it
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Instance {
    pub name: String,
    pub namespace: String,
    pub annotations: HashMap<String, String>,
}

/// Source of instance metadata
#[async_trait]
pub trait InstanceLister: Send + Sync {
    /// Instances in `namespace` carrying every label in `labels`
    async fn list_instances(&self, namespace: &str, labels: &Labels) -> Result<Vec<Instance>>;
}

/// Selector matching the instances of `logical_name` at `version`
pub fn version_selector(logical_name: &str, version: &str) -> Labels {
    Labels::from([
        (LOGICAL_NAME_LABEL.to_string(), logical_name.to_string()),
        (VERSION_LABEL.to_string(), version.to_string()),
    ])
}

/// Derive the dentry routing `service` to `instance`
pub fn dentry_for_instance(service: &Service, instance: &Instance) -> Result<DentrySpec> {
    let annotation = |key: &'static str, which: &'static str| {
        instance
            .annotations
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| CoreError::MissingAnnotation {
                instance: instance.name.clone(),
                which,
                annotation: key,
            })
    };

    let dtab = annotation(DTAB_ANNOTATION, "dtab")?;
    let port_name = annotation(PORT_NAME_ANNOTATION, "portName")?;
    let raw_priority = annotation(PRIORITY_ANNOTATION, "priority")?;
    let priority: i32 = raw_priority
        .parse()
        .map_err(|_| CoreError::InvalidPriority(raw_priority.to_string()))?;

    let prefix = match instance.annotations.get(PREFIX_ANNOTATION) {
        Some(prefix) => prefix.clone(),
        None => format!("/{}", service.logical_name),
    };
    let destination = format!(
        "/#/io.l5d.k8s/{}/{}/{}",
        service.namespace, port_name, instance.name
    );

    Ok(DentrySpec::new(dtab, prefix, destination, priority))
}

/// VersionRouter commits dentries that send a logical service to a version
#[derive(Clone)]
pub struct VersionRouter {
    store: Store,
    instances: Arc<dyn InstanceLister>,
}

impl VersionRouter {
    pub fn new(store: Store, instances: Arc<dyn InstanceLister>) -> Self {
        Self { store, instances }
    }

    /// Route `logical_name` to the single instance labelled with `version`
    pub async fn route_to_version(&self, logical_name: &str, version: &str) -> Result<Dentry> {
        if logical_name.trim().is_empty() {
            return Err(CoreError::InvalidArgument(
                "logical_name must not be empty".to_string(),
            ));
        }
        if version.trim().is_empty() {
            return Err(CoreError::InvalidArgument(
                "version must not be empty".to_string(),
            ));
        }

        let service = self.store.get_service_by_logical_name(logical_name).await?;
        let selector = version_selector(logical_name, version);
        let mut instances = self
            .instances
            .list_instances(&service.namespace, &selector)
            .await?;
        debug!(
            logical_name,
            version,
            namespace = %service.namespace,
            count = instances.len(),
            "listed instances"
        );

        let instance = match instances.len() {
            0 => {
                return Err(CoreError::InstanceNotFound {
                    logical_name: logical_name.to_string(),
                    version: version.to_string(),
                })
            }
            1 => instances.remove(0),
            count => {
                return Err(CoreError::AmbiguousInstance {
                    logical_name: logical_name.to_string(),
                    version: version.to_string(),
                    count,
                })
            }
        };

        let spec = dentry_for_instance(&service, &instance)?;
        let dentry = self.store.put_dentry(spec).await?;
        info!(
            logical_name,
            version,
            dtab = %dentry.dtab,
            prefix = %dentry.prefix,
            destination = %dentry.destination,
            "routed service to version"
        );
        Ok(dentry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::dtab_channel;
    use crate::store::MemoryBackend;
    use needle_api::ServiceSpec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeInstances {
        instances: Vec<Instance>,
        selectors: Mutex<Vec<(String, Labels)>>,
    }

    #[async_trait]
    impl InstanceLister for FakeInstances {
        async fn list_instances(&self, namespace: &str, labels: &Labels) -> Result<Vec<Instance>> {
            self.selectors
                .lock()
                .unwrap()
                .push((namespace.to_string(), labels.clone()));
            Ok(self.instances.clone())
        }
    }

    fn instance(name: &str, annotations: &[(&str, &str)]) -> Instance {
        Instance {
            name: name.to_string(),
            namespace: "shop".to_string(),
            annotations: annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn annotated(name: &str) -> Instance {
        instance(
            name,
            &[
                (DTAB_ANNOTATION, "default"),
                (PORT_NAME_ANNOTATION, "http"),
                (PRIORITY_ANNOTATION, "10"),
            ],
        )
    }

    async fn router(instances: Vec<Instance>) -> (Store, Arc<FakeInstances>, VersionRouter) {
        let (notifier, _receiver) = dtab_channel(16);
        let store = Store::new(Arc::new(MemoryBackend::new()), notifier);
        store
            .put_service(ServiceSpec::new("checkout", "shop", "storefront checkout"))
            .await
            .unwrap();
        let fake = Arc::new(FakeInstances {
            instances,
            ..Default::default()
        });
        let router = VersionRouter::new(store.clone(), fake.clone());
        (store, fake, router)
    }

    #[tokio::test]
    async fn test_route_to_version_default_prefix() {
        let (store, fake, router) = router(vec![annotated("checkout-v2")]).await;

        let dentry = router.route_to_version("checkout", "v2").await.unwrap();
        assert_eq!(dentry.dtab, "default");
        assert_eq!(dentry.prefix, "/checkout");
        assert_eq!(dentry.destination, "/#/io.l5d.k8s/shop/http/checkout-v2");
        assert_eq!(dentry.priority, 10);

        let selectors = fake.selectors.lock().unwrap().clone();
        assert_eq!(
            selectors,
            vec![("shop".to_string(), version_selector("checkout", "v2"))]
        );
        assert_eq!(store.list_dentries_by_dtab("default").await.unwrap(), vec![dentry]);
    }

    #[tokio::test]
    async fn test_route_to_version_prefix_override() {
        let mut inst = annotated("checkout-v3");
        inst.annotations
            .insert(PREFIX_ANNOTATION.to_string(), "/svc/checkout".to_string());
        let (_store, _fake, router) = router(vec![inst]).await;

        let dentry = router.route_to_version("checkout", "v3").await.unwrap();
        assert_eq!(dentry.prefix, "/svc/checkout");
    }

    #[tokio::test]
    async fn test_no_instances() {
        let (_store, _fake, router) = router(vec![]).await;
        let err = router.route_to_version("checkout", "v2").await.unwrap_err();
        assert!(matches!(err, CoreError::InstanceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_ambiguous_instances() {
        let (store, _fake, router) =
            router(vec![annotated("checkout-v2-a"), annotated("checkout-v2-b")]).await;
        let err = router.route_to_version("checkout", "v2").await.unwrap_err();
        assert!(matches!(err, CoreError::AmbiguousInstance { count: 2, .. }));
        assert!(store.list_delegation_tables().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let (_store, fake, router) = router(vec![annotated("cart-v1")]).await;
        let err = router.route_to_version("cart", "v1").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        assert!(fake.selectors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_arguments() {
        let (_store, _fake, router) = router(vec![]).await;
        assert!(matches!(
            router.route_to_version("", "v2").await,
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            router.route_to_version("checkout", " ").await,
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_missing_annotations() {
        let service = Service {
            id: uuid::Uuid::new_v4(),
            create_date: chrono::Utc::now(),
            update_date: chrono::Utc::now(),
            logical_name: "checkout".to_string(),
            namespace: "shop".to_string(),
            description: String::new(),
        };

        let which = |inst: Instance| match dentry_for_instance(&service, &inst) {
            Err(CoreError::MissingAnnotation { which, .. }) => which,
            other => panic!("expected missing annotation, got {:?}", other),
        };

        assert_eq!(
            which(instance(
                "a",
                &[(PORT_NAME_ANNOTATION, "http"), (PRIORITY_ANNOTATION, "1")]
            )),
            "dtab"
        );
        assert_eq!(
            which(instance(
                "a",
                &[(DTAB_ANNOTATION, "default"), (PRIORITY_ANNOTATION, "1")]
            )),
            "portName"
        );
        assert_eq!(
            which(instance(
                "a",
                &[(DTAB_ANNOTATION, "default"), (PORT_NAME_ANNOTATION, "http")]
            )),
            "priority"
        );
    }

    #[test]
    fn test_invalid_priority() {
        let service = Service {
            id: uuid::Uuid::new_v4(),
            create_date: chrono::Utc::now(),
            update_date: chrono::Utc::now(),
            logical_name: "checkout".to_string(),
            namespace: "shop".to_string(),
            description: String::new(),
        };
        let mut inst = annotated("checkout-v2");
        inst.annotations
            .insert(PRIORITY_ANNOTATION.to_string(), "high".to_string());

        let err = dentry_for_instance(&service, &inst).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPriority(ref v) if v == "high"));
    }

    #[test]
    fn test_padded_priority_is_rejected() {
        let service = Service {
            id: uuid::Uuid::new_v4(),
            create_date: chrono::Utc::now(),
            update_date: chrono::Utc::now(),
            logical_name: "checkout".to_string(),
            namespace: "shop".to_string(),
            description: String::new(),
        };
        let mut inst = annotated("checkout-v2");
        inst.annotations
            .insert(PRIORITY_ANNOTATION.to_string(), " 10 ".to_string());

        let err = dentry_for_instance(&service, &inst).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPriority(ref v) if v == " 10 "));
    }
}
