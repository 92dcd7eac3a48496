use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::WatchEvent;

use extcat_definitions::{metadata, MetadataType};

/// Index key for objects scoped to one workload
pub type ServiceKey = (String, String);

/// What an ingested event touched, for deployment dispatch.
#[derive(Clone, Debug, PartialEq)]
pub enum Touched {
    /// A provision or init object for one (virtual instance, service)
    Service {
        kind: MetadataType,
        instance: String,
        service: String,
    },
    /// A dxp object; every service under the instance is a candidate
    Instance { instance: String },
}

#[derive(Default)]
struct Inner {
    provision: BTreeMap<ServiceKey, BTreeSet<String>>,
    init: BTreeMap<ServiceKey, BTreeSet<String>>,
    dxp: BTreeMap<String, BTreeSet<String>>,
}

/// The three label-keyed indices over the config object collection.
///
/// Maintained by the event loop, read by the deployment controller.
/// Multiple objects under one key indicate upstream misconfiguration and
/// are tolerated; readers take the first element in set order.
#[derive(Clone, Default)]
pub struct ConfigMapIndices {
    inner: Arc<RwLock<Inner>>,
}

/// Identity of a config object, read off its labels
fn classify(cm: &ConfigMap) -> Option<(MetadataType, String, Option<String>, String)> {
    let meta = cm.metadata.as_ref()?;
    let name = meta.name.clone()?;
    let labels = meta.labels.as_ref()?;
    let kind = MetadataType::from_label(labels.get(metadata::METADATA_TYPE_LABEL)?)?;
    let instance = labels.get(metadata::VIRTUAL_INSTANCE_LABEL)?.clone();
    let service = labels.get(metadata::SERVICE_ID_LABEL).cloned();
    Some((kind, instance, service, name))
}

impl ConfigMapIndices {
    pub fn new() -> Self {
        Default::default()
    }

    /// Fold one watch event into the indices.
    ///
    /// Returns what create/update events touched so the caller can
    /// re-attempt deployments; deletions only shrink the indices.
    pub fn apply(&self, event: &WatchEvent<ConfigMap>) -> Option<Touched> {
        match event {
            WatchEvent::Added(cm) | WatchEvent::Modified(cm) => {
                let (kind, instance, service, name) = match classify(cm) {
                    Some(id) => id,
                    None => return None,
                };
                let mut inner = self.inner.write().unwrap();
                match kind {
                    MetadataType::ExtProvision | MetadataType::ExtInit => {
                        let service = service?;
                        let key = (instance.clone(), service.clone());
                        let idx = if kind == MetadataType::ExtProvision {
                            &mut inner.provision
                        } else {
                            &mut inner.init
                        };
                        idx.entry(key).or_insert_with(BTreeSet::new).insert(name);
                        Some(Touched::Service { kind, instance, service })
                    }
                    MetadataType::Dxp => {
                        inner
                            .dxp
                            .entry(instance.clone())
                            .or_insert_with(BTreeSet::new)
                            .insert(name);
                        Some(Touched::Instance { instance })
                    }
                }
            }
            WatchEvent::Deleted(cm) => {
                if let Some((kind, instance, service, name)) = classify(cm) {
                    let mut inner = self.inner.write().unwrap();
                    match kind {
                        MetadataType::ExtProvision | MetadataType::ExtInit => {
                            if let Some(service) = service {
                                let key = (instance, service);
                                let idx = if kind == MetadataType::ExtProvision {
                                    &mut inner.provision
                                } else {
                                    &mut inner.init
                                };
                                if let Some(set) = idx.get_mut(&key) {
                                    set.remove(&name);
                                    if set.is_empty() {
                                        idx.remove(&key);
                                    }
                                }
                            }
                        }
                        MetadataType::Dxp => {
                            if let Some(set) = inner.dxp.get_mut(&instance) {
                                set.remove(&name);
                                if set.is_empty() {
                                    inner.dxp.remove(&instance);
                                }
                            }
                        }
                    }
                }
                None
            }
            _ => None,
        }
    }

    /// Provision object name for a workload, if one has been observed
    pub fn provision(&self, instance: &str, service: &str) -> Option<String> {
        let inner = self.inner.read().unwrap();
        let key = (instance.to_string(), service.to_string());
        inner.provision.get(&key).and_then(|s| s.iter().next().cloned())
    }

    /// Init object name for a workload, if one has been observed
    pub fn init(&self, instance: &str, service: &str) -> Option<String> {
        let inner = self.inner.read().unwrap();
        let key = (instance.to_string(), service.to_string());
        inner.init.get(&key).and_then(|s| s.iter().next().cloned())
    }

    /// Dxp object name for a virtual instance, if one has been observed
    pub fn dxp(&self, instance: &str) -> Option<String> {
        let inner = self.inner.read().unwrap();
        inner.dxp.get(instance).and_then(|s| s.iter().next().cloned())
    }

    /// Every service with a provision object under the given instance
    pub fn provision_services(&self, instance: &str) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        inner
            .provision
            .keys()
            .filter(|(v, _)| v == instance)
            .map(|(_, s)| s.clone())
            .collect()
    }
}
