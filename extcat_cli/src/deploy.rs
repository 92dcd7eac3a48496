use std::collections::BTreeMap;
use std::fs;
use std::net::ToSocketAddrs;
use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::{api::Api, client::APIClient};
use serde_json::Value;

use extcat_definitions::{metadata, LcpDescriptor, LcpSummary, Phase, WorkloadKind};

use super::{
    engine::{self, ContainerEngine},
    status::{StatusReporter, StatusUpdate},
    ConfigMapIndices, ErrorKind, OperatorConfig, Result, ResultExt,
};

// Fixed mount names; dxp reads metadata from these paths
pub static PROVISION_MOUNT: &str = "ext-provision-metadata";
pub static DXP_MOUNT: &str = "dxp-metadata";
pub static INIT_MOUNT: &str = "ext-init-metadata";

static MOUNT_ROOT: &str = "/etc/liferay/lxc";

/// Whether any provision data value references an oauth application.
///
/// Substring match over the raw values; the markers only occur as
/// `.type` values in client extension configs, and unparseable configs
/// must still count.
pub fn needs_oauth(cm: &ConfigMap) -> bool {
    match &cm.data {
        Some(data) => data
            .values()
            .any(|v| metadata::OAUTH_MARKERS.iter().any(|m| v.contains(m))),
        None => false,
    }
}

/// Resolve the forwarder target to `ip:port`, falling back to the
/// unresolved host name when dns is unavailable.
pub fn resolve_forward_target(host: &str, port: u16) -> String {
    let addr = format!("{}:{}", host, port);
    match addr.to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(sa) => format!("{}:{}", sa.ip(), port),
            None => addr,
        },
        Err(e) => {
            warn!("Could not resolve {}: {}", host, e);
            addr
        }
    }
}

/// A config object referenced by the workload, reduced to name + data
pub struct ConfigRef {
    pub name: String,
    pub mount: &'static str,
    pub data: BTreeMap<String, String>,
}

/// Everything the manifest assembler needs for one workload
pub struct WorkloadPlan {
    pub instance: String,
    pub service: String,
    pub image: String,
    pub kind: WorkloadKind,
    pub env: BTreeMap<String, String>,
    pub host_rule: Option<String>,
    pub target_port: Option<i32>,
    /// `ip:port` of the forwarder target; present iff oauth was detected
    pub forward_target: Option<String>,
    /// Referenced config objects in mount order: provision, dxp, init?
    pub configs: Vec<ConfigRef>,
}

fn config_document(cfg: &ConfigRef) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": cfg.name },
        "data": cfg.data,
    })
}

fn routing_labels(labels: &mut serde_json::Map<String, Value>, plan: &WorkloadPlan) {
    let (host, port) = match (&plan.host_rule, plan.target_port) {
        (Some(h), Some(p)) => (h, p),
        _ => return,
    };
    let safe = format!("{}-{}", plan.service, plan.instance);
    labels.insert("traefik.enable".into(), json!("true"));
    labels.insert(
        format!("traefik.http.services.{}.loadbalancer.server.port", safe),
        json!(port.to_string()),
    );
    labels.insert(
        format!("traefik.http.routers.{}.rule", safe),
        json!(format!("Host(`{}`)", host)),
    );
    labels.insert(format!("traefik.http.routers.{}.entrypoints", safe), json!("web"));
}

fn workload_document(plan: &WorkloadPlan) -> Value {
    let name = metadata::workload_name(&plan.service);

    let mut labels = serde_json::Map::new();
    labels.insert("app".into(), json!(plan.service));
    labels.insert("domain".into(), json!(plan.instance));
    labels.insert("managed-by".into(), json!(crate::config::OPERATOR_ID));
    routing_labels(&mut labels, plan);
    let labels = Value::Object(labels);

    let mounts: Vec<Value> = plan
        .configs
        .iter()
        .map(|c| {
            json!({
                "name": c.mount,
                "mountPath": format!("{}/{}", MOUNT_ROOT, c.mount),
                "readOnly": true,
            })
        })
        .collect();
    let volumes: Vec<Value> = plan
        .configs
        .iter()
        .map(|c| json!({ "name": c.mount, "configMap": { "name": c.name } }))
        .collect();

    let mut main = json!({
        "name": "main",
        "image": plan.image,
        "imagePullPolicy": "IfNotPresent",
        "volumeMounts": mounts,
    });
    if !plan.env.is_empty() {
        let env: Vec<Value> = plan
            .env
            .iter()
            .map(|(k, v)| json!({ "name": k, "value": v }))
            .collect();
        main["env"] = json!(env);
    }

    let mut containers = vec![main];
    if let Some(target) = &plan.forward_target {
        containers.push(json!({
            "name": "sidecar",
            "image": "alpine/socat",
            "args": ["TCP-LISTEN:80,fork,bind=0.0.0.0", format!("TCP:{}", target)],
        }));
    }

    let pod_spec = json!({
        "restartPolicy": "Never",
        "containers": containers,
        "volumes": volumes,
    });

    match plan.kind {
        WorkloadKind::Pod => json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": name, "labels": labels },
            "spec": pod_spec,
        }),
        WorkloadKind::Job => json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": { "name": name, "labels": labels.clone() },
            "spec": {
                "ttlSecondsAfterFinished": 60,
                "backoffLimit": 0,
                "template": {
                    "metadata": { "labels": labels },
                    "spec": pod_spec,
                },
            },
        }),
    }
}

/// The manifest bundle: every referenced config object plus the workload
pub fn render_manifest(plan: &WorkloadPlan) -> Vec<Value> {
    let mut docs: Vec<Value> = plan.configs.iter().map(config_document).collect();
    docs.push(workload_document(plan));
    docs
}

/// Serialize documents into one `---` separated yaml stream
pub fn manifest_yaml(docs: &[Value]) -> Result<String> {
    let mut out = String::new();
    for doc in docs {
        out.push_str(&serde_yaml::to_string(doc)?);
        out.push('\n');
    }
    Ok(out)
}

fn annotation<'a>(cm: &'a ConfigMap, key: &str) -> Option<&'a String> {
    cm.metadata
        .as_ref()
        .and_then(|m| m.annotations.as_ref())
        .and_then(|a| a.get(key))
}

/// The descriptor the build controller serialized onto the provision
/// object; malformed or absent behaves like an empty one.
fn annotated_lcp(cm: &ConfigMap) -> LcpDescriptor {
    match annotation(cm, metadata::LCP_JSON_ANNOTATION) {
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!("Malformed lcp-json annotation, assuming empty: {}", e);
            LcpDescriptor::default()
        }),
        None => LcpDescriptor::default(),
    }
}

/// Joins the three config object streams per workload and deploys when
/// and only when the right combination is present.
///
/// Safe to call on every event from any stream: missing dependencies
/// return silently, a re-fired call simply replaces the workload.
pub struct DeployController {
    cms: Api<ConfigMap>,
    engine: Arc<dyn ContainerEngine>,
    indices: ConfigMapIndices,
    reporter: StatusReporter,
    cfg: OperatorConfig,
}

impl DeployController {
    pub fn new(
        client: APIClient,
        engine: Arc<dyn ContainerEngine>,
        indices: ConfigMapIndices,
        reporter: StatusReporter,
        cfg: OperatorConfig,
    ) -> Self {
        let cms = Api::namespaced(client, &cfg.namespace);
        DeployController {
            cms,
            engine,
            indices,
            reporter,
            cfg,
        }
    }

    /// Entry point for all six trigger points
    pub async fn attempt_deployment(&self, instance: &str, service: &str) -> Result<()> {
        let prov_name = match self.indices.provision(instance, service) {
            Some(n) => n,
            None => return Ok(()), // not built yet
        };
        let prov = match self.cms.get(&prov_name).await {
            Ok(cm) => cm,
            Err(e) => {
                debug!("Provision object {} not readable yet: {}", prov_name, e);
                return Ok(());
            }
        };
        let dxp_name = match self.indices.dxp(instance) {
            Some(n) => n,
            None => return Ok(()), // instance metadata not provisioned yet
        };
        let dxp = match self.cms.get(&dxp_name).await {
            Ok(cm) => cm,
            Err(e) => {
                debug!("Dxp object {} not readable yet: {}", dxp_name, e);
                return Ok(());
            }
        };

        let oauth = needs_oauth(&prov);
        let init = match self.indices.init(instance, service) {
            Some(n) => match self.cms.get(&n).await {
                Ok(cm) => Some(cm),
                Err(e) => {
                    debug!("Init object {} not readable yet: {}", n, e);
                    return Ok(());
                }
            },
            None if oauth => {
                debug!("{}/{} references oauth, waiting for init object", instance, service);
                return Ok(());
            }
            None => None,
        };

        let lcp = annotated_lcp(&prov);
        let host_rule = annotation(&prov, metadata::DOMAINS_ANNOTATION).cloned();
        let url = host_rule.as_ref().map(|h| format!("http://{}", h));
        let image = format!("{}/{}:latest", instance, service).to_lowercase();
        let summary = LcpSummary::from_descriptor(&lcp);

        let mut update = StatusUpdate::new(Phase::Deploying);
        update.image = Some(image.clone());
        update.url = url.clone();
        update.lcp = Some(summary.clone());
        self.reporter.publish(service, update).await;

        let mut configs = vec![
            ConfigRef {
                name: prov_name,
                mount: PROVISION_MOUNT,
                data: prov.data.clone().unwrap_or_default(),
            },
            ConfigRef {
                name: dxp_name,
                mount: DXP_MOUNT,
                data: dxp.data.clone().unwrap_or_default(),
            },
        ];
        if let Some(init) = &init {
            configs.push(ConfigRef {
                name: init
                    .metadata
                    .as_ref()
                    .and_then(|m| m.name.clone())
                    .unwrap_or_default(),
                mount: INIT_MOUNT,
                data: init.data.clone().unwrap_or_default(),
            });
        }

        let kind = lcp.workload();
        let plan = WorkloadPlan {
            instance: instance.into(),
            service: service.into(),
            image: image.clone(),
            kind,
            env: lcp.env_strings(),
            target_port: lcp.load_balancer.target_port,
            host_rule,
            forward_target: if oauth {
                Some(resolve_forward_target(&self.cfg.liferay_host, self.cfg.liferay_port))
            } else {
                None
            },
            configs,
        };

        match self.replace_workload(&plan).await {
            Ok(()) => {
                let phase = match kind {
                    WorkloadKind::Pod => Phase::Running,
                    WorkloadKind::Job => Phase::Completed,
                };
                let mut update = StatusUpdate::new(phase);
                update.image = Some(image);
                update.url = url;
                update.lcp = Some(summary);
                self.reporter.publish(service, update).await;
                Ok(())
            }
            Err(e) => {
                let mut update = StatusUpdate::new(Phase::Failed);
                update.message = Some(e.to_string());
                self.reporter.publish(service, update).await;
                Err(e)
            }
        }
    }

    async fn replace_workload(&self, plan: &WorkloadPlan) -> Result<()> {
        let workload = metadata::workload_name(&plan.service);
        let yaml = manifest_yaml(&render_manifest(plan))?;
        fs::create_dir_all(&self.cfg.manifest_dir)?;
        let file = self.cfg.manifest_dir.join(format!("{}.yaml", workload));
        fs::write(&file, yaml)?;
        info!("Materializing {} from {}", workload, file.display());
        engine::materialize(self.engine.as_ref(), &file)
            .await
            .chain_err(|| ErrorKind::DeployFailure(workload))
    }

    /// A dxp change re-candidates every service under the instance;
    /// per-service failures are isolated so one bad bundle cannot hold
    /// back its neighbours.
    pub async fn fan_out(&self, instance: &str) {
        for service in self.indices.provision_services(instance) {
            if let Err(e) = self.attempt_deployment(instance, &service).await {
                warn!("Deployment of {}/{} failed: {}", instance, service, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        manifest_yaml, needs_oauth, render_manifest, ConfigRef, WorkloadPlan, DXP_MOUNT,
        INIT_MOUNT, PROVISION_MOUNT,
    };
    use extcat_definitions::WorkloadKind;
    use k8s_openapi::api::core::v1::ConfigMap;
    use maplit::btreemap;

    fn plan(kind: WorkloadKind, oauth: bool, with_init: bool) -> WorkloadPlan {
        let mut configs = vec![
            ConfigRef {
                name: "hello-acme-lxc-ext-provision-metadata".into(),
                mount: PROVISION_MOUNT,
                data: btreemap! { "x.client-extension-config.json".to_string() => "{}".to_string() },
            },
            ConfigRef {
                name: "acme-lxc-dxp-metadata".into(),
                mount: DXP_MOUNT,
                data: btreemap! { "com.liferay.lxc.dxp.mainDomain".to_string() => "acme".to_string() },
            },
        ];
        if with_init {
            configs.push(ConfigRef {
                name: "hello-acme-lxc-ext-init-metadata".into(),
                mount: INIT_MOUNT,
                data: Default::default(),
            });
        }
        WorkloadPlan {
            instance: "acme".into(),
            service: "hello".into(),
            image: "acme/hello:latest".into(),
            kind,
            env: btreemap! { "MODE".to_string() => "dev".to_string() },
            host_rule: Some("hello.acme.localtest.me".into()),
            target_port: Some(3000),
            forward_target: if oauth { Some("10.0.0.7:8080".into()) } else { None },
            configs,
        }
    }

    #[test]
    fn oauth_detection_scans_data_values() {
        let cm = ConfigMap {
            data: Some(btreemap! {
                "a.json".to_string() => r#"{"type": "oAuthApplicationUserAgent"}"#.to_string(),
            }),
            ..Default::default()
        };
        assert!(needs_oauth(&cm));
        let plain = ConfigMap {
            data: Some(btreemap! { "a.json".to_string() => "{}".to_string() }),
            ..Default::default()
        };
        assert!(!needs_oauth(&plain));
        assert!(!needs_oauth(&ConfigMap::default()));
    }

    #[test]
    fn pod_manifest_has_one_container_and_routing_labels() {
        let docs = render_manifest(&plan(WorkloadKind::Pod, false, false));
        // provision + dxp + workload
        assert_eq!(docs.len(), 3);
        let workload = &docs[2];
        assert_eq!(workload["kind"], "Pod");
        assert_eq!(workload["metadata"]["name"], "workload-hello");
        let labels = &workload["metadata"]["labels"];
        assert_eq!(labels["app"], "hello");
        assert_eq!(labels["domain"], "acme");
        assert_eq!(labels["managed-by"], "extcat");
        assert_eq!(labels["traefik.enable"], "true");
        assert_eq!(
            labels["traefik.http.services.hello-acme.loadbalancer.server.port"],
            "3000"
        );
        assert_eq!(
            labels["traefik.http.routers.hello-acme.rule"],
            "Host(`hello.acme.localtest.me`)"
        );
        assert_eq!(labels["traefik.http.routers.hello-acme.entrypoints"], "web");

        let spec = &workload["spec"];
        assert_eq!(spec["restartPolicy"], "Never");
        let containers = spec["containers"].as_array().unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0]["name"], "main");
        assert_eq!(containers[0]["image"], "acme/hello:latest");
        assert_eq!(containers[0]["imagePullPolicy"], "IfNotPresent");
        assert_eq!(containers[0]["env"][0]["name"], "MODE");
        assert_eq!(containers[0]["env"][0]["value"], "dev");
        // one volume and mount per referenced config object
        assert_eq!(spec["volumes"].as_array().unwrap().len(), 2);
        let mounts = containers[0]["volumeMounts"].as_array().unwrap();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0]["mountPath"], "/etc/liferay/lxc/ext-provision-metadata");
        assert_eq!(mounts[1]["mountPath"], "/etc/liferay/lxc/dxp-metadata");
    }

    #[test]
    fn oauth_manifest_gains_the_sidecar_and_init_document() {
        let docs = render_manifest(&plan(WorkloadKind::Pod, true, true));
        assert_eq!(docs.len(), 4);
        let workload = &docs[3];
        let containers = workload["spec"]["containers"].as_array().unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[1]["name"], "sidecar");
        assert_eq!(containers[1]["image"], "alpine/socat");
        let args = containers[1]["args"].as_array().unwrap();
        assert_eq!(args[0], "TCP-LISTEN:80,fork,bind=0.0.0.0");
        assert_eq!(args[1], "TCP:10.0.0.7:8080");
        assert_eq!(workload["spec"]["volumes"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn job_manifest_runs_to_completion() {
        let docs = render_manifest(&plan(WorkloadKind::Job, false, false));
        let workload = &docs[2];
        assert_eq!(workload["kind"], "Job");
        assert_eq!(workload["apiVersion"], "batch/v1");
        assert_eq!(workload["spec"]["ttlSecondsAfterFinished"], 60);
        assert_eq!(workload["spec"]["backoffLimit"], 0);
        let template = &workload["spec"]["template"];
        assert_eq!(template["spec"]["restartPolicy"], "Never");
        assert_eq!(template["metadata"]["labels"]["app"], "hello");
    }

    #[test]
    fn workload_without_port_has_no_routing_labels() {
        let mut p = plan(WorkloadKind::Pod, false, false);
        p.host_rule = None;
        p.target_port = None;
        let docs = render_manifest(&p);
        let labels = docs[2]["metadata"]["labels"].as_object().unwrap();
        assert!(labels.keys().all(|k| !k.starts_with("traefik.")));
    }

    #[test]
    fn yaml_stream_separates_documents() {
        let docs = render_manifest(&plan(WorkloadKind::Pod, false, true));
        let yaml = manifest_yaml(&docs).unwrap();
        assert_eq!(yaml.matches("---").count(), 4);
        assert!(yaml.contains("kind: ConfigMap"));
        assert!(yaml.contains("kind: Pod"));
    }

    #[test]
    fn config_documents_are_reduced_to_name_and_data() {
        let docs = render_manifest(&plan(WorkloadKind::Pod, false, false));
        let cm = &docs[0];
        assert_eq!(cm["kind"], "ConfigMap");
        assert_eq!(cm["metadata"]["name"], "hello-acme-lxc-ext-provision-metadata");
        assert!(cm["metadata"].get("labels").is_none());
        assert!(cm["data"]["x.client-extension-config.json"].is_string());
    }
}
