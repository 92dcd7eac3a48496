use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::{Api, Meta, PostParams},
    client::APIClient,
};
use serde::Serialize;
use serde_json::Value;
use walkdir::WalkDir;

use extcat_definitions::{metadata, LcpDescriptor, LcpSummary, LiferayExtension, Phase};

use super::{
    engine::ContainerEngine,
    status::{StatusReporter, StatusUpdate},
    ErrorKind, FingerprintStore, OperatorConfig, Result, ResultExt,
};

/// Extract a bundle archive into a clean destination directory
pub fn extract_zip(zip_path: &Path, dest: &Path) -> Result<()> {
    let f = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(f)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let outpath = dest.join(entry.mangled_name());
        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&outpath)?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

/// First `LCP.json` under the extract tree, empty descriptor on absence.
///
/// A descriptor that fails to parse behaves like an absent one; the rest
/// of the build still has a usable bundle without it.
pub fn find_lcp(root: &Path) -> LcpDescriptor {
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() && entry.file_name().to_str() == Some("LCP.json") {
            return match LcpDescriptor::read(entry.path()) {
                Ok(lcp) => lcp,
                Err(e) => {
                    warn!("Could not parse {}: {}", entry.path().display(), e);
                    LcpDescriptor::default()
                }
            };
        }
    }
    LcpDescriptor::default()
}

/// Every `*.client-extension-config.json` under the extract tree
pub fn find_client_configs(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.ends_with(metadata::CLIENT_CONFIG_SUFFIX))
                .unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    found.sort();
    found
}

/// Serialize a json value indented by 4, the way dxp expects config files
fn to_json4(value: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8(buf).expect("serde_json emits utf8"))
}

/// Rewrite one client extension config for the provision object.
///
/// Every top level mapping gets `baseURL` pointed at the host rule, and
/// an existing `homePageURL` overwritten with the same url (forcing http
/// so dxp does not auto-upgrade to https against a plain ingress). A file
/// that does not parse is carried into the provision data verbatim.
pub fn rewrite_client_config(raw: &str, url: Option<&str>) -> String {
    let mut doc: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("Client extension config does not parse, keeping verbatim: {}", e);
            return raw.to_string();
        }
    };
    if let (Some(url), Some(entries)) = (url, doc.as_object_mut()) {
        for def in entries.values_mut() {
            if let Some(obj) = def.as_object_mut() {
                obj.insert("baseURL".into(), Value::String(url.into()));
                if obj.contains_key("homePageURL") {
                    obj.insert("homePageURL".into(), Value::String(url.into()));
                }
            }
        }
    }
    to_json4(&doc).unwrap_or_else(|_| raw.to_string())
}

/// Assemble the provision config object for a built bundle
pub fn provision_configmap(
    instance: &str,
    service: &str,
    namespace: &str,
    zip_hash: &str,
    lcp: &LcpDescriptor,
    host_rule: Option<&str>,
    data: BTreeMap<String, String>,
) -> Result<ConfigMap> {
    let mut labels = BTreeMap::new();
    labels.insert(metadata::METADATA_TYPE_LABEL.to_string(), "ext-provision".to_string());
    labels.insert(metadata::VIRTUAL_INSTANCE_LABEL.to_string(), instance.to_string());
    labels.insert(metadata::SERVICE_ID_LABEL.to_string(), service.to_string());

    let mut annotations = BTreeMap::new();
    annotations.insert(metadata::ZIP_HASH_ANNOTATION.to_string(), zip_hash.to_string());
    annotations.insert(metadata::LCP_JSON_ANNOTATION.to_string(), serde_json::to_string(lcp)?);
    if let Some(host) = host_rule {
        annotations.insert(metadata::DOMAINS_ANNOTATION.to_string(), host.to_string());
        annotations.insert(metadata::MAIN_DOMAIN_ANNOTATION.to_string(), host.to_string());
    }

    Ok(ConfigMap {
        metadata: Some(ObjectMeta {
            name: Some(metadata::provision_name(service, instance)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        }),
        data: Some(data),
        ..Default::default()
    })
}

/// Create-then-replace-on-conflict, the only upsert the api offers here
pub async fn upsert_configmap(api: &Api<ConfigMap>, cm: &ConfigMap) -> Result<()> {
    let name = Meta::name(cm);
    let pp = PostParams::default();
    match api.create(&pp, cm).await {
        Ok(_) => {
            info!("Created config object {}", name);
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            info!("Config object {} exists, replacing", name);
            api.replace(&name, &pp, cm).await.map_err(ErrorKind::KubeError)?;
            Ok(())
        }
        Err(e) => Err(ErrorKind::KubeError(e).into()),
    }
}

/// Everything the build produced, for the BuildReady status
pub struct BuildOutcome {
    pub image: String,
    pub url: Option<String>,
    pub lcp: LcpDescriptor,
}

/// Turns an extension resource into an image and a provision object.
///
/// Triggered on every create/update of the resource. `Zip file missing`
/// is permanent until the spec changes; every later failure marks the
/// resource Failed and re-raises so the caller sees it.
pub struct BuildController {
    cms: Api<ConfigMap>,
    engine: Arc<dyn ContainerEngine>,
    reporter: StatusReporter,
    cfg: OperatorConfig,
    /// Spec hashes already attempted this process; status patches echo
    /// back as MODIFIED events and must not re-trigger the build
    attempted: FingerprintStore,
}

impl BuildController {
    pub fn new(
        client: APIClient,
        engine: Arc<dyn ContainerEngine>,
        reporter: StatusReporter,
        cfg: OperatorConfig,
    ) -> Self {
        let cms = Api::namespaced(client, &cfg.namespace);
        BuildController {
            cms,
            engine,
            reporter,
            cfg,
            attempted: FingerprintStore::new(),
        }
    }

    pub async fn reconcile(&self, lex: &LiferayExtension) -> Result<()> {
        let name = Meta::name(lex);
        if self.attempted.get(&name).as_deref() == Some(lex.spec.zip_hash.as_str()) {
            debug!("Already reconciled {} at {}", name, lex.spec.zip_hash);
            return Ok(());
        }
        self.attempted.set(&name, &lex.spec.zip_hash);

        let source = PathBuf::from(&lex.spec.source_path);
        if !source.exists() {
            warn!("Bundle for {} vanished from {}", name, source.display());
            let mut update = StatusUpdate::new(Phase::Failed);
            update.message = Some(ErrorKind::MissingZip(source.display().to_string()).to_string());
            self.reporter.publish(&name, update).await;
            return Ok(()); // permanent until the spec changes
        }

        info!("Building {} from {}", name, source.display());
        self.reporter.publish(&name, StatusUpdate::new(Phase::Building)).await;

        let instance = match source
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|s| s.to_str())
        {
            Some(dir) => metadata::sanitize(dir),
            None => {
                let mut update = StatusUpdate::new(Phase::Failed);
                update.message = Some("Bundle path has no parent directory".into());
                self.reporter.publish(&name, update).await;
                bail!("bundle path {} has no parent directory", source.display());
            }
        };

        let scratch = self.cfg.temp_dir.join(&instance).join(&name);
        let res = self.build(&name, &instance, &source, &scratch, &lex.spec.zip_hash).await;
        if scratch.exists() {
            let _ = fs::remove_dir_all(&scratch);
        }
        match res {
            Ok(outcome) => {
                let mut update = StatusUpdate::new(Phase::BuildReady);
                update.image = Some(outcome.image);
                update.url = outcome.url;
                update.lcp = Some(LcpSummary::from_descriptor(&outcome.lcp));
                self.reporter.publish(&name, update).await;
                Ok(())
            }
            Err(e) => {
                let mut update = StatusUpdate::new(Phase::Failed);
                update.message = Some(e.to_string());
                self.reporter.publish(&name, update).await;
                Err(e)
            }
        }
    }

    async fn build(
        &self,
        name: &str,
        instance: &str,
        source: &Path,
        scratch: &Path,
        zip_hash: &str,
    ) -> Result<BuildOutcome> {
        if scratch.exists() {
            fs::remove_dir_all(scratch)?;
        }
        fs::create_dir_all(scratch)?;
        extract_zip(source, scratch)?;

        let lcp = find_lcp(scratch);
        let service = lcp
            .id
            .as_ref()
            .map(|id| metadata::sanitize(id))
            .unwrap_or_else(|| name.to_string());

        let image = format!("{}/{}:latest", instance, service).to_lowercase();
        if scratch.join("Dockerfile").exists() {
            self.engine
                .build(&image, scratch)
                .await
                .chain_err(|| ErrorKind::BuildFailure(image.clone()))?;
        } else {
            debug!("No Dockerfile in {}, skipping image build", name);
        }

        let host_rule = lcp
            .load_balancer
            .target_port
            .map(|_| metadata::host_rule(&service, instance, &self.cfg.cluster_domain));
        let url = host_rule.as_ref().map(|h| format!("http://{}", h));

        let mut data = BTreeMap::new();
        for pth in find_client_configs(scratch) {
            let filename = match pth.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            let raw = fs::read_to_string(&pth)?;
            data.insert(filename, rewrite_client_config(&raw, url.as_deref()));
        }

        let cm = provision_configmap(
            instance,
            &service,
            &self.cfg.namespace,
            zip_hash,
            &lcp,
            host_rule.as_deref(),
            data,
        )?;
        upsert_configmap(&self.cms, &cm).await?;

        Ok(BuildOutcome { image, url, lcp })
    }
}
