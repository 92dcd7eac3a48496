use std::fmt;

// Label vocabulary on cluster config objects
pub static METADATA_TYPE_LABEL: &str = "lxc.liferay.com/metadataType";
pub static VIRTUAL_INSTANCE_LABEL: &str = "dxp.lxc.liferay.com/virtualInstanceId";
pub static SERVICE_ID_LABEL: &str = "ext.lxc.liferay.com/serviceId";

// Annotations on provision objects
pub static ZIP_HASH_ANNOTATION: &str = "lxc.liferay.com/zip-hash";
pub static LCP_JSON_ANNOTATION: &str = "lxc.liferay.com/lcp-json";
pub static DOMAINS_ANNOTATION: &str = "ext.lxc.liferay.com/domains";
pub static MAIN_DOMAIN_ANNOTATION: &str = "ext.lxc.liferay.com/mainDomain";

/// Data values containing either marker require an init object and the
/// traffic forwarding sidecar before deployment.
pub static OAUTH_MARKERS: [&str; 2] = ["oAuthApplicationHeadlessServer", "oAuthApplicationUserAgent"];

/// Suffix of config files inside bundles that become provision data
pub static CLIENT_CONFIG_SUFFIX: &str = ".client-extension-config.json";

/// The three classes of config objects the operator joins per workload.
///
/// Provision objects are written by the build controller; init and dxp
/// objects arrive from out-of-band systems and are only read.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum MetadataType {
    ExtProvision,
    ExtInit,
    Dxp,
}

impl MetadataType {
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "ext-provision" => Some(MetadataType::ExtProvision),
            "ext-init" => Some(MetadataType::ExtInit),
            "dxp" => Some(MetadataType::Dxp),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            MetadataType::ExtProvision => "ext-provision",
            MetadataType::ExtInit => "ext-init",
            MetadataType::Dxp => "dxp",
        };
        write!(f, "{}", s)
    }
}

/// Sanitize a bundle or instance name into a cluster-safe identifier
///
/// Lowercased, with `_` and `.` replaced by `-`. Matches dns label rules
/// for everything the watcher produces from file names.
pub fn sanitize(name: &str) -> String {
    name.to_lowercase().replace('_', "-").replace('.', "-")
}

/// The dns name used for ingress routing and config url rewriting
pub fn host_rule(service_id: &str, virtual_instance_id: &str, cluster_domain: &str) -> String {
    format!("{}.{}.{}", service_id, virtual_instance_id, cluster_domain)
}

/// Name of the provision config object for a (virtual instance, service)
pub fn provision_name(service_id: &str, virtual_instance_id: &str) -> String {
    format!(
        "{}-{}-lxc-ext-provision-metadata",
        sanitize(service_id),
        sanitize(virtual_instance_id)
    )
}

/// Name of the workload (and its manifest file stem) for a service
pub fn workload_name(service_id: &str) -> String {
    format!("workload-{}", sanitize(service_id))
}
