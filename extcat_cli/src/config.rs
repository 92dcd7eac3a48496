use std::env;
use std::path::PathBuf;
use std::time::Duration;

use super::Result;

/// Identifier stamped into the `managed-by` label of every workload
pub static OPERATOR_ID: &str = "extcat";

/// Runtime configuration, resolved from the environment once at startup.
///
/// Every knob has the default the compose recipe ships with, so a bare
/// `extcat run` works inside the paved container.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Root of the bundle input tree
    pub input_dir: PathBuf,
    /// Scratch root for bundle extraction, scoped per resource below it
    pub temp_dir: PathBuf,
    /// Directory the workload manifests are written to
    pub manifest_dir: PathBuf,
    /// Namespace the extension resources and config objects live in
    pub namespace: String,
    /// Dns suffix for computed host rules
    pub cluster_domain: String,
    /// Forwarder target host for the oauth sidecar
    pub liferay_host: String,
    /// Forwarder target port for the oauth sidecar
    pub liferay_port: u16,
    /// Sleep between input tree scans
    pub scan_interval: Duration,
}

fn evar_or(key: &str, fallback: &str) -> String {
    env::var(key).unwrap_or_else(|_| fallback.into())
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self> {
        let interval: u64 = evar_or("EXTCAT_SCAN_INTERVAL", "5")
            .parse()
            .map_err(|e| format!("EXTCAT_SCAN_INTERVAL must be seconds: {}", e))?;
        let port: u16 = evar_or("LIFERAY_SERVICE_PORT", "8080")
            .parse()
            .map_err(|e| format!("LIFERAY_SERVICE_PORT must be a port: {}", e))?;
        Ok(OperatorConfig {
            input_dir: evar_or("EXTCAT_INPUT_DIR", "/client-extensions").into(),
            temp_dir: evar_or("EXTCAT_TEMP_DIR", "/tmp/processing").into(),
            manifest_dir: evar_or("EXTCAT_MANIFEST_DIR", "/tmp/live-manifests").into(),
            namespace: evar_or("NAMESPACE", "default"),
            cluster_domain: evar_or("EXTCAT_CLUSTER_DOMAIN", "localtest.me"),
            liferay_host: evar_or("LIFERAY_SERVICE_HOST", "liferay"),
            liferay_port: port,
            scan_interval: Duration::from_secs(interval),
        })
    }
}
