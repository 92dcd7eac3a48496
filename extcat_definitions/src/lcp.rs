use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use serde_json::Value;

use super::{ErrorKind, Result, ResultExt};

/// Workload shapes a bundle can deploy as.
///
/// The manifest assembler dispatches on this tag; there is no common
/// behaviour between the two beyond sharing containers and volumes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum WorkloadKind {
    /// A long lived pod
    Pod,
    /// A run-to-completion batch job
    Job,
}

impl Default for WorkloadKind {
    fn default() -> Self {
        WorkloadKind::Pod
    }
}

/// The `LCP.json` manifest shipped inside a bundle.
///
/// Everything is optional; a bundle without the file behaves as if it
/// contained `{}`. Unknown keys are ignored.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct LcpDescriptor {
    /// Override for the service id used in image naming
    pub id: Option<String>,

    /// `"Service"` (default) or `"Job"`, matched case-insensitively
    pub kind: Option<String>,

    /// Environment passed to the main container, values stringified
    pub env: BTreeMap<String, Value>,

    pub load_balancer: LoadBalancer,

    pub memory: Option<Value>,
    pub cpu: Option<Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct LoadBalancer {
    pub target_port: Option<i32>,
}

impl LcpDescriptor {
    /// Read a descriptor from an `LCP.json` file
    pub fn read(path: &Path) -> Result<Self> {
        let f = File::open(path)?;
        let lcp: LcpDescriptor = serde_json::from_reader(f)
            .chain_err(|| ErrorKind::InvalidDescriptor(path.display().to_string()))?;
        debug!("Read LCP descriptor from {}", path.display());
        Ok(lcp)
    }

    /// The workload shape this descriptor asks for
    ///
    /// Job iff `kind` equals `"job"` case-insensitively, Pod otherwise.
    pub fn workload(&self) -> WorkloadKind {
        match &self.kind {
            Some(k) if k.eq_ignore_ascii_case("job") => WorkloadKind::Job,
            _ => WorkloadKind::Pod,
        }
    }

    /// Env mapping with scalar values stringified for container env vars
    pub fn env_strings(&self) -> BTreeMap<String, String> {
        self.env
            .iter()
            .map(|(k, v)| {
                let s = match v {
                    Value::String(s) => s.clone(),
                    v => v.to_string(),
                };
                (k.clone(), s)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{LcpDescriptor, WorkloadKind};

    #[test]
    fn empty_document_is_a_valid_descriptor() {
        let lcp: LcpDescriptor = serde_json::from_str("{}").unwrap();
        assert_eq!(lcp.id, None);
        assert_eq!(lcp.workload(), WorkloadKind::Pod);
        assert_eq!(lcp.load_balancer.target_port, None);
        assert!(lcp.env.is_empty());
    }

    #[test]
    fn full_descriptor_parses() {
        let raw = r#"{
            "id": "hello",
            "kind": "Service",
            "env": {"PORT": 3000, "MODE": "dev"},
            "loadBalancer": {"targetPort": 3000},
            "memory": "512Mi",
            "cpu": 0.5,
            "somethingNewer": {"ignored": true}
        }"#;
        let lcp: LcpDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(lcp.id.as_deref(), Some("hello"));
        assert_eq!(lcp.workload(), WorkloadKind::Pod);
        assert_eq!(lcp.load_balancer.target_port, Some(3000));
        let env = lcp.env_strings();
        assert_eq!(env["PORT"], "3000");
        assert_eq!(env["MODE"], "dev");
    }

    #[test]
    fn job_kind_matches_case_insensitively() {
        for kind in &["Job", "job", "JOB"] {
            let raw = format!(r#"{{"kind": "{}"}}"#, kind);
            let lcp: LcpDescriptor = serde_json::from_str(&raw).unwrap();
            assert_eq!(lcp.workload(), WorkloadKind::Job);
        }
        let lcp: LcpDescriptor = serde_json::from_str(r#"{"kind": "jobber"}"#).unwrap();
        assert_eq!(lcp.workload(), WorkloadKind::Pod);
    }
}
