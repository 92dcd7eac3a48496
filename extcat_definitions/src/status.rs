use std::fmt;

use chrono::{SecondsFormat, Utc};

use crate::lcp::LcpDescriptor;

pub fn make_date() -> String {
    // Format == `1996-12-19T16:39:57-08:00`, but we hardcode Utc herein.
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Phases a LiferayExtension moves through.
///
/// ```text
///   (none) -> Building -> BuildReady -> Deploying -> Running | Completed
///                  \                         \
///                   Failed                    Failed
/// ```
///
/// Transitions are monotonic within one reconciliation attempt; a new
/// spec hash resets the resource to Building.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Phase {
    Building,
    BuildReady,
    Deploying,
    Running,
    Completed,
    Failed,
}

impl Phase {
    /// Whether a reconciliation attempt may stop at this phase
    pub fn is_terminal(&self) -> bool {
        match self {
            Phase::BuildReady | Phase::Running | Phase::Completed | Phase::Failed => true,
            Phase::Building | Phase::Deploying => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Phase::Building => "Building",
            Phase::BuildReady => "BuildReady",
            Phase::Deploying => "Deploying",
            Phase::Running => "Running",
            Phase::Completed => "Completed",
            Phase::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

/// Status object for the liferayextensions crd
///
/// All fields optional, patched through the status subresource only.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionStatus {
    /// Current phase in the lattice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    /// Image tag the bundle was built into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Ingress url when the bundle exposes a load balanced port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// One sentence error message when phase is Failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Digest of the LCP descriptor found inside the bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lcp: Option<LcpSummary>,

    /// When the phase was last written (RFC 3339 timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<String>,
}

/// The user visible subset of an LCP descriptor
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct LcpSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Workload shape, verbatim from the descriptor `kind`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub env: std::collections::BTreeMap<String, serde_json::Value>,
}

impl LcpSummary {
    pub fn from_descriptor(lcp: &LcpDescriptor) -> Self {
        LcpSummary {
            id: lcp.id.clone(),
            kind: lcp.kind.clone(),
            target_port: lcp.load_balancer.target_port,
            memory: lcp.memory.clone(),
            cpu: lcp.cpu.clone(),
            env: lcp.env.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExtensionStatus, LcpSummary, Phase};
    use crate::lcp::LcpDescriptor;

    #[test]
    fn phase_serializes_as_bare_string() {
        let encoded = serde_json::to_string(&Phase::BuildReady).unwrap();
        assert_eq!(encoded, "\"BuildReady\"");
        let back: Phase = serde_json::from_str("\"Running\"").unwrap();
        assert_eq!(back, Phase::Running);
    }

    #[test]
    fn terminal_phases() {
        assert!(!Phase::Building.is_terminal());
        assert!(!Phase::Deploying.is_terminal());
        assert!(Phase::BuildReady.is_terminal());
        assert!(Phase::Running.is_terminal());
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Failed.is_terminal());
    }

    #[test]
    fn summary_renames_kind_to_type() {
        let lcp: LcpDescriptor =
            serde_json::from_str(r#"{"id": "hello", "kind": "Job"}"#).unwrap();
        let summary = LcpSummary::from_descriptor(&lcp);
        let encoded = serde_json::to_string(&summary).unwrap();
        assert!(encoded.contains("\"type\":\"Job\""));
        assert!(!encoded.contains("\"kind\""));
    }

    #[test]
    fn status_skips_unset_fields() {
        let status = ExtensionStatus {
            phase: Some(Phase::Building),
            ..Default::default()
        };
        let encoded = serde_json::to_string(&status).unwrap();
        assert_eq!(encoded, "{\"phase\":\"Building\"}");
    }
}
