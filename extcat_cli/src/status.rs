use kube::{
    api::{Api, PatchParams},
    client::APIClient,
};
use serde_json::Value;

use extcat_definitions::{status::make_date, LcpSummary, LiferayExtension, Phase};

use super::{ErrorKind, Result};

/// One step through the phase lattice, with whatever came out of it
#[derive(Clone, Debug)]
pub struct StatusUpdate {
    pub phase: Phase,
    pub image: Option<String>,
    pub url: Option<String>,
    pub message: Option<String>,
    pub lcp: Option<LcpSummary>,
}

impl StatusUpdate {
    pub fn new(phase: Phase) -> Self {
        StatusUpdate {
            phase,
            image: None,
            url: None,
            message: None,
            lcp: None,
        }
    }
}

/// Every field is written on every patch; absent values are explicit
/// nulls so a fresh reconciliation wipes stale data from the last one.
fn status_patch(update: &StatusUpdate) -> Value {
    json!({
        "status": {
            "phase": update.phase,
            "image": update.image,
            "url": update.url,
            "message": update.message,
            "lcp": update.lcp,
            "lastTransition": make_date(),
        }
    })
}

/// Patches the status subresource of extension resources.
///
/// Best effort by contract: api failures are logged and swallowed, and
/// never interrupt the controller that reported the phase.
#[derive(Clone)]
pub struct StatusReporter {
    api: Api<LiferayExtension>,
}

impl StatusReporter {
    pub fn new(client: APIClient, namespace: &str) -> Self {
        StatusReporter {
            api: Api::namespaced(client, namespace),
        }
    }

    pub async fn publish(&self, name: &str, update: StatusUpdate) {
        debug!("Status {} -> {}", name, update.phase);
        if let Err(e) = self.try_publish(name, &update).await {
            warn!("Status patch for {} -> {} failed: {}", name, update.phase, e);
        }
    }

    async fn try_publish(&self, name: &str, update: &StatusUpdate) -> Result<()> {
        let patch = serde_json::to_vec(&status_patch(update))?;
        self.api
            .patch_status(name, &PatchParams::default(), patch)
            .await
            .map_err(ErrorKind::KubeError)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{status_patch, StatusUpdate};
    use extcat_definitions::Phase;

    #[test]
    fn patch_carries_phase_and_nulls_the_rest() {
        let patch = status_patch(&StatusUpdate::new(Phase::Building));
        let status = &patch["status"];
        assert_eq!(status["phase"], "Building");
        assert!(status["image"].is_null());
        assert!(status["url"].is_null());
        assert!(status["message"].is_null());
        assert!(status["lcp"].is_null());
        assert!(status["lastTransition"].is_string());
    }

    #[test]
    fn patch_records_build_outputs() {
        let mut update = StatusUpdate::new(Phase::BuildReady);
        update.image = Some("acme/hello:latest".into());
        update.url = Some("http://hello.acme.localtest.me".into());
        let patch = status_patch(&update);
        assert_eq!(patch["status"]["image"], "acme/hello:latest");
        assert_eq!(patch["status"]["url"], "http://hello.acme.localtest.me");
    }

    #[test]
    fn failure_patch_carries_the_message() {
        let mut update = StatusUpdate::new(Phase::Failed);
        update.message = Some("Zip file missing".into());
        let patch = status_patch(&update);
        assert_eq!(patch["status"]["phase"], "Failed");
        assert_eq!(patch["status"]["message"], "Zip file missing");
    }
}
