use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{ErrorKind, Result};

/// The container engine capability.
///
/// Everything the operator needs from the engine cli: building bundle
/// images and materializing / tearing down workloads from a manifest
/// file. Injected so tests can substitute a recording fake.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// `build -t <tag> <context>`
    async fn build(&self, tag: &str, context: &Path) -> Result<()>;
    /// `kube down <manifest>`; stderr is dropped, callers ignore failure
    async fn kube_down(&self, manifest: &Path) -> Result<()>;
    /// `play kube --replace <manifest>`
    async fn kube_play(&self, manifest: &Path) -> Result<()>;
}

/// Tear down any previous instance of the manifest, then replace it.
///
/// Teardown failures are expected on first deployment and suppressed.
pub async fn materialize(engine: &dyn ContainerEngine, manifest: &Path) -> Result<()> {
    if let Err(e) = engine.kube_down(manifest).await {
        debug!("Teardown of {} skipped: {}", manifest.display(), e);
    }
    engine.kube_play(manifest).await
}

/// The real engine, shelling out to podman
pub struct Podman {
    bin: String,
}

impl Podman {
    pub fn new() -> Self {
        Podman { bin: "podman".into() }
    }
}

impl Default for Podman {
    fn default() -> Self {
        Podman::new()
    }
}

impl Podman {
    async fn pexec(&self, args: &[&str], quiet: bool) -> Result<()> {
        let rendered = format!("{} {}", self.bin, args.join(" "));
        debug!("{}", rendered);
        let mut cmd = Command::new(&self.bin);
        cmd.args(args);
        if quiet {
            cmd.stderr(Stdio::null());
        }
        let s = cmd.status().await?;
        if !s.success() {
            bail!(ErrorKind::SubprocessFailure(rendered, s.code().unwrap_or(1001)));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerEngine for Podman {
    async fn build(&self, tag: &str, context: &Path) -> Result<()> {
        let ctx = context.display().to_string();
        self.pexec(&["build", "-t", tag, &ctx], false).await
    }

    async fn kube_down(&self, manifest: &Path) -> Result<()> {
        let file = manifest.display().to_string();
        self.pexec(&["kube", "down", &file], true).await
    }

    async fn kube_play(&self, manifest: &Path) -> Result<()> {
        let file = manifest.display().to_string();
        self.pexec(&["play", "kube", "--replace", &file], false).await
    }
}
