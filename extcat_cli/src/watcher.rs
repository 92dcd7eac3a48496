use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use futures_timer::Delay;
use kube::{
    api::{Api, PatchParams, PostParams},
    client::APIClient,
};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use extcat_definitions::{metadata, Extension, LiferayExtension};

use super::{ErrorKind, FingerprintStore, OperatorConfig, Result};

/// A zip file found under the input tree
#[derive(Clone, Debug, PartialEq)]
pub struct Bundle {
    /// Sanitized file stem; doubles as the extension resource name
    pub name: String,
    /// Sanitized base name of the parent directory
    pub virtual_instance: String,
    pub path: PathBuf,
    /// SHA-256 hex digest of the file contents
    pub hash: String,
}

/// SHA-256 hex digest of a file on disk
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut f = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut f, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Scan the input tree for bundles.
///
/// Recognized entries are regular files with a `.zip` suffix; the parent
/// directory supplies the virtual instance id. Unreadable files are
/// logged and skipped, never fatal.
pub fn scan_bundles(root: &Path) -> Vec<Bundle> {
    let mut found = vec![];
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("zip") {
            continue;
        }
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s,
            None => continue,
        };
        let parent = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        match file_sha256(path) {
            Ok(hash) => found.push(Bundle {
                name: metadata::sanitize(stem),
                virtual_instance: metadata::sanitize(parent),
                path: path.to_path_buf(),
                hash,
            }),
            Err(e) => warn!("Skipping unreadable bundle {}: {}", path.display(), e),
        }
    }
    found
}

/// Background worker keeping the extension collection in sync with disk.
///
/// The watcher never writes the fingerprint store; the CR mirror confirms
/// each write by ingesting the resulting cluster event, so an unconfirmed
/// upsert is simply retried on the next tick.
pub struct Watcher {
    api: Api<LiferayExtension>,
    store: FingerprintStore,
    cfg: OperatorConfig,
}

impl Watcher {
    pub fn new(client: APIClient, store: FingerprintStore, cfg: OperatorConfig) -> Self {
        let api = Api::namespaced(client, &cfg.namespace);
        Watcher { api, store, cfg }
    }

    /// Scan forever, sleeping `scan_interval` between passes
    pub async fn run(self) {
        info!(
            "Watching {} every {}s",
            self.cfg.input_dir.display(),
            self.cfg.scan_interval.as_secs()
        );
        loop {
            if let Err(e) = self.scan_once().await {
                warn!("Scan pass failed: {}", e);
            }
            Delay::new(self.cfg.scan_interval).await;
        }
    }

    /// One pass over the input tree; returns how many upserts were attempted
    pub async fn scan_once(&self) -> Result<usize> {
        let mut upserts = 0;
        for bundle in scan_bundles(&self.cfg.input_dir) {
            if self.store.get(&bundle.name).as_deref() == Some(bundle.hash.as_str()) {
                continue;
            }
            upserts += 1;
            if let Err(e) = self.upsert(&bundle).await {
                // retried next tick; the mirror never confirmed this write
                warn!("Upsert of {} failed: {}", bundle.name, e);
            }
        }
        Ok(upserts)
    }

    async fn upsert(&self, bundle: &Bundle) -> Result<()> {
        let source = bundle.path.display().to_string();
        match self.api.get(&bundle.name).await {
            Ok(existing) => {
                if existing.spec.zip_hash == bundle.hash {
                    return Ok(());
                }
                debug!("Patching {} with new hash {}", bundle.name, bundle.hash);
                let patch = json!({
                    "spec": {
                        "sourcePath": source,
                        "zipHash": bundle.hash,
                    }
                });
                self.api
                    .patch(&bundle.name, &PatchParams::default(), serde_json::to_vec(&patch)?)
                    .await
                    .map_err(ErrorKind::KubeError)?;
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                info!("Creating LiferayExtension {} for {}", bundle.name, source);
                let lex = LiferayExtension::new(&bundle.name, Extension::new(&source, &bundle.hash));
                self.api
                    .create(&PostParams::default(), &lex)
                    .await
                    .map_err(ErrorKind::KubeError)?;
            }
            Err(e) => return Err(ErrorKind::KubeError(e).into()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{file_sha256, scan_bundles};
    use std::fs;

    #[test]
    fn scan_finds_zips_and_derives_identity() {
        let dir = tempfile::tempdir().unwrap();
        let instance = dir.path().join("Acme_Corp");
        fs::create_dir_all(&instance).unwrap();
        fs::write(instance.join("My_App.zip"), b"not really a zip").unwrap();
        fs::write(instance.join("notes.txt"), b"ignored").unwrap();

        let found = scan_bundles(dir.path());
        assert_eq!(found.len(), 1);
        let bundle = &found[0];
        assert_eq!(bundle.name, "my-app");
        assert_eq!(bundle.virtual_instance, "acme-corp");
        assert_eq!(bundle.hash, file_sha256(&bundle.path).unwrap());
    }

    #[test]
    fn hash_tracks_content() {
        let dir = tempfile::tempdir().unwrap();
        let pth = dir.path().join("a.zip");
        fs::write(&pth, b"one").unwrap();
        let first = file_sha256(&pth).unwrap();
        fs::write(&pth, b"two").unwrap();
        let second = file_sha256(&pth).unwrap();
        assert_ne!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn scan_of_missing_root_is_empty() {
        let found = scan_bundles(std::path::Path::new("/definitely/not/here"));
        assert!(found.is_empty());
    }
}
