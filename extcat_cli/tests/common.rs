#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use extcat::engine::ContainerEngine;
use extcat::Result;

/// Author a bundle zip at `path` from (entry name, content) pairs
pub fn write_bundle(path: &Path, entries: &[(&str, &str)]) {
    let f = File::create(path).unwrap();
    let mut zw = zip::ZipWriter::new(f);
    let opts = zip::write::FileOptions::default();
    for (name, content) in entries {
        zw.start_file(*name, opts).unwrap();
        zw.write_all(content.as_bytes()).unwrap();
    }
    zw.finish().unwrap();
}

#[derive(Clone, Debug, PartialEq)]
pub enum EngineCall {
    Build { tag: String, context: PathBuf },
    KubeDown { manifest: PathBuf },
    KubePlay { manifest: PathBuf },
}

/// A container engine that records invocations instead of running them
#[derive(Clone, Default)]
pub struct RecordingEngine {
    calls: Arc<Mutex<Vec<EngineCall>>>,
    pub fail_down: bool,
    pub fail_play: bool,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerEngine for RecordingEngine {
    async fn build(&self, tag: &str, context: &Path) -> Result<()> {
        self.calls.lock().unwrap().push(EngineCall::Build {
            tag: tag.into(),
            context: context.into(),
        });
        Ok(())
    }

    async fn kube_down(&self, manifest: &Path) -> Result<()> {
        self.calls.lock().unwrap().push(EngineCall::KubeDown {
            manifest: manifest.into(),
        });
        if self.fail_down {
            return Err("no such workload".into());
        }
        Ok(())
    }

    async fn kube_play(&self, manifest: &Path) -> Result<()> {
        self.calls.lock().unwrap().push(EngineCall::KubePlay {
            manifest: manifest.into(),
        });
        if self.fail_play {
            return Err("play kube failed".into());
        }
        Ok(())
    }
}
