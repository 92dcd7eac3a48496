#![recursion_limit = "1024"]
#![allow(renamed_and_removed_lints)]

extern crate serde;
extern crate serde_yaml;

#[macro_use]
extern crate serde_json;

#[macro_use]
extern crate log;

#[macro_use]
extern crate error_chain;
error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    links {}
    foreign_links {
        Fmt(::std::fmt::Error);
        Io(::std::io::Error) #[cfg(unix)];
        Defs(extcat_definitions::Error);
        SerdeY(serde_yaml::Error);
        SerdeJ(serde_json::Error);
        Zip(zip::result::ZipError);
    }
    errors {
        KubeError(e: kube::Error) {
            description("kube api call failed")
            display("kube api call failed: {}", e)
        }
        MissingZip(pth: String) {
            description("bundle zip not on disk")
            display("Zip file missing")
        }
        SubprocessFailure(cmd: String, code: i32) {
            description("subprocess returned non-zero")
            display("subprocess '{}' failed with exit code {}", &cmd, code)
        }
        BuildFailure(tag: String) {
            description("image build failed")
            display("image build for {} failed", &tag)
        }
        DeployFailure(workload: String) {
            description("workload failed to materialize")
            display("workload {} failed to materialize", &workload)
        }
    }
}

pub use extcat_definitions::{
    Extension, ExtensionStatus, LcpDescriptor, LiferayExtension, MetadataType, Phase, WorkloadKind,
};

/// Environment driven operator configuration
pub mod config;
pub use crate::config::OperatorConfig;

/// Process-wide bundle name to content hash mirror
pub mod fingerprint;
pub use crate::fingerprint::FingerprintStore;

/// Periodic scan of the input tree, upserting extension resources
pub mod watcher;

/// Event driven mirror of the extension collection
pub mod mirror;
pub use crate::mirror::CrMirror;

/// Label-keyed indices over cluster config objects
pub mod indices;
pub use crate::indices::ConfigMapIndices;

/// The container engine capability (build / kube down / play kube)
pub mod engine;
pub use crate::engine::{ContainerEngine, Podman};

/// Build controller: bundle to image and provision object
pub mod build;

/// Deployment controller: three-stream fan-in to a workload
pub mod deploy;

/// Status subresource patching
pub mod status;
pub use crate::status::StatusReporter;

/// The event loop owning indices and subscriptions
pub mod operator;
