#![recursion_limit = "1024"]
#![allow(renamed_and_removed_lints)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;
extern crate serde_yaml;

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
        SerdeY(serde_yaml::Error);
        SerdeJ(serde_json::Error);
    }
    errors {
        InvalidDescriptor(pth: String) {
            description("LCP descriptor does not parse")
            display("LCP descriptor at '{}' does not parse", &pth)
        }
        InvalidExtensionName(name: String) {
            description("extension name not usable in the cluster")
            display("extension name '{}' not usable in the cluster", &name)
        }
    }
}

/// The LiferayExtension custom resource
pub mod extension;
pub use crate::extension::{Extension, LiferayExtension};

/// Status subresource and the deployment phase lattice
pub mod status;
pub use crate::status::{ExtensionStatus, LcpSummary, Phase};

/// The LCP descriptor shipped inside bundles
pub mod lcp;
pub use crate::lcp::{LcpDescriptor, LoadBalancer, WorkloadKind};

/// Label and annotation vocabulary, name sanitizing, host rules
pub mod metadata;
pub use crate::metadata::MetadataType;
