use kube_derive::CustomResource;

use crate::status::ExtensionStatus;

/// Desired state for one client extension bundle.
///
/// One resource exists per bundle file found under the input tree; the
/// resource name is the sanitized bundle file name. The directory watcher
/// owns the spec, the controllers own the status.
#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "lxc.liferay.com",
    kind = "LiferayExtension",
    version = "v1",
    namespaced,
    shortname = "lex",
    status = "ExtensionStatus",
    printcolumn = r#"{"name":"Phase", "jsonPath": ".status.phase", "type": "string", "description": "Where the bundle is in the build/deploy lattice"}"#,
    printcolumn = r#"{"name":"Image", "jsonPath": ".status.image", "type": "string", "description": "The image built from the bundle"}"#,
    printcolumn = r#"{"name":"Url", "jsonPath": ".status.url", "type": "string", "description": "Ingress url when the bundle exposes a port"}"#
)]
#[kube(apiextensions = "v1beta1")] // kubernetes < 1.16
pub struct Extension {
    /// Absolute path of the bundle zip on the shared volume
    ///
    /// ```yaml
    /// sourcePath: /client-extensions/acme/hello.zip
    /// ```
    #[serde(default)]
    pub source_path: String,

    /// SHA-256 hex digest of the bundle contents
    ///
    /// Written by the watcher; a change here restarts the build.
    #[serde(default)]
    pub zip_hash: String,
}

impl Extension {
    pub fn new(source_path: &str, zip_hash: &str) -> Self {
        Extension {
            source_path: source_path.into(),
            zip_hash: zip_hash.into(),
        }
    }
}
