use crate::error::{Error, Result};

use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, Patch, PatchOperation};
use k8s_openapi::api::core::v1::Container;

pub const DEFAULT_SIDECAR_NAME: &str = "sidecar-container";
pub const DEFAULT_SIDECAR_IMAGE: &str = "busybox:latest";
pub const DEFAULT_SIDECAR_ARGS: [&str; 2] = ["sleep", "3600"];

/// The container appended to pods in opted-in namespaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarSpec {
    pub name: String,
    pub image: String,
    pub args: Vec<String>,
}

impl Default for SidecarSpec {
    fn default() -> Self {
        Self {
            name: DEFAULT_SIDECAR_NAME.to_string(),
            image: DEFAULT_SIDECAR_IMAGE.to_string(),
            args: DEFAULT_SIDECAR_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SidecarSpec {
    pub fn container(&self) -> Container {
        Container {
            name: self.name.clone(),
            image: Some(self.image.clone()),
            args: (!self.args.is_empty()).then(|| self.args.clone()),
            ..Container::default()
        }
    }
}

/// `/spec/containers/-`: append to the pod's container list.
fn containers_append_path() -> PointerBuf {
    PointerBuf::from_tokens(["spec", "containers", "-"])
}

/// A JSON patch with a single operation appending the sidecar container.
pub fn sidecar_patch(sidecar: &SidecarSpec) -> Result<Patch> {
    let value = serde_json::to_value(sidecar.container()).map_err(Error::Serialization)?;
    Ok(Patch(vec![PatchOperation::Add(AddOperation {
        path: containers_append_path(),
        value,
    })]))
}
