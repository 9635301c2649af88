use crate::envelope::{AdmissionRequest, GroupVersionResource};
use crate::error::{Error, Result};

/// A group/version/resource triple known at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceTarget {
    pub group: &'static str,
    pub version: &'static str,
    pub resource: &'static str,
}

/// The only resource this webhook mutates.
pub const POD_RESOURCE: ResourceTarget = ResourceTarget {
    group: "",
    version: "v1",
    resource: "pods",
};

impl ResourceTarget {
    pub fn matches(&self, gvr: &GroupVersionResource) -> bool {
        gvr.group == self.group && gvr.version == self.version && gvr.resource == self.resource
    }
}

/// Reject any request that is not for [`POD_RESOURCE`].
pub fn check_resource(request: &AdmissionRequest) -> Result<()> {
    if POD_RESOURCE.matches(&request.resource) {
        Ok(())
    } else {
        Err(Error::ResourceMismatch(request.resource.resource.clone()))
    }
}
