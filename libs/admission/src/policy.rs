use sidecar_injector_k8s_util::error::ClusterError;
use sidecar_injector_k8s_util::namespace::NamespaceLabels;

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

/// Namespace label that opts every pod in the namespace into sidecar injection.
pub const SIDECAR_LABEL: &str = "sidecar";
pub const SIDECAR_ENABLED: &str = "enabled";

pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

pub fn injection_requested(labels: &BTreeMap<String, String>) -> bool {
    labels.get(SIDECAR_LABEL).map(String::as_str) == Some(SIDECAR_ENABLED)
}

/// Decides per namespace whether pods get the sidecar.
///
/// Labels are fetched for every call, so a namespace relabel applies to the very next pod.
pub struct PolicyResolver<N> {
    namespaces: N,
    timeout: Duration,
}

impl<N: NamespaceLabels> PolicyResolver<N> {
    pub fn new(namespaces: N, timeout: Duration) -> Self {
        Self {
            namespaces,
            timeout,
        }
    }

    pub async fn should_inject(&self, namespace: &str) -> Result<bool, ClusterError> {
        let lookup = self.namespaces.namespace_labels(namespace);
        let labels = tokio::time::timeout(self.timeout, lookup)
            .await
            .map_err(|elapsed| {
                ClusterError::NamespaceLookupFailed(namespace.to_string(), Box::new(elapsed))
            })??;

        let inject = injection_requested(&labels);
        debug!(msg = "resolved injection policy", namespace, inject);
        Ok(inject)
    }
}
