use thiserror::Error;

/// Failures talking to the cluster control plane.
///
/// Each variant is fatal to the request that triggered it. Nothing is retried here: the API
/// server retries the whole admission call according to its own failure policy.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("error loading cluster config: {0}")]
    ClusterConfigUnavailable(#[source] kube::config::InferConfigError),

    #[error("error creating cluster client: {0}")]
    // Boxing this error because the size can be large
    ClientConstructionFailed(#[source] Box<kube::Error>),

    #[error("error getting namespace {0:?}: {1}")]
    NamespaceLookupFailed(String, #[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = ClusterError> = std::result::Result<T, E>;

impl ClusterError {
    /// Short stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClusterError::ClusterConfigUnavailable(_) => "cluster_config_unavailable",
            ClusterError::ClientConstructionFailed(_) => "client_construction_failed",
            ClusterError::NamespaceLookupFailed(..) => "namespace_lookup_failed",
        }
    }
}
