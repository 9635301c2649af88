use crate::error::{ClusterError, Result};

use kube::{Client, Config};
use tokio::sync::OnceCell;
use tracing::debug;

/// Kubernetes client that is built on first use.
///
/// Only a successfully built client is kept. When inferring the configuration or building the
/// client fails, the error is returned to the caller and the next caller tries again.
#[derive(Default)]
pub struct LazyClient {
    cell: OnceCell<Client>,
}

impl LazyClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already built client, e.g. one backed by a mock service in tests.
    pub fn from_client(client: Client) -> Self {
        Self {
            cell: OnceCell::from(client),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get(&self) -> Result<&Client> {
        self.cell
            .get_or_try_init(|| async {
                let config = Config::infer()
                    .await
                    .map_err(ClusterError::ClusterConfigUnavailable)?;
                debug!(msg = "building cluster client", cluster_url = %config.cluster_url);
                Client::try_from(config)
                    .map_err(|e| ClusterError::ClientConstructionFailed(Box::new(e)))
            })
            .await
    }
}
