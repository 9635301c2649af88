use crate::client::LazyClient;
use crate::error::{ClusterError, Result};

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, Client};
use tracing::trace;

/// Read access to namespace labels.
///
/// This is the only piece of cluster state the webhook consults, so it is all the policy code
/// depends on. Implementations must not cache: every call reflects the cluster as it is now.
pub trait NamespaceLabels: Send + Sync {
    fn namespace_labels(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, String>>> + Send;
}

impl<N: NamespaceLabels> NamespaceLabels for Arc<N> {
    fn namespace_labels(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, String>>> + Send {
        (**self).namespace_labels(name)
    }
}

/// [`NamespaceLabels`] backed by the Kubernetes API server.
#[derive(Default)]
pub struct KubeNamespaces {
    client: LazyClient,
}

impl KubeNamespaces {
    /// Resolve labels with a client inferred from the environment on first use.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client: LazyClient::from_client(client),
        }
    }
}

impl NamespaceLabels for KubeNamespaces {
    async fn namespace_labels(&self, name: &str) -> Result<BTreeMap<String, String>> {
        if name.is_empty() {
            return Err(ClusterError::NamespaceLookupFailed(
                name.to_string(),
                "resource name may not be empty".into(),
            ));
        }

        let client = self.client.get().await?;
        let api = Api::<Namespace>::all(client.clone());
        let namespace = api
            .get(name)
            .await
            .map_err(|e| ClusterError::NamespaceLookupFailed(name.to_string(), Box::new(e)))?;

        let labels = namespace.metadata.labels.unwrap_or_default();
        trace!(msg = "fetched namespace labels", namespace = name, ?labels);
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::{Request, Response, StatusCode};
    use kube::client::Body;
    use serde_json::json;

    type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;

    fn mock_namespaces() -> (KubeNamespaces, ApiServerHandle) {
        let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "default");
        (KubeNamespaces::from_client(client), handle)
    }

    async fn timeout_after_1s(handle: tokio::task::JoinHandle<()>) {
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("timeout on mock apiserver")
            .expect("scenario succeeded")
    }

    #[tokio::test]
    async fn test_labels_are_read_from_api_server() {
        let (namespaces, mut handle) = mock_namespaces();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::GET);
            assert_eq!(request.uri().path(), "/api/v1/namespaces/team-a");
            let namespace = json!({
                "apiVersion": "v1",
                "kind": "Namespace",
                "metadata": {
                    "name": "team-a",
                    "labels": {"sidecar": "enabled", "team": "a"}
                }
            });
            let body = serde_json::to_vec(&namespace).unwrap();
            send.send_response(Response::builder().body(Body::from(body)).unwrap());
        });

        let labels = namespaces.namespace_labels("team-a").await.unwrap();
        assert_eq!(labels.get("sidecar").map(String::as_str), Some("enabled"));
        assert_eq!(labels.len(), 2);
        timeout_after_1s(server).await;
    }

    #[tokio::test]
    async fn test_namespace_without_labels_is_empty() {
        let (namespaces, mut handle) = mock_namespaces();
        let server = tokio::spawn(async move {
            let (_request, send) = handle.next_request().await.expect("service not called");
            let namespace = json!({
                "apiVersion": "v1",
                "kind": "Namespace",
                "metadata": {"name": "plain"}
            });
            let body = serde_json::to_vec(&namespace).unwrap();
            send.send_response(Response::builder().body(Body::from(body)).unwrap());
        });

        let labels = namespaces.namespace_labels("plain").await.unwrap();
        assert!(labels.is_empty());
        timeout_after_1s(server).await;
    }

    #[tokio::test]
    async fn test_missing_namespace_is_lookup_failure() {
        let (namespaces, mut handle) = mock_namespaces();
        let server = tokio::spawn(async move {
            let (_request, send) = handle.next_request().await.expect("service not called");
            let status = json!({
                "apiVersion": "v1",
                "kind": "Status",
                "status": "Failure",
                "message": "namespaces \"ghost\" not found",
                "reason": "NotFound",
                "code": 404
            });
            let body = serde_json::to_vec(&status).unwrap();
            send.send_response(
                Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::from(body))
                    .unwrap(),
            );
        });

        let err = namespaces.namespace_labels("ghost").await.unwrap_err();
        assert!(matches!(err, ClusterError::NamespaceLookupFailed(ref ns, _) if ns == "ghost"));
        assert_eq!(err.kind(), "namespace_lookup_failed");
        timeout_after_1s(server).await;
    }

    #[tokio::test]
    async fn test_empty_name_does_not_call_api_server() {
        let (namespaces, _handle) = mock_namespaces();
        let err = namespaces.namespace_labels("").await.unwrap_err();
        assert!(matches!(err, ClusterError::NamespaceLookupFailed(..)));
        assert!(err.to_string().contains("may not be empty"));
    }

    #[tokio::test]
    async fn test_missing_cluster_config_is_retried() {
        // SAFETY: no other test in this crate reads these variables.
        unsafe {
            std::env::set_var("KUBECONFIG", "/nonexistent/kubeconfig");
            std::env::remove_var("KUBERNETES_SERVICE_HOST");
            std::env::remove_var("KUBERNETES_SERVICE_PORT");
        }
        let namespaces = KubeNamespaces::new();

        let err = namespaces.namespace_labels("team-a").await.unwrap_err();
        assert!(matches!(err, ClusterError::ClusterConfigUnavailable(_)));
        assert_eq!(err.kind(), "cluster_config_unavailable");
        assert!(!namespaces.client.is_initialized());

        let err = namespaces.namespace_labels("team-a").await.unwrap_err();
        assert_eq!(err.kind(), "cluster_config_unavailable");
        assert!(!namespaces.client.is_initialized());
    }
}
