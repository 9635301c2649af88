use sidecar_injector_k8s_util::error::ClusterError;

use http::StatusCode;
use thiserror::Error;

/// Everything that can end an admission request before a review is sent back.
#[derive(Error, Debug)]
pub enum Error {
    #[error("expected application/json content-type, got {0:?}")]
    UnsupportedContentType(String),

    #[error("error getting admission review from request: {0}")]
    MalformedEnvelope(String),

    #[error("error decoding raw pod: {0}")]
    MalformedObject(String),

    #[error("did not receive pod, got {0}")]
    ResourceMismatch(String),

    #[error("{0}")]
    Upstream(#[from] ClusterError),

    #[error("error marshalling response json: {0}")]
    Serialization(#[source] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// HTTP status returned to the API server.
    ///
    /// Client faults (framing, envelope, object, wrong resource) are 400. Failures on our side
    /// of the wire (cluster lookups, encoding the answer) are 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::UnsupportedContentType(_)
            | Error::MalformedEnvelope(_)
            | Error::MalformedObject(_)
            | Error::ResourceMismatch(_) => StatusCode::BAD_REQUEST,
            Error::Upstream(_) | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnsupportedContentType(_) => "unsupported_content_type",
            Error::MalformedEnvelope(_) => "malformed_envelope",
            Error::MalformedObject(_) => "malformed_object",
            Error::ResourceMismatch(_) => "resource_mismatch",
            Error::Upstream(e) => e.kind(),
            Error::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_faults_are_bad_request() {
        for err in [
            Error::UnsupportedContentType("text/plain".to_string()),
            Error::MalformedEnvelope("missing request".to_string()),
            Error::MalformedObject("missing object".to_string()),
            Error::ResourceMismatch("configmaps".to_string()),
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST, "{err}");
        }
    }

    #[test]
    fn test_upstream_failures_are_server_errors() {
        let err = Error::from(ClusterError::NamespaceLookupFailed(
            "team-a".to_string(),
            "connection refused".into(),
        ));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "namespace_lookup_failed");
        assert_eq!(
            err.to_string(),
            "error getting namespace \"team-a\": connection refused"
        );
    }

    #[test]
    fn test_resource_mismatch_names_resource() {
        let err = Error::ResourceMismatch("configmaps".to_string());
        assert_eq!(err.to_string(), "did not receive pod, got configmaps");
    }
}
