use crate::state::WebhookState;

use sidecar_injector_admission::envelope::JSON_CONTENT_TYPE;
use sidecar_injector_k8s_util::namespace::NamespaceLabels;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tracing::trace;

/// The API server never sends admission requests larger than this.
pub const MAX_BODY_BYTES: usize = 3 * 1024 * 1024;

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn readyz<N>(State(state): State<WebhookState<N>>) -> StatusCode {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// `POST /mutate`: answer an `AdmissionReview` for a pod.
pub async fn mutate<N: NamespaceLabels>(
    State(state): State<WebhookState<N>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    trace!(msg = "received message on mutate", bytes = body.len());
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    match state.mutator.review(content_type, &body).await {
        Ok(review) => ([(CONTENT_TYPE, JSON_CONTENT_TYPE)], review).into_response(),
        Err(err) => (err.status_code(), err.to_string()).into_response(),
    }
}

/// `POST /validate`: deny objects that lack the required label.
pub async fn validate<N>(
    State(state): State<WebhookState<N>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    trace!(msg = "received message on validate", bytes = body.len());
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    match state.validator.review(content_type, &body) {
        Ok(review) => ([(CONTENT_TYPE, JSON_CONTENT_TYPE)], review).into_response(),
        Err(err) => (err.status_code(), err.to_string()).into_response(),
    }
}

pub fn router<N: NamespaceLabels + 'static>(state: WebhookState<N>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz::<N>))
        .route("/mutate", post(mutate::<N>))
        .route("/validate", post(validate::<N>))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
