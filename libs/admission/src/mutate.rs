use crate::envelope::{self, AdmissionRequest};
use crate::error::Result;
use crate::guard;
use crate::patch::{self, SidecarSpec};
use crate::policy::PolicyResolver;
use crate::response::{self, Verdict};

use sidecar_injector_k8s_util::namespace::NamespaceLabels;

use std::time::Duration;

use tracing::{Span, debug, error, field, info, instrument, warn};

/// Runs one admission request through decode, resource check, policy, patch and response.
///
/// All collaborators are owned by the mutator and nothing is shared between requests, so a
/// single instance serves any number of concurrent reviews.
pub struct Mutator<N> {
    policy: PolicyResolver<N>,
    sidecar: SidecarSpec,
}

impl<N: NamespaceLabels> Mutator<N> {
    pub fn new(namespaces: N, sidecar: SidecarSpec, lookup_timeout: Duration) -> Self {
        Self {
            policy: PolicyResolver::new(namespaces, lookup_timeout),
            sidecar,
        }
    }

    /// Answer an inbound review body with an encoded outbound review.
    ///
    /// Failures are logged here, where their context is known, and returned for the caller to
    /// turn into an HTTP response with [`crate::error::Error::status_code`].
    #[instrument(skip_all, fields(uid = field::Empty, namespace = field::Empty))]
    pub async fn review(&self, content_type: Option<&str>, body: &[u8]) -> Result<Vec<u8>> {
        let review = envelope::decode(body, content_type).inspect_err(|e| {
            warn!(msg = "rejecting admission review", kind = e.kind(), ?content_type, error = %e);
        })?;
        let request = review.request()?;
        Span::current().record("uid", request.uid.as_str());

        guard::check_resource(request).inspect_err(|e| {
            warn!(msg = "rejecting unexpected resource", resource = %request.resource, error = %e);
        })?;

        let pod = envelope::decode_pod(request).inspect_err(|e| {
            warn!(msg = "rejecting undecodable object", error = %e);
        })?;

        let namespace = target_namespace(request, pod.metadata.namespace.as_deref());
        Span::current().record("namespace", namespace);

        let inject = self.policy.should_inject(namespace).await.inspect_err(|e| {
            error!(msg = "failed to resolve injection policy", kind = e.kind(), error = %e);
        })?;

        let patch = if inject {
            let patch = patch::sidecar_patch(&self.sidecar).inspect_err(|e| {
                error!(
                    msg = "failed to build sidecar patch",
                    sidecar = %self.sidecar.name,
                    error = %e
                );
            })?;
            Some(patch)
        } else {
            None
        };
        let pod_name = pod
            .metadata
            .name
            .as_deref()
            .or(pod.metadata.generate_name.as_deref())
            .unwrap_or_default();
        if patch.is_some() {
            info!(msg = "injecting sidecar", pod = pod_name, sidecar = %self.sidecar.name);
        } else {
            debug!(msg = "sidecar not requested", pod = pod_name);
        }

        let answer = response::assemble(&review, Verdict::Allow(patch)).inspect_err(|e| {
            error!(msg = "failed to assemble admission response", error = %e);
        })?;
        envelope::encode(&answer).inspect_err(|e| {
            error!(msg = "failed to encode admission response", error = %e);
        })
    }
}

/// The request namespace, falling back to the one set on the object itself.
fn target_namespace<'a>(
    request: &'a AdmissionRequest,
    object_namespace: Option<&'a str>,
) -> &'a str {
    request
        .namespace
        .as_deref()
        .or(object_namespace)
        .unwrap_or_default()
}
