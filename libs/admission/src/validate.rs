//! Label requirement enforced on `POST /validate`.
//!
//! Any object kind is accepted. An object without the required label is denied with a
//! `status.message`; it is never patched.

use crate::envelope::{self, AdmissionRequest};
use crate::error::Result;
use crate::response::{self, Verdict};

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Deserialize;
use tracing::{Span, debug, error, field, info, instrument, warn};

pub const DEFAULT_REQUIRED_LABEL: &str = "owner";

pub struct Validator {
    required_label: String,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_REQUIRED_LABEL)
    }
}

impl Validator {
    pub fn new(required_label: impl Into<String>) -> Self {
        Self {
            required_label: required_label.into(),
        }
    }

    pub fn required_label(&self) -> &str {
        &self.required_label
    }

    pub fn verdict(&self, request: &AdmissionRequest) -> Verdict {
        match object_labels(request) {
            Ok(labels) if labels.contains_key(&self.required_label) => Verdict::Allow(None),
            Ok(_) => Verdict::Deny(format!(
                "Missing required label: '{}'",
                self.required_label
            )),
            Err(e) => Verdict::Deny(format!("Error during validation: {e}")),
        }
    }

    /// Answer an inbound review body with an encoded allow or deny.
    #[instrument(skip_all, fields(uid = field::Empty))]
    pub fn review(&self, content_type: Option<&str>, body: &[u8]) -> Result<Vec<u8>> {
        let review = envelope::decode(body, content_type).inspect_err(|e| {
            warn!(msg = "rejecting admission review", kind = e.kind(), ?content_type, error = %e);
        })?;
        let request = review.request()?;
        Span::current().record("uid", request.uid.as_str());

        let verdict = self.verdict(request);
        match &verdict {
            Verdict::Deny(reason) => {
                info!(msg = "denying object", resource = %request.resource, reason = %reason)
            }
            Verdict::Allow(_) => {
                debug!(msg = "object has required label", resource = %request.resource)
            }
        }

        let answer = response::assemble(&review, verdict).inspect_err(|e| {
            error!(msg = "failed to assemble admission response", error = %e);
        })?;
        envelope::encode(&answer).inspect_err(|e| {
            error!(msg = "failed to encode admission response", error = %e);
        })
    }
}

/// Labels of the embedded object. A request without an object has none.
fn object_labels(request: &AdmissionRequest) -> serde_json::Result<BTreeMap<String, String>> {
    match request.object.as_ref().and_then(|object| object.get("metadata")) {
        Some(metadata) => Ok(ObjectMeta::deserialize(metadata)?
            .labels
            .unwrap_or_default()),
        None => Ok(BTreeMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{AdmissionReview, JSON_CONTENT_TYPE};
    use crate::error::Error;
    use crate::test::{configmap_review, pod_review};

    use serde_json::json;

    fn run(validator: &Validator, review: &serde_json::Value) -> AdmissionReview {
        let body = serde_json::to_vec(review).unwrap();
        let out = validator.review(Some(JSON_CONTENT_TYPE), &body).unwrap();
        serde_json::from_slice(&out).unwrap()
    }

    #[test]
    fn test_object_with_owner_is_allowed() {
        let mut review = configmap_review();
        review["request"]["object"]["metadata"]["labels"] = json!({"owner": "team-a"});
        let response = run(&Validator::default(), &review).response.unwrap();

        assert_eq!(response.uid, "3b8f1c2e-43a1-4d3c-9d52-0c1a2b3c4d5e");
        assert!(response.allowed);
        assert!(response.status.is_none());
        assert!(response.patch().is_none());
    }

    #[test]
    fn test_object_without_owner_is_denied() {
        let response = run(&Validator::default(), &pod_review("team-a"))
            .response
            .unwrap();

        assert!(!response.allowed);
        assert_eq!(
            response.status.as_ref().unwrap().message,
            "Missing required label: 'owner'"
        );
        assert!(response.patch().is_none());
        assert!(response.patch_type().is_none());
    }

    #[test]
    fn test_missing_object_is_denied() {
        let mut review = pod_review("team-a");
        review["request"]["object"] = serde_json::Value::Null;
        let response = run(&Validator::default(), &review).response.unwrap();
        assert!(!response.allowed);
    }

    #[test]
    fn test_undecodable_metadata_is_denied() {
        let mut review = pod_review("team-a");
        review["request"]["object"]["metadata"]["labels"] = json!(["owner"]);
        let response = run(&Validator::default(), &review).response.unwrap();

        assert!(!response.allowed);
        assert!(
            response
                .status
                .unwrap()
                .message
                .starts_with("Error during validation: ")
        );
    }

    #[test]
    fn test_custom_required_label() {
        let validator = Validator::new("app");
        assert_eq!(validator.required_label(), "app");
        let response = run(&validator, &pod_review("team-a")).response.unwrap();
        assert!(response.allowed);
    }

    #[test]
    fn test_envelope_errors_are_returned() {
        let body = serde_json::to_vec(&pod_review("team-a")).unwrap();
        let err = Validator::default()
            .review(Some("text/plain"), &body)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedContentType(_)));
    }
}
