//! Wire format of the `AdmissionReview` envelope exchanged with the API server.
//!
//! Decoding happens in two explicit stages: [`decode`] turns the HTTP body into an
//! [`AdmissionReview`], and [`decode_pod`] turns the raw object embedded in its request into a
//! typed [`Pod`]. Either stage can fail on its own.

use crate::error::{Error, Result};
use crate::response::AdmissionResponse;

use std::fmt;

use k8s_openapi::Resource;
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};

pub const ADMISSION_V1: &str = "admission.k8s.io/v1";
pub const ADMISSION_V1BETA1: &str = "admission.k8s.io/v1beta1";
pub const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";
pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    #[serde(default)]
    pub kind: GroupVersionKind,
    pub resource: GroupVersionResource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_kind: Option<GroupVersionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_resource: Option<GroupVersionResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_sub_resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub user_info: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_object: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.resource)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}

impl AdmissionReview {
    /// The inbound request. A decoded review always carries one.
    pub fn request(&self) -> Result<&AdmissionRequest> {
        self.request
            .as_ref()
            .ok_or_else(|| Error::MalformedEnvelope("missing request".to_string()))
    }
}

/// Accept `application/json`, ignoring parameters such as `charset` and letter case.
pub fn check_content_type(content_type: Option<&str>) -> Result<()> {
    let media_type = content_type
        .and_then(|value| value.split(';').next())
        .map(str::trim);

    match media_type {
        Some(media_type) if media_type.eq_ignore_ascii_case(JSON_CONTENT_TYPE) => Ok(()),
        _ => Err(Error::UnsupportedContentType(
            content_type.unwrap_or_default().to_string(),
        )),
    }
}

/// Decode an inbound review. The content type is checked before the body is looked at.
pub fn decode(body: &[u8], content_type: Option<&str>) -> Result<AdmissionReview> {
    check_content_type(content_type)?;

    let review: AdmissionReview =
        serde_json::from_slice(body).map_err(|e| Error::MalformedEnvelope(e.to_string()))?;

    if review.api_version != ADMISSION_V1 && review.api_version != ADMISSION_V1BETA1 {
        return Err(Error::MalformedEnvelope(format!(
            "unsupported apiVersion {:?}",
            review.api_version
        )));
    }
    if review.kind != ADMISSION_REVIEW_KIND {
        return Err(Error::MalformedEnvelope(format!(
            "unexpected kind {:?}",
            review.kind
        )));
    }
    review.request()?;

    Ok(review)
}

/// Decode the object embedded in a request as a pod.
pub fn decode_pod(request: &AdmissionRequest) -> Result<Pod> {
    let object = request
        .object
        .as_ref()
        .ok_or_else(|| Error::MalformedObject("request has no object".to_string()))?;

    if let Some(kind) = object.get("kind").and_then(serde_json::Value::as_str) {
        if kind != Pod::KIND {
            return Err(Error::MalformedObject(format!("expected a Pod, got {kind}")));
        }
    }

    Pod::deserialize(object).map_err(|e| Error::MalformedObject(e.to_string()))
}

pub fn encode(review: &AdmissionReview) -> Result<Vec<u8>> {
    serde_json::to_vec(review).map_err(Error::Serialization)
}
