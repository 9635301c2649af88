use crate::envelope::AdmissionReview;
use crate::error::{Error, Result};

use json_patch::Patch;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchType {
    #[serde(rename = "JSONPatch")]
    JsonPatch,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub message: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    patch: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    patch_type: Option<PatchType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl AdmissionResponse {
    pub fn allow(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            allowed: true,
            status: None,
            patch: None,
            patch_type: None,
            warnings: Vec::new(),
        }
    }

    pub fn deny(uid: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            status: Some(Status {
                message: message.into(),
            }),
            ..Self::allow(uid)
        }
    }

    /// Attach a JSON patch. The patch type is always set together with the patch.
    pub fn with_patch(mut self, patch: &Patch) -> Result<Self> {
        self.patch = Some(serde_json::to_vec(patch).map_err(Error::Serialization)?);
        self.patch_type = Some(PatchType::JsonPatch);
        Ok(self)
    }

    /// Serialized JSON patch, if any.
    pub fn patch(&self) -> Option<&[u8]> {
        self.patch.as_deref()
    }

    pub fn patch_type(&self) -> Option<PatchType> {
        self.patch_type
    }
}

/// Outcome of evaluating a request. A patch can only accompany an allow.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Allow(Option<Patch>),
    Deny(String),
}

impl AdmissionReview {
    /// Wrap a response in an envelope with the same `apiVersion` and `kind` as this one.
    pub fn respond(&self, response: AdmissionResponse) -> AdmissionReview {
        AdmissionReview {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            request: None,
            response: Some(response),
        }
    }
}

/// Build the outbound review for `review`, correlated by the request uid.
pub fn assemble(review: &AdmissionReview, verdict: Verdict) -> Result<AdmissionReview> {
    let uid = review.request()?.uid.clone();
    let response = match verdict {
        Verdict::Allow(None) => AdmissionResponse::allow(uid),
        Verdict::Allow(Some(patch)) => AdmissionResponse::allow(uid).with_patch(&patch)?,
        Verdict::Deny(message) => AdmissionResponse::deny(uid, message),
    };
    Ok(review.respond(response))
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}
