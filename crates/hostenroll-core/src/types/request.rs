use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{base64_bytes, KeyUsage, RequestRef};

/// API group/version of the enrollment request resource
pub const API_VERSION: &str = "certificates/v1";

/// Kind of the enrollment request resource
pub const KIND: &str = "EnrollmentRequest";

/// Certificate enrollment request as stored by the CA service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRequest {
    /// Resource API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Resource kind
    #[serde(default = "default_kind")]
    pub kind: String,

    /// Name, uid and timestamps
    pub metadata: ObjectMeta,

    /// What the client asked for
    pub spec: EnrollmentRequestSpec,

    /// What the approver and signer decided
    #[serde(default)]
    pub status: EnrollmentRequestStatus,
}

/// Resource metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name, unique per CA service
    pub name: String,

    /// Server-assigned id, absent on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// When the CA service stored the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

/// Client-supplied part of an enrollment request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRequestSpec {
    /// PEM-encoded PKCS#10 request
    #[serde(with = "base64_bytes")]
    pub request: Vec<u8>,

    /// Signer expected to issue the certificate
    pub signer_name: String,

    /// Requested key usages
    #[serde(default)]
    pub usages: Vec<KeyUsage>,

    /// Requested certificate lifetime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_seconds: Option<u32>,
}

/// Approver- and signer-controlled part of an enrollment request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRequestStatus {
    /// Approval decisions
    #[serde(default)]
    pub conditions: Vec<RequestCondition>,

    /// PEM-encoded certificate, set once the signer has issued it
    #[serde(
        default,
        with = "base64_bytes::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate: Option<Vec<u8>>,
}

/// A single approval decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCondition {
    /// Decision type
    #[serde(rename = "type")]
    pub condition_type: ConditionType,

    /// "True", "False" or "Unknown"; missing means "True"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Machine-readable reason
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// When the condition last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,
}

impl RequestCondition {
    /// Returns true unless the condition is explicitly not in effect
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.status
            .as_deref()
            .map_or(true, |s| s.eq_ignore_ascii_case("true"))
    }
}

/// Condition types an approver or signer can set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    /// The approver allowed signing
    Approved,
    /// The approver refused signing
    Denied,
    /// The signer could not issue a certificate
    Failed,
}

/// Enrollment state as observed by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentState {
    /// Waiting for an approver
    Pending,
    /// Approved, certificate not yet attached
    Approved,
    /// Refused by the approver
    Denied,
    /// The signer gave up
    Failed,
    /// Certificate attached
    Issued,
}

impl EnrollmentState {
    /// Returns true if no further transition will happen
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Denied | Self::Failed | Self::Issued)
    }
}

impl std::fmt::Display for EnrollmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Denied => write!(f, "denied"),
            Self::Failed => write!(f, "failed"),
            Self::Issued => write!(f, "issued"),
        }
    }
}

impl EnrollmentRequest {
    /// Create an unsubmitted request
    #[must_use]
    pub fn new(name: impl Into<String>, spec: EnrollmentRequestSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: name.into(),
                ..ObjectMeta::default()
            },
            spec,
            status: EnrollmentRequestStatus::default(),
        }
    }

    /// Request name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Name and uid, if the CA service has assigned one
    #[must_use]
    pub fn reference(&self) -> Option<RequestRef> {
        self.metadata.uid.as_ref().map(|uid| RequestRef {
            name: self.metadata.name.clone(),
            uid: uid.clone(),
        })
    }

    /// First condition of the given type that is in effect
    #[must_use]
    pub fn condition(&self, condition_type: ConditionType) -> Option<&RequestCondition> {
        self.status
            .conditions
            .iter()
            .find(|c| c.condition_type == condition_type && c.is_set())
    }

    /// Issued certificate, ignoring an empty attachment
    #[must_use]
    pub fn certificate(&self) -> Option<&[u8]> {
        self.status
            .certificate
            .as_deref()
            .filter(|c| !c.is_empty())
    }

    /// Derive the client-observed state.
    ///
    /// Denied and Failed win over Approved; a certificate only counts once
    /// the request is Approved.
    #[must_use]
    pub fn state(&self) -> EnrollmentState {
        if self.condition(ConditionType::Denied).is_some() {
            EnrollmentState::Denied
        } else if self.condition(ConditionType::Failed).is_some() {
            EnrollmentState::Failed
        } else if self.condition(ConditionType::Approved).is_some() {
            if self.certificate().is_some() {
                EnrollmentState::Issued
            } else {
                EnrollmentState::Approved
            }
        } else {
            EnrollmentState::Pending
        }
    }
}

/// Certificate returned by the CA for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    /// The request it was issued for
    pub request: RequestRef,
    /// PEM-encoded certificate (leaf first, chain may follow)
    pub pem: Vec<u8>,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}
