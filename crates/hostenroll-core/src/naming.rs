//! Deterministic names derived from a host identifier.
//!
//! Every name the enrollment flow puts on the wire or on disk is a pure
//! function of the host identifier, so a restarted process finds the key
//! and the request it created before.

use std::time::Duration;

use crate::{EnrollError, Result};

/// Organization placed in every certificate request subject
pub const CSR_ORGANIZATION: &str = "identity:hosts";

/// Common name prefix; the host identifier follows it
pub const CSR_COMMON_NAME_PREFIX: &str = "identity:host:";

/// Enrollment request name prefix; the host identifier follows it
pub const REQUEST_NAME_PREFIX: &str = "enroll-";

/// Signer that issues client certificates for the cluster API
pub const DEFAULT_SIGNER_NAME: &str = "cluster.io/kube-apiserver-client";

/// Requested certificate lifetime: one year
pub const DEFAULT_EXPIRATION_SECONDS: u32 = 86_400 * 365;

/// How long to wait for an approver before giving up: one hour
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(3600);

/// Cluster entry name in the identity config
pub const DEFAULT_CLUSTER_NAME: &str = "default-cluster";

/// Auth entry name in the identity config
pub const DEFAULT_AUTH_NAME: &str = "default-auth";

/// Context entry name in the identity config
pub const DEFAULT_CONTEXT_NAME: &str = "default-context";

/// Namespace bound by the default context
pub const DEFAULT_NAMESPACE: &str = "default";

/// Longest resource name the CA service accepts
const MAX_NAME_LEN: usize = 253;

/// Check that `host` can be embedded in a subject and a resource name.
pub fn validate_host(host: &str) -> Result<&str> {
    if host.trim().is_empty() {
        return Err(EnrollError::Validation("host identifier is empty".into()));
    }

    if REQUEST_NAME_PREFIX.len() + host.len() > MAX_NAME_LEN {
        return Err(EnrollError::Validation(format!(
            "host identifier is longer than {} characters",
            MAX_NAME_LEN - REQUEST_NAME_PREFIX.len()
        )));
    }

    if let Some(bad) = host
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '.'))
    {
        return Err(EnrollError::Validation(format!(
            "host identifier {host:?} contains {bad:?}"
        )));
    }

    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !edge_ok(host.chars().next()) || !edge_ok(host.chars().last()) {
        return Err(EnrollError::Validation(format!(
            "host identifier {host:?} must start and end with a letter or digit"
        )));
    }

    Ok(host)
}

/// Subject common name for `host`
#[must_use]
pub fn common_name(host: &str) -> String {
    format!("{CSR_COMMON_NAME_PREFIX}{host}")
}

/// Enrollment request name for `host`
#[must_use]
pub fn request_name(host: &str) -> String {
    format!("{REQUEST_NAME_PREFIX}{host}")
}

/// Private key file name for `host`
#[must_use]
pub fn key_file_name(host: &str) -> String {
    format!("hostenroll-{host}.key")
}
