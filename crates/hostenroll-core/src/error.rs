use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for enrollment operations
pub type Result<T> = std::result::Result<T, EnrollError>;

/// Errors that can occur while enrolling a host
#[derive(Error, Debug)]
pub enum EnrollError {
    /// Host identifier is empty or cannot form a resource name
    #[error("invalid host identifier: {0}")]
    Validation(String),

    /// Private key could not be generated, parsed or written
    #[error("private key error at {}: {reason}", path.display())]
    Key {
        /// Key file path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Certificate request could not be built or signed
    #[error("failed to encode certificate request: {0}")]
    Encoding(String),

    /// Creating the enrollment request failed
    #[error("failed to submit enrollment request {name}: {source}")]
    Submission {
        /// Request name
        name: String,
        /// Underlying failure
        #[source]
        source: Box<EnrollError>,
    },

    /// The CA rejected the request
    #[error("enrollment request {name} was denied: {reason}: {message}")]
    Denied {
        /// Request name
        name: String,
        /// Machine-readable reason set by the approver
        reason: String,
        /// Human-readable message set by the approver
        message: String,
    },

    /// The request was approved but the signer could not issue a certificate
    #[error("enrollment request {name} failed: {reason}: {message}")]
    Failed {
        /// Request name
        name: String,
        /// Machine-readable reason set by the signer
        reason: String,
        /// Human-readable message set by the signer
        message: String,
    },

    /// No terminal status was observed before the deadline
    #[error("timed out after {waited:?} waiting for enrollment request {name}")]
    Timeout {
        /// Request name
        name: String,
        /// How long the client waited
        waited: Duration,
    },

    /// Waiting was cancelled by the caller
    #[error("wait for enrollment request {name} was cancelled")]
    Cancelled {
        /// Request name
        name: String,
    },

    /// The request was deleted and created again under the same name
    #[error("enrollment request {name} was recreated (expected uid {expected}, found {found})")]
    Recreated {
        /// Request name
        name: String,
        /// Uid returned at submission
        expected: String,
        /// Uid currently stored by the CA
        found: String,
    },

    /// An existing request with the same name was built from different inputs
    #[error("existing enrollment request {name} is incompatible: {reason}")]
    Incompatible {
        /// Request name
        name: String,
        /// Which field differs
        reason: String,
    },

    /// The issued certificate does not carry the submitted public key
    #[error("issued certificate does not match the private key: {0}")]
    CertificateMismatch(String),

    /// Writing the key or identity file failed
    #[error("failed to persist {}: {reason}", path.display())]
    Persist {
        /// Target file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Bootstrap profile or client configuration is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Credentials were rejected
    #[error("authentication failed: credentials rejected by the CA service")]
    Unauthorized,

    /// Credentials lack permission for the operation
    #[error("permission denied: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("resource not found: {resource}")]
    NotFound {
        /// Description of the resource that wasn't found
        resource: String,
    },

    /// Resource already exists
    #[error("resource already exists: {name}")]
    AlreadyExists {
        /// Resource name
        name: String,
    },

    /// Rate limit exceeded
    #[error("rate limit exceeded, retry after {retry_after:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying
        retry_after: Option<u64>,
    },

    /// API returned an error response
    #[error("API error ({code}): {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Error message from the API
        message: String,
    },

    /// The CA service answered with something we cannot use
    #[error("invalid response from CA service: {0}")]
    InvalidResponse(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Connection failed
    #[error("connection failed: {0}")]
    Connection(String),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used to decide retries and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or configuration
    Usage,
    /// The CA said no
    Denied,
    /// Safe to retry with the same key and request name
    Retryable,
    /// Needs outside intervention
    Fatal,
}

impl EnrollError {
    /// Returns true if the error is transient at the transport level
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Http(_) | Self::Connection(_) => true,
            Self::Api { code, .. } => *code >= 500,
            _ => false,
        }
    }

    /// Returns true if the operation can be repeated with the same request name
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Cancelled { .. } => true,
            Self::Submission { source, .. } => source.is_transient(),
            other => other.is_transient(),
        }
    }

    /// Returns true if the CA reached a negative terminal decision
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Denied { .. } | Self::Failed { .. })
    }

    /// Classify the error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        if self.is_retryable() {
            ErrorKind::Retryable
        } else if self.is_terminal() {
            ErrorKind::Denied
        } else if matches!(self, Self::Validation(_) | Self::Config(_)) {
            ErrorKind::Usage
        } else {
            ErrorKind::Fatal
        }
    }

    /// Returns the HTTP status code if this is an API error
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::NotFound { .. } => Some(404),
            Self::AlreadyExists { .. } => Some(409),
            Self::RateLimited { .. } => Some(429),
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Shorthand for [`EnrollError::Key`]
    pub fn key(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Key {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for [`EnrollError::Persist`]
    pub fn persist(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persist {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_retryable_follows_source() {
        let transient = EnrollError::Submission {
            name: "enroll-a".into(),
            source: Box::new(EnrollError::Connection("refused".into())),
        };
        assert!(transient.is_retryable());

        let auth = EnrollError::Submission {
            name: "enroll-a".into(),
            source: Box::new(EnrollError::Unauthorized),
        };
        assert!(!auth.is_retryable());
        assert_eq!(auth.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn test_kinds() {
        let timeout = EnrollError::Timeout {
            name: "enroll-a".into(),
            waited: Duration::from_secs(1),
        };
        assert_eq!(timeout.kind(), ErrorKind::Retryable);

        let denied = EnrollError::Denied {
            name: "enroll-a".into(),
            reason: "Policy".into(),
            message: "no".into(),
        };
        assert_eq!(denied.kind(), ErrorKind::Denied);
        assert!(!denied.is_retryable());

        assert_eq!(EnrollError::Validation(String::new()).kind(), ErrorKind::Usage);
        assert_eq!(
            EnrollError::persist("/tmp/x", "disk full").kind(),
            ErrorKind::Fatal
        );
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = EnrollError::Api {
            code: 503,
            message: "unavailable".into(),
        };
        assert!(err.is_transient());
        assert_eq!(err.status_code(), Some(503));

        let err = EnrollError::Api {
            code: 422,
            message: "invalid".into(),
        };
        assert!(!err.is_transient());
    }
}
