//! # hostenroll-pki
//!
//! Local key material and certificate requests for host enrollment.
//!
//! ## Flow
//!
//! ```text
//! key file ──load_or_create──▶ PrivateKey ──csr::build──▶ CsrPem ──▶ CA service
//!                                  ▲                                   │
//!                                  └────── verify::ensure_matches_key ◀┘
//! ```
//!
//! ## Security Model
//!
//! - The private key never leaves the host; only the CSR is sent
//! - The key file is written atomically with owner-only permissions
//! - The same key is reused across restarts until the file is lost or corrupt
//!
//! ## Example
//!
//! ```rust,ignore
//! use hostenroll_pki::{csr, key, KeyAlgorithm};
//!
//! let path = key::key_path_for("/var/lib/hostenroll", "node-1");
//! let key = key::load_or_create(&path, KeyAlgorithm::default())?;
//! let request = csr::build("node-1", &key)?;
//! ```

pub mod csr;
pub mod key;
#[cfg(feature = "test-util")]
pub mod testing;
pub mod verify;

pub use csr::{CsrInfo, CsrPem};
pub use key::PrivateKey;
pub use verify::CertificateSummary;

use serde::{Deserialize, Serialize};

/// Key algorithm choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyAlgorithm {
    /// ECDSA with P-256 curve (recommended for speed)
    #[default]
    EcdsaP256,
    /// ECDSA with P-384 curve (higher security)
    EcdsaP384,
    /// Ed25519
    Ed25519,
}

impl KeyAlgorithm {
    /// Signature algorithm used for generation and signing.
    pub(crate) fn signature_algorithm(self) -> &'static rcgen::SignatureAlgorithm {
        match self {
            Self::EcdsaP256 => &rcgen::PKCS_ECDSA_P256_SHA256,
            Self::EcdsaP384 => &rcgen::PKCS_ECDSA_P384_SHA384,
            Self::Ed25519 => &rcgen::PKCS_ED25519,
        }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EcdsaP256 => write!(f, "ecdsa-p256"),
            Self::EcdsaP384 => write!(f, "ecdsa-p384"),
            Self::Ed25519 => write!(f, "ed25519"),
        }
    }
}

impl std::str::FromStr for KeyAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ecdsa-p256" | "p256" => Ok(Self::EcdsaP256),
            "ecdsa-p384" | "p384" => Ok(Self::EcdsaP384),
            "ed25519" => Ok(Self::Ed25519),
            _ => Err(format!(
                "unknown key algorithm {s:?} (valid: ecdsa-p256, ecdsa-p384, ed25519)"
            )),
        }
    }
}
