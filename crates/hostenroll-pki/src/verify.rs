//! Checks on certificates returned by the CA.

use chrono::{DateTime, TimeZone, Utc};
use hostenroll_core::{EnrollError, Result};
use tracing::debug;

use crate::PrivateKey;

/// Parsed leaf certificate details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    /// Subject distinguished name
    pub subject: String,
    /// Issuer distinguished name
    pub issuer: String,
    /// Serial number (hex)
    pub serial: String,
    /// Not valid before
    pub not_before: DateTime<Utc>,
    /// Not valid after
    pub not_after: DateTime<Utc>,
    /// Raw public key bytes
    pub public_key: Vec<u8>,
}

/// Parse the first certificate in a PEM bundle.
pub fn inspect_certificate(pem_bytes: &[u8]) -> Result<CertificateSummary> {
    let blocks = pem::parse_many(pem_bytes)
        .map_err(|e| EnrollError::CertificateMismatch(format!("invalid PEM: {e}")))?;
    let leaf = blocks
        .iter()
        .find(|b| b.tag() == "CERTIFICATE")
        .ok_or_else(|| EnrollError::CertificateMismatch("no CERTIFICATE block".into()))?;

    let (_, cert) = x509_parser::parse_x509_certificate(leaf.contents())
        .map_err(|e| EnrollError::CertificateMismatch(format!("invalid certificate: {e}")))?;

    Ok(CertificateSummary {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial: cert.raw_serial_as_string(),
        not_before: asn1_to_utc(cert.validity().not_before),
        not_after: asn1_to_utc(cert.validity().not_after),
        public_key: cert.public_key().subject_public_key.data.to_vec(),
    })
}

/// Ensure the leaf certificate carries the public half of `key`.
pub fn ensure_matches_key(pem_bytes: &[u8], key: &PrivateKey) -> Result<CertificateSummary> {
    let summary = inspect_certificate(pem_bytes)?;
    if summary.public_key != key.public_key_raw() {
        return Err(EnrollError::CertificateMismatch(format!(
            "certificate {} (serial {}) was issued for a different public key",
            summary.subject, summary.serial
        )));
    }

    debug!(subject = %summary.subject, not_after = %summary.not_after, "certificate matches key");
    Ok(summary)
}

/// Convert an ASN.1 `GeneralizedTime` / `UTCTime` to `DateTime<Utc>`.
fn asn1_to_utc(t: x509_parser::time::ASN1Time) -> DateTime<Utc> {
    Utc.timestamp_opt(t.timestamp(), 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyAlgorithm;
    use rcgen::{CertificateParams, DistinguishedName, DnType};

    fn self_signed(key: &PrivateKey) -> String {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "identity:host:node-1");
        params.distinguished_name = dn;
        params.self_signed(key.key_pair()).unwrap().pem()
    }

    #[test]
    fn test_matching_key() {
        let key = PrivateKey::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let pem = self_signed(&key);

        let summary = ensure_matches_key(pem.as_bytes(), &key).unwrap();
        assert!(summary.subject.contains("identity:host:node-1"));
        assert!(summary.not_after > summary.not_before);
    }

    #[test]
    fn test_other_key_rejected() {
        let key = PrivateKey::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let other = PrivateKey::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let pem = self_signed(&other);

        assert!(matches!(
            ensure_matches_key(pem.as_bytes(), &key),
            Err(EnrollError::CertificateMismatch(_))
        ));
    }

    #[test]
    fn test_leaf_is_first_certificate() {
        let key = PrivateKey::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let other = PrivateKey::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let bundle = format!("{}{}", self_signed(&key), self_signed(&other));

        assert!(ensure_matches_key(bundle.as_bytes(), &key).is_ok());
    }

    #[test]
    fn test_garbage() {
        let key = PrivateKey::generate(KeyAlgorithm::EcdsaP256).unwrap();
        assert!(ensure_matches_key(b"", &key).is_err());
        assert!(ensure_matches_key(key.pem().as_bytes(), &key).is_err());
    }
}
