//! Certificate signing request construction.

use hostenroll_core::{naming, EnrollError, Result};
use rcgen::{CertificateParams, DistinguishedName, DnType};
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::prelude::FromDer;

use crate::PrivateKey;

/// PEM-encoded PKCS#10 request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrPem(String);

impl CsrPem {
    /// PEM text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// PEM bytes, as sent to the CA service
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for CsrPem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build a CSR for `host`, signed by `key`.
///
/// The subject is `CN=identity:host:<host>, O=identity:hosts`. No
/// extensions are requested; the CA decides usages from the enrollment
/// request.
pub fn build(host: &str, key: &PrivateKey) -> Result<CsrPem> {
    naming::validate_host(host)?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, naming::common_name(host));
    dn.push(DnType::OrganizationName, naming::CSR_ORGANIZATION);

    let mut params = CertificateParams::default();
    params.distinguished_name = dn;

    let csr = params
        .serialize_request(key.key_pair())
        .map_err(|e| EnrollError::Encoding(format!("failed to sign request: {e}")))?;
    let pem = csr
        .pem()
        .map_err(|e| EnrollError::Encoding(format!("failed to encode request: {e}")))?;

    Ok(CsrPem(pem))
}

/// Fields of a parsed CSR that matter for enrollment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrInfo {
    /// Subject common name
    pub common_name: Option<String>,
    /// Subject organizations
    pub organizations: Vec<String>,
    /// Raw public key bytes
    pub public_key: Vec<u8>,
}

/// Parse a PEM CSR.
pub fn inspect(pem_bytes: &[u8]) -> Result<CsrInfo> {
    let block = pem::parse(pem_bytes)
        .map_err(|e| EnrollError::Encoding(format!("invalid CSR PEM: {e}")))?;
    if block.tag() != "CERTIFICATE REQUEST" {
        return Err(EnrollError::Encoding(format!(
            "expected CERTIFICATE REQUEST block, found {}",
            block.tag()
        )));
    }

    let (_, csr) = X509CertificationRequest::from_der(block.contents())
        .map_err(|e| EnrollError::Encoding(format!("invalid CSR: {e}")))?;
    let info = &csr.certification_request_info;

    let common_name = info
        .subject
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from);
    let organizations = info
        .subject
        .iter_organization()
        .filter_map(|o| o.as_str().ok())
        .map(String::from)
        .collect();

    Ok(CsrInfo {
        common_name,
        organizations,
        public_key: info.subject_pki.subject_public_key.data.to_vec(),
    })
}
