//! In-process certificate authority for tests.
//!
//! Plays the signer behind a fake CA service: takes the CSR a host
//! submitted and issues a client certificate for its public key.

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateSigningRequestParams,
    DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};

/// Self-signed CA that signs enrollment CSRs.
pub struct TestCa {
    key_pair: KeyPair,
    certificate: Certificate,
    cert_pem: String,
}

impl TestCa {
    /// Create a CA with the given common name.
    pub fn generate(name: &str) -> Result<Self, rcgen::Error> {
        let key_pair = KeyPair::generate()?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, name);
        dn.push(DnType::OrganizationName, "hostenroll");
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let certificate = params.self_signed(&key_pair)?;
        let cert_pem = certificate.pem();

        Ok(Self {
            key_pair,
            certificate,
            cert_pem,
        })
    }

    /// CA certificate PEM, used as trust material by clients.
    pub fn certificate_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Issue a client certificate for a PEM CSR, keeping its subject.
    pub fn sign_request(&self, csr_pem: &str, validity_days: u32) -> Result<String, rcgen::Error> {
        let mut csr = CertificateSigningRequestParams::from_pem(csr_pem)?;

        csr.params.is_ca = IsCa::NoCa;
        csr.params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        csr.params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

        let now = time::OffsetDateTime::now_utc();
        csr.params.not_before = now;
        csr.params.not_after = now + time::Duration::days(i64::from(validity_days));

        let cert = csr.signed_by(&self.certificate, &self.key_pair)?;
        Ok(cert.pem())
    }
}
