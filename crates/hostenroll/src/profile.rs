//! Bootstrap profiles and identity configs.
//!
//! Both files share the kubeconfig layout of [`IdentityConfig`]. The
//! bootstrap profile is read to reach the CA service; the identity config is
//! written once a certificate has been issued.

use std::fs;
use std::path::{Path, PathBuf};

use hostenroll_client::EnrollClientBuilder;
use hostenroll_core::{
    naming, AuthInfo, Cluster, Context, EnrollError, IdentityConfig, NamedAuthInfo,
    NamedCluster, NamedContext, Result,
};
use hostenroll_pki::key::write_private;
use tracing::{debug, info};

/// How a client decides whether to trust the CA service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CaTrust {
    /// Platform root certificates
    #[default]
    System,
    /// Inline PEM bundle
    Data(Vec<u8>),
    /// PEM bundle on disk
    File(PathBuf),
    /// No server verification
    Insecure,
}

impl CaTrust {
    fn from_cluster(cluster: &Cluster, base_dir: &Path) -> Self {
        if let Some(data) = cluster.certificate_authority_data.as_ref().filter(|d| !d.is_empty()) {
            Self::Data(data.clone())
        } else if let Some(file) = cluster.certificate_authority.as_deref().filter(|f| !f.is_empty()) {
            Self::File(base_dir.join(file))
        } else if cluster.insecure_skip_tls_verify {
            Self::Insecure
        } else {
            Self::System
        }
    }

    fn apply(&self, cluster: &mut Cluster) {
        match self {
            Self::System => {}
            Self::Data(pem) => cluster.certificate_authority_data = Some(pem.clone()),
            Self::File(path) => {
                cluster.certificate_authority = Some(path.to_string_lossy().into_owned());
            }
            Self::Insecure => cluster.insecure_skip_tls_verify = true,
        }
    }

    /// Configure `builder` to trust the CA service this way
    pub fn configure(&self, builder: EnrollClientBuilder) -> Result<EnrollClientBuilder> {
        Ok(match self {
            Self::System => builder,
            Self::Data(pem) => builder.ca_certificates_pem(pem.clone()),
            Self::File(path) => {
                let pem = fs::read(path).map_err(|e| {
                    EnrollError::Config(format!(
                        "cannot read CA bundle {}: {e}",
                        path.display()
                    ))
                })?;
                builder.ca_certificates_pem(pem)
            }
            Self::Insecure => builder.danger_accept_invalid_certs(true),
        })
    }
}

/// Connection details for the CA service, taken from a bootstrap profile.
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapProfile {
    /// CA service endpoint
    pub endpoint: String,
    /// Trust for the endpoint
    pub ca_trust: CaTrust,
    /// Bearer token
    pub token: Option<String>,
    /// Client certificate PEM
    pub client_certificate: Option<Vec<u8>>,
    /// Client key PEM
    pub client_key: Option<Vec<u8>>,
}

impl std::fmt::Debug for BootstrapProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapProfile")
            .field("endpoint", &self.endpoint)
            .field("ca_trust", &self.ca_trust)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("client_certificate", &self.client_certificate.is_some())
            .finish_non_exhaustive()
    }
}

impl BootstrapProfile {
    /// Start a client builder with the profile's endpoint, trust and credentials
    pub fn client_builder(&self) -> Result<EnrollClientBuilder> {
        let mut builder = self
            .ca_trust
            .configure(EnrollClientBuilder::new(self.endpoint.clone()))?;

        if let Some(token) = &self.token {
            builder = builder.bearer_token(token.clone());
        }

        match (&self.client_certificate, &self.client_key) {
            (Some(cert), Some(key)) => builder = builder.client_identity_pem(cert, key),
            (None, None) => {}
            _ => {
                return Err(EnrollError::Config(
                    "bootstrap profile has a client certificate without a key, or a key without a certificate".into(),
                ))
            }
        }

        Ok(builder)
    }
}

/// Read a bootstrap profile and resolve its current context.
pub fn load_bootstrap(path: &Path) -> Result<BootstrapProfile> {
    let raw = fs::read_to_string(path).map_err(|e| {
        EnrollError::Config(format!("cannot read bootstrap profile {}: {e}", path.display()))
    })?;
    let config: IdentityConfig = serde_yaml::from_str(&raw).map_err(|e| {
        EnrollError::Config(format!("invalid bootstrap profile {}: {e}", path.display()))
    })?;

    let resolved = config.resolve_current().ok_or_else(|| {
        EnrollError::Config(format!(
            "bootstrap profile {} has no usable current context {:?}",
            path.display(),
            config.current_context
        ))
    })?;

    if resolved.cluster.server.is_empty() {
        return Err(EnrollError::Config(format!(
            "bootstrap profile {} has no server for context {}",
            path.display(),
            resolved.name
        )));
    }

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let profile = BootstrapProfile {
        endpoint: resolved.cluster.server.clone(),
        ca_trust: CaTrust::from_cluster(resolved.cluster, base_dir),
        token: resolved.auth_info.token.clone().filter(|t| !t.is_empty()),
        client_certificate: resolved.auth_info.client_certificate_data.clone(),
        client_key: resolved.auth_info.client_key_data.clone(),
    };

    debug!(
        path = %path.display(),
        context = resolved.name,
        endpoint = %profile.endpoint,
        "loaded bootstrap profile"
    );
    Ok(profile)
}

/// Build the identity config for an issued certificate.
#[must_use]
pub fn identity_config(
    endpoint: &str,
    ca_trust: &CaTrust,
    cert_pem: &[u8],
    key_pem: &[u8],
) -> IdentityConfig {
    let mut cluster = Cluster {
        server: endpoint.to_string(),
        ..Cluster::default()
    };
    ca_trust.apply(&mut cluster);

    IdentityConfig {
        clusters: vec![NamedCluster {
            name: naming::DEFAULT_CLUSTER_NAME.into(),
            cluster,
        }],
        auth_infos: vec![NamedAuthInfo {
            name: naming::DEFAULT_AUTH_NAME.into(),
            auth_info: AuthInfo {
                client_certificate_data: Some(cert_pem.to_vec()),
                client_key_data: Some(key_pem.to_vec()),
                token: None,
            },
        }],
        contexts: vec![NamedContext {
            name: naming::DEFAULT_CONTEXT_NAME.into(),
            context: Context {
                cluster: naming::DEFAULT_CLUSTER_NAME.into(),
                user: naming::DEFAULT_AUTH_NAME.into(),
                namespace: Some(naming::DEFAULT_NAMESPACE.into()),
            },
        }],
        current_context: naming::DEFAULT_CONTEXT_NAME.into(),
        ..IdentityConfig::default()
    }
}

/// Write the identity config for an issued certificate to `path`.
///
/// The file is replaced atomically and is readable by the owner only. On
/// failure any existing file at `path` is left untouched.
pub fn write_identity(
    endpoint: &str,
    ca_trust: &CaTrust,
    cert_pem: &[u8],
    key_pem: &[u8],
    path: &Path,
) -> Result<()> {
    let config = identity_config(endpoint, ca_trust, cert_pem, key_pem);
    let yaml = serde_yaml::to_string(&config).map_err(|e| EnrollError::persist(path, e))?;

    write_private(path, yaml.as_bytes()).map_err(|e| EnrollError::persist(path, e))?;

    info!(path = %path.display(), "wrote identity config");
    Ok(())
}

/// Read an identity config written by [`write_identity`].
pub fn load_identity(path: &Path) -> Result<IdentityConfig> {
    let raw = fs::read_to_string(path)?;
    serde_yaml::from_str(&raw).map_err(|e| {
        EnrollError::Config(format!("invalid identity config {}: {e}", path.display()))
    })
}
