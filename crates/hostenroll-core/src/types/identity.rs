use serde::{Deserialize, Serialize};

use super::common::base64_bytes;

/// Connection profile: named clusters, auth entries and contexts.
///
/// The same shape serves as the low-trust bootstrap profile handed to the
/// node and as the identity config written after enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IdentityConfig {
    /// Profile format version
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,

    /// Always "Config"
    #[serde(default = "default_kind")]
    pub kind: String,

    /// Named cluster entries
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,

    /// Named auth entries
    #[serde(rename = "users", default)]
    pub auth_infos: Vec<NamedAuthInfo>,

    /// Named contexts binding a cluster to an auth entry
    #[serde(default)]
    pub contexts: Vec<NamedContext>,

    /// Context used by default
    #[serde(default)]
    pub current_context: String,
}

/// Cluster entry with its name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    /// Entry name
    pub name: String,
    /// Entry body
    pub cluster: Cluster,
}

/// Endpoint and the material needed to trust it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cluster {
    /// Endpoint URL
    pub server: String,

    /// Path to a PEM CA bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority: Option<String>,

    /// Inline PEM CA bundle
    #[serde(
        default,
        with = "base64_bytes::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_authority_data: Option<Vec<u8>>,

    /// Skip server certificate verification
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure_skip_tls_verify: bool,
}

/// Auth entry with its name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedAuthInfo {
    /// Entry name
    pub name: String,
    /// Entry body
    #[serde(rename = "user")]
    pub auth_info: AuthInfo,
}

/// Client credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthInfo {
    /// Inline PEM client certificate
    #[serde(
        default,
        with = "base64_bytes::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_certificate_data: Option<Vec<u8>>,

    /// Inline PEM client key
    #[serde(
        default,
        with = "base64_bytes::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_key_data: Option<Vec<u8>>,

    /// Bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Context entry with its name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    /// Entry name
    pub name: String,
    /// Entry body
    pub context: Context,
}

/// Binds a cluster entry to an auth entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Cluster entry name
    pub cluster: String,
    /// Auth entry name
    pub user: String,
    /// Default namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Entries selected by a context
#[derive(Debug, Clone, Copy)]
pub struct ResolvedContext<'a> {
    /// Context name
    pub name: &'a str,
    /// Cluster entry
    pub cluster: &'a Cluster,
    /// Auth entry
    pub auth_info: &'a AuthInfo,
    /// Namespace, if the context sets one
    pub namespace: Option<&'a str>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            clusters: Vec::new(),
            auth_infos: Vec::new(),
            contexts: Vec::new(),
            current_context: String::new(),
        }
    }
}

impl IdentityConfig {
    /// Look up a cluster entry
    #[must_use]
    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.cluster)
    }

    /// Look up an auth entry
    #[must_use]
    pub fn auth_info(&self, name: &str) -> Option<&AuthInfo> {
        self.auth_infos
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.auth_info)
    }

    /// Look up a context entry
    #[must_use]
    pub fn context(&self, name: &str) -> Option<&Context> {
        self.contexts
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.context)
    }

    /// Resolve a context to the entries it references.
    ///
    /// A context naming an auth entry that does not exist resolves to empty
    /// credentials, the way anonymous bootstrap profiles are written.
    #[must_use]
    pub fn resolve<'a>(&'a self, context_name: &'a str) -> Option<ResolvedContext<'a>> {
        static ANONYMOUS: AuthInfo = AuthInfo {
            client_certificate_data: None,
            client_key_data: None,
            token: None,
        };

        let context = self.context(context_name)?;
        let cluster = self.cluster(&context.cluster)?;
        let auth_info = self.auth_info(&context.user).unwrap_or(&ANONYMOUS);

        Some(ResolvedContext {
            name: context_name,
            cluster,
            auth_info,
            namespace: context.namespace.as_deref(),
        })
    }

    /// Resolve the current context
    #[must_use]
    pub fn resolve_current(&self) -> Option<ResolvedContext<'_>> {
        self.resolve(&self.current_context)
    }
}

fn default_api_version() -> String {
    String::from("v1")
}

fn default_kind() -> String {
    String::from("Config")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IdentityConfig {
        IdentityConfig {
            clusters: vec![NamedCluster {
                name: "bootstrap".into(),
                cluster: Cluster {
                    server: "https://10.0.0.1:6443".into(),
                    certificate_authority_data: Some(b"ca".to_vec()),
                    ..Cluster::default()
                },
            }],
            auth_infos: vec![NamedAuthInfo {
                name: "tls-bootstrap".into(),
                auth_info: AuthInfo {
                    token: Some("abcdef.0123456789abcdef".into()),
                    ..AuthInfo::default()
                },
            }],
            contexts: vec![NamedContext {
                name: "bootstrap".into(),
                context: Context {
                    cluster: "bootstrap".into(),
                    user: "tls-bootstrap".into(),
                    namespace: None,
                },
            }],
            current_context: "bootstrap".into(),
            ..IdentityConfig::default()
        }
    }

    #[test]
    fn test_resolve_current() {
        let cfg = config();
        let resolved = cfg.resolve_current().unwrap();
        assert_eq!(resolved.cluster.server, "https://10.0.0.1:6443");
        assert_eq!(
            resolved.auth_info.token.as_deref(),
            Some("abcdef.0123456789abcdef")
        );
    }

    #[test]
    fn test_resolve_missing_entries() {
        let mut cfg = config();
        cfg.auth_infos.clear();
        let resolved = cfg.resolve_current().unwrap();
        assert!(resolved.auth_info.token.is_none());

        cfg.current_context = "nope".into();
        assert!(cfg.resolve_current().is_none());
    }

    #[test]
    fn test_yaml_field_names() {
        let yaml = serde_yaml::to_string(&config()).unwrap();
        assert!(yaml.contains("apiVersion: v1"));
        assert!(yaml.contains("current-context: bootstrap"));
        assert!(yaml.contains("certificate-authority-data: Y2E="));
        assert!(yaml.contains("users:"));
        assert!(!yaml.contains("insecure-skip-tls-verify"));

        let parsed: IdentityConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config());
    }
}
