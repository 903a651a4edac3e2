//! CA service client implementation.

use crate::api::RequestsApi;
use crate::config::{PollConfig, RetryConfig};
use hostenroll_core::{EnrollError, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the CA service's enrollment request API
#[derive(Clone)]
pub struct EnrollClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: HttpClient,
    base_url: String,
    retry_config: RetryConfig,
    poll_config: PollConfig,
}

impl std::fmt::Debug for EnrollClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollClient")
            .field("base_url", &self.inner.base_url)
            .finish_non_exhaustive()
    }
}

impl EnrollClient {
    /// Create a builder for the CA service at `base_url`
    #[must_use]
    pub fn builder(base_url: impl Into<String>) -> EnrollClientBuilder {
        EnrollClientBuilder::new(base_url)
    }

    /// Access enrollment request endpoints
    #[must_use]
    pub fn requests(&self) -> RequestsApi<'_> {
        RequestsApi::new(self)
    }

    /// Base URL of the CA service
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub(crate) fn retry_config(&self) -> &RetryConfig {
        &self.inner.retry_config
    }

    pub(crate) fn poll_config(&self) -> &PollConfig {
        &self.inner.poll_config
    }

    /// Perform a GET request
    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.build_url(path);
        debug!(url = %url, "GET request");

        let response = self
            .inner
            .http
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;

        self.handle_response(response).await
    }

    /// Perform a POST request with JSON body
    pub(crate) async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.build_url(path);
        debug!(url = %url, "POST request");

        let response = self
            .inner
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        self.handle_response(response).await
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    /// Handle an API response that returns JSON
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await.map_err(transport_error)?;
            serde_json::from_str(&body).map_err(EnrollError::Json)
        } else {
            self.handle_error(status.as_u16(), response).await
        }
    }

    /// Convert an error response to an EnrollError
    async fn handle_error<T>(&self, status: u16, response: reqwest::Response) -> Result<T> {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        // Status objects carry the reason in "message"
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .or_else(|| v.get("error"))
                    .and_then(|e| e.as_str())
                    .map(String::from)
            })
            .unwrap_or(body);

        match status {
            401 => Err(EnrollError::Unauthorized),
            403 => Err(EnrollError::Forbidden(message)),
            404 => Err(EnrollError::NotFound { resource: message }),
            409 => Err(EnrollError::AlreadyExists { name: message }),
            429 => {
                warn!(?retry_after, "rate limited by CA service");
                Err(EnrollError::RateLimited { retry_after })
            }
            _ => Err(EnrollError::Api {
                code: status,
                message,
            }),
        }
    }
}

fn transport_error(e: reqwest::Error) -> EnrollError {
    if e.is_connect() {
        EnrollError::Connection(e.to_string())
    } else {
        EnrollError::Http(e.to_string())
    }
}

/// Builder for configuring an [`EnrollClient`]
pub struct EnrollClientBuilder {
    base_url: String,
    timeout: Duration,
    user_agent: String,
    bearer_token: Option<String>,
    ca_pem: Option<Vec<u8>>,
    identity_pem: Option<Vec<u8>>,
    accept_invalid_certs: bool,
    retry_config: RetryConfig,
    poll_config: PollConfig,
}

impl EnrollClientBuilder {
    /// Create a new builder for the CA service at `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("hostenroll/{}", env!("CARGO_PKG_VERSION")),
            bearer_token: None,
            ca_pem: None,
            identity_pem: None,
            accept_invalid_certs: false,
            retry_config: RetryConfig::default(),
            poll_config: PollConfig::default(),
        }
    }

    /// Set the per-request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the User-Agent header
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Authenticate with a bearer token
    #[must_use]
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Trust only the CA certificates in this PEM bundle
    #[must_use]
    pub fn ca_certificates_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.ca_pem = Some(pem.into());
        self
    }

    /// Authenticate with a client certificate and key
    #[must_use]
    pub fn client_identity_pem(mut self, cert_pem: &[u8], key_pem: &[u8]) -> Self {
        let mut identity = Vec::with_capacity(cert_pem.len() + key_pem.len() + 1);
        identity.extend_from_slice(cert_pem);
        if !cert_pem.ends_with(b"\n") {
            identity.push(b'\n');
        }
        identity.extend_from_slice(key_pem);
        self.identity_pem = Some(identity);
        self
    }

    /// Skip server certificate verification
    #[must_use]
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Set retry configuration
    #[must_use]
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Set polling configuration
    #[must_use]
    pub fn poll(mut self, config: PollConfig) -> Self {
        self.poll_config = config;
        self
    }

    /// Build the client
    pub fn build(self) -> Result<EnrollClient> {
        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| EnrollError::Config(format!("invalid CA endpoint {:?}: {e}", self.base_url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(EnrollError::Config(format!(
                "unsupported scheme in CA endpoint {:?}",
                self.base_url
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = &self.bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| EnrollError::Config("bearer token contains invalid characters".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut http = HttpClient::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .default_headers(headers)
            .danger_accept_invalid_certs(self.accept_invalid_certs);

        if let Some(pem) = &self.ca_pem {
            let roots = reqwest::Certificate::from_pem_bundle(pem)
                .map_err(|e| EnrollError::Config(format!("invalid CA certificates: {e}")))?;
            if roots.is_empty() {
                return Err(EnrollError::Config("CA bundle contains no certificates".into()));
            }
            http = http.tls_built_in_root_certs(false);
            for root in roots {
                http = http.add_root_certificate(root);
            }
        }

        if let Some(identity) = &self.identity_pem {
            http = with_identity(http, identity)?;
        }

        let http = http
            .build()
            .map_err(|e| EnrollError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(EnrollClient {
            inner: Arc::new(ClientInner {
                http,
                base_url: self.base_url.trim_end_matches('/').to_string(),
                retry_config: self.retry_config,
                poll_config: self.poll_config,
            }),
        })
    }
}

#[cfg(feature = "rustls")]
fn with_identity(
    http: reqwest::ClientBuilder,
    identity_pem: &[u8],
) -> Result<reqwest::ClientBuilder> {
    let identity = reqwest::Identity::from_pem(identity_pem)
        .map_err(|e| EnrollError::Config(format!("invalid client certificate: {e}")))?;
    Ok(http.identity(identity))
}

#[cfg(not(feature = "rustls"))]
fn with_identity(
    _http: reqwest::ClientBuilder,
    _identity_pem: &[u8],
) -> Result<reqwest::ClientBuilder> {
    Err(EnrollError::Config(
        "client certificate authentication requires the rustls feature".into(),
    ))
}
