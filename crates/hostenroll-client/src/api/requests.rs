//! Enrollment request API endpoints.

use std::collections::HashSet;

use crate::EnrollClient;
use hostenroll_core::{
    naming, EnrollError, EnrollmentRequest, EnrollmentRequestSpec, EnrollmentState, KeyUsage,
    RequestRef, Result,
};
use hostenroll_pki::{csr, CsrPem, PrivateKey};
use tracing::{debug, info, warn};

/// Collection path of enrollment requests on the CA service
pub const ENROLLMENT_REQUESTS_PATH: &str = "/apis/certificates/v1/enrollmentrequests";

/// What to ask the CA service for
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Deterministic request name
    pub name: String,
    /// PEM CSR signed by the host key
    pub csr: CsrPem,
    /// Signer expected to issue the certificate
    pub signer_name: String,
    /// Requested key usages
    pub usages: Vec<KeyUsage>,
    /// Requested certificate lifetime
    pub expiration_seconds: Option<u32>,
}

impl SubmitRequest {
    /// Client-auth request for the default signer with a one-year lifetime
    #[must_use]
    pub fn new(name: impl Into<String>, csr: CsrPem) -> Self {
        Self {
            name: name.into(),
            csr,
            signer_name: naming::DEFAULT_SIGNER_NAME.to_string(),
            usages: vec![KeyUsage::ClientAuth],
            expiration_seconds: Some(naming::DEFAULT_EXPIRATION_SECONDS),
        }
    }

    /// Set the signer name
    #[must_use]
    pub fn signer(mut self, signer: impl Into<String>) -> Self {
        self.signer_name = signer.into();
        self
    }

    /// Set the requested usages
    #[must_use]
    pub fn usages(mut self, usages: Vec<KeyUsage>) -> Self {
        self.usages = usages;
        self
    }

    /// Set the requested lifetime; `None` leaves it to the signer
    #[must_use]
    pub const fn expiration_seconds(mut self, seconds: Option<u32>) -> Self {
        self.expiration_seconds = seconds;
        self
    }

    fn to_resource(&self) -> EnrollmentRequest {
        EnrollmentRequest::new(
            self.name.clone(),
            EnrollmentRequestSpec {
                request: self.csr.as_bytes().to_vec(),
                signer_name: self.signer_name.clone(),
                usages: self.usages.clone(),
                expiration_seconds: self.expiration_seconds,
            },
        )
    }
}

/// Enrollment request API endpoints
pub struct RequestsApi<'a> {
    pub(crate) client: &'a EnrollClient,
}

impl<'a> RequestsApi<'a> {
    pub(crate) const fn new(client: &'a EnrollClient) -> Self {
        Self { client }
    }

    /// Create a request; fails with `AlreadyExists` if the name is taken
    pub async fn create(&self, request: &EnrollmentRequest) -> Result<EnrollmentRequest> {
        let created: EnrollmentRequest = self
            .client
            .post(ENROLLMENT_REQUESTS_PATH, request)
            .await
            .map_err(|e| match e {
                EnrollError::AlreadyExists { .. } => EnrollError::AlreadyExists {
                    name: request.name().to_string(),
                },
                other => other,
            })?;
        Ok(created)
    }

    /// Fetch a request by name
    pub async fn get(&self, name: &str) -> Result<EnrollmentRequest> {
        self.client
            .get(&format!("{ENROLLMENT_REQUESTS_PATH}/{name}"))
            .await
            .map_err(|e| match e {
                EnrollError::NotFound { .. } => EnrollError::NotFound {
                    resource: format!("enrollment request {name}"),
                },
                other => other,
            })
    }

    /// Fetch a request and derive its client-side state
    pub async fn status(&self, name: &str) -> Result<(EnrollmentRequest, EnrollmentState)> {
        let request = self.get(name).await?;
        let state = request.state();
        Ok((request, state))
    }

    /// Create the request, or adopt an existing compatible one.
    ///
    /// Submitting twice with the same key yields the same [`RequestRef`]
    /// and a single resource on the CA service. Transient failures are
    /// retried per the client's [`RetryConfig`](crate::RetryConfig); every
    /// other failure comes back as [`EnrollError::Submission`].
    pub async fn submit(&self, request: &SubmitRequest, key: &PrivateKey) -> Result<RequestRef> {
        self.submit_inner(request, key)
            .await
            .map_err(|source| EnrollError::Submission {
                name: request.name.clone(),
                source: Box::new(source),
            })
    }

    async fn submit_inner(&self, request: &SubmitRequest, key: &PrivateKey) -> Result<RequestRef> {
        let resource = request.to_resource();
        let retry = self.client.retry_config();
        let mut attempt = 0;

        let stored = loop {
            match self.create(&resource).await {
                Ok(created) => {
                    info!(name = %request.name, "created enrollment request");
                    break created;
                }
                Err(EnrollError::AlreadyExists { .. }) => {
                    debug!(name = %request.name, "enrollment request exists, checking compatibility");
                    let existing = self.get(&request.name).await?;
                    ensure_compatible(&existing, request, key)?;
                    info!(name = %request.name, "reusing existing enrollment request");
                    break existing;
                }
                Err(e) if attempt < retry.max_retries && retry.should_retry(&e) => {
                    let delay = match &e {
                        EnrollError::RateLimited {
                            retry_after: Some(secs),
                        } => std::time::Duration::from_secs(*secs).min(retry.max_backoff),
                        _ => retry.backoff_for(attempt),
                    };
                    warn!(
                        name = %request.name,
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        status = ?e.status_code(),
                        error = %e,
                        "create failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        stored.reference().ok_or_else(|| {
            EnrollError::InvalidResponse(format!(
                "enrollment request {} has no uid",
                stored.name()
            ))
        })
    }
}

/// Check that an existing request was built from the same inputs.
fn ensure_compatible(
    existing: &EnrollmentRequest,
    wanted: &SubmitRequest,
    key: &PrivateKey,
) -> Result<()> {
    let incompatible = |reason: String| EnrollError::Incompatible {
        name: wanted.name.clone(),
        reason,
    };

    if existing.spec.signer_name != wanted.signer_name {
        return Err(incompatible(format!(
            "signer is {}, wanted {}",
            existing.spec.signer_name, wanted.signer_name
        )));
    }

    let have: HashSet<_> = existing.spec.usages.iter().collect();
    let want: HashSet<_> = wanted.usages.iter().collect();
    if have != want {
        return Err(incompatible("requested usages differ".into()));
    }

    let theirs = csr::inspect(&existing.spec.request)
        .map_err(|e| incompatible(format!("stored CSR is unreadable: {e}")))?;
    let ours = csr::inspect(wanted.csr.as_bytes())?;

    if theirs.public_key != key.public_key_raw() {
        return Err(incompatible("CSR carries a different public key".into()));
    }
    if theirs.common_name != ours.common_name || theirs.organizations != ours.organizations {
        return Err(incompatible("CSR subject differs".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RetryConfig;
    use hostenroll_pki::KeyAlgorithm;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn key() -> PrivateKey {
        PrivateKey::generate(KeyAlgorithm::EcdsaP256).unwrap()
    }

    fn submit_request(key: &PrivateKey) -> SubmitRequest {
        SubmitRequest::new("enroll-node-1", csr::build("node-1", key).unwrap())
    }

    fn stored(request: &SubmitRequest, uid: Option<&str>) -> serde_json::Value {
        let mut resource = request.to_resource();
        resource.metadata.uid = uid.map(String::from);
        serde_json::to_value(resource).unwrap()
    }

    fn client(server: &MockServer) -> EnrollClient {
        EnrollClient::builder(server.uri())
            .bearer_token("bootstrap-token")
            .retry(
                RetryConfig::new()
                    .max_retries(2)
                    .initial_backoff(Duration::from_millis(10)),
            )
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_creates() {
        let server = MockServer::start().await;
        let key = key();
        let request = submit_request(&key);

        Mock::given(method("POST"))
            .and(path(ENROLLMENT_REQUESTS_PATH))
            .and(header("authorization", "Bearer bootstrap-token"))
            .and(body_partial_json(serde_json::json!({
                "metadata": { "name": "enroll-node-1" },
                "spec": {
                    "signerName": "cluster.io/kube-apiserver-client",
                    "usages": ["client auth"],
                    "expirationSeconds": 31_536_000
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(stored(&request, Some("uid-1"))))
            .expect(1)
            .mount(&server)
            .await;

        let reference = client(&server).requests().submit(&request, &key).await.unwrap();
        assert_eq!(reference.name, "enroll-node-1");
        assert_eq!(reference.uid, "uid-1");
    }

    #[tokio::test]
    async fn test_submit_adopts_compatible_existing() {
        let server = MockServer::start().await;
        let key = key();
        let request = submit_request(&key);

        Mock::given(method("POST"))
            .and(path(ENROLLMENT_REQUESTS_PATH))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{ENROLLMENT_REQUESTS_PATH}/enroll-node-1")))
            .respond_with(ResponseTemplate::new(200).set_body_json(stored(&request, Some("uid-7"))))
            .mount(&server)
            .await;

        let reference = client(&server).requests().submit(&request, &key).await.unwrap();
        assert_eq!(reference.uid, "uid-7");
    }

    #[tokio::test]
    async fn test_submit_rejects_foreign_key() {
        let server = MockServer::start().await;
        let key = key();
        let other = self::key();
        let request = submit_request(&key);
        let theirs = submit_request(&other);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(stored(&theirs, Some("uid-9"))))
            .mount(&server)
            .await;

        let err = client(&server).requests().submit(&request, &key).await.unwrap_err();
        match err {
            EnrollError::Submission { source, .. } => {
                assert!(matches!(*source, EnrollError::Incompatible { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_other_signer() {
        let server = MockServer::start().await;
        let key = key();
        let request = submit_request(&key);
        let theirs = request.clone().signer("cluster.io/legacy-unknown");

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(stored(&theirs, Some("uid-9"))))
            .mount(&server)
            .await;

        let err = client(&server).requests().submit(&request, &key).await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("enroll-node-1"));
    }

    #[tokio::test]
    async fn test_submit_retries_server_errors() {
        let server = MockServer::start().await;
        let key = key();
        let request = submit_request(&key);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(stored(&request, Some("uid-2"))))
            .mount(&server)
            .await;

        let reference = client(&server).requests().submit(&request, &key).await.unwrap();
        assert_eq!(reference.uid, "uid-2");
    }

    #[tokio::test]
    async fn test_submit_gives_up_after_retries() {
        let server = MockServer::start().await;
        let key = key();
        let request = submit_request(&key);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server).requests().submit(&request, &key).await.unwrap_err();
        assert!(matches!(err, EnrollError::Submission { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_submit_unauthorized_not_retried() {
        let server = MockServer::start().await;
        let key = key();
        let request = submit_request(&key);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).requests().submit(&request, &key).await.unwrap_err();
        match &err {
            EnrollError::Submission { source, .. } => {
                assert!(matches!(**source, EnrollError::Unauthorized));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_submit_requires_uid() {
        let server = MockServer::start().await;
        let key = key();
        let request = submit_request(&key);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(stored(&request, None)))
            .mount(&server)
            .await;

        let err = client(&server).requests().submit(&request, &key).await.unwrap_err();
        match err {
            EnrollError::Submission { source, .. } => {
                assert!(matches!(*source, EnrollError::InvalidResponse(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({
                    "kind": "Status",
                    "message": "enrollmentrequests \"enroll-node-2\" not found"
                })),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .requests()
            .status("enroll-node-2")
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollError::NotFound { .. }));
    }
}
