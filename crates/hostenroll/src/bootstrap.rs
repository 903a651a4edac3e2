//! The enrollment flow: from a host name to an identity config on disk.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hostenroll_client::api::SubmitRequest;
use hostenroll_client::EnrollClient;
use hostenroll_core::{naming, EnrollError, KeyUsage, RequestRef, Result};
use hostenroll_pki::{csr, key, verify, CertificateSummary, KeyAlgorithm};
use tracing::{debug, info, warn};

use crate::profile::{load_identity, write_identity, BootstrapProfile, CaTrust};

/// What to enroll and where to put the results.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Host identifier
    pub host: String,
    /// Directory holding the host's private key
    pub key_dir: PathBuf,
    /// Where the identity config is written
    pub identity_path: PathBuf,
    /// Algorithm for a newly generated key
    pub algorithm: KeyAlgorithm,
    /// Signer asked to issue the certificate
    pub signer_name: String,
    /// Requested key usages
    pub usages: Vec<KeyUsage>,
    /// Requested certificate lifetime
    pub expiration_seconds: Option<u32>,
    /// Deadline for one round of waiting
    pub approval_timeout: Duration,
    /// Extra waiting rounds after a deadline passes
    pub resume_attempts: u32,
    /// Enroll even if an identity config already exists
    pub force: bool,
    /// Trust written into the identity config
    pub ca_trust: CaTrust,
}

impl BootstrapOptions {
    /// Options with the default signer, usages, lifetime and timeout
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        key_dir: impl Into<PathBuf>,
        identity_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            key_dir: key_dir.into(),
            identity_path: identity_path.into(),
            algorithm: KeyAlgorithm::default(),
            signer_name: naming::DEFAULT_SIGNER_NAME.into(),
            usages: vec![KeyUsage::ClientAuth],
            expiration_seconds: Some(naming::DEFAULT_EXPIRATION_SECONDS),
            approval_timeout: naming::DEFAULT_APPROVAL_TIMEOUT,
            resume_attempts: 0,
            force: false,
            ca_trust: CaTrust::System,
        }
    }

    /// Set the key algorithm
    #[must_use]
    pub const fn algorithm(mut self, algorithm: KeyAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the signer name
    #[must_use]
    pub fn signer(mut self, signer: impl Into<String>) -> Self {
        self.signer_name = signer.into();
        self
    }

    /// Set the requested lifetime
    #[must_use]
    pub const fn expiration_seconds(mut self, seconds: Option<u32>) -> Self {
        self.expiration_seconds = seconds;
        self
    }

    /// Set the approval deadline
    #[must_use]
    pub const fn approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    /// Set how many extra waiting rounds follow a deadline
    #[must_use]
    pub const fn resume_attempts(mut self, attempts: u32) -> Self {
        self.resume_attempts = attempts;
        self
    }

    /// Re-enroll over an existing identity config
    #[must_use]
    pub const fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set the trust written into the identity config
    #[must_use]
    pub fn ca_trust(mut self, trust: CaTrust) -> Self {
        self.ca_trust = trust;
        self
    }

    /// Path of the host's private key
    #[must_use]
    pub fn key_path(&self) -> PathBuf {
        key::key_path_for(&self.key_dir, &self.host)
    }
}

/// Result of a bootstrap run.
#[derive(Debug, Clone)]
pub enum BootstrapOutcome {
    /// A certificate was issued and the identity config written
    Enrolled {
        /// The request that was approved
        request: RequestRef,
        /// Issued certificate details
        certificate: CertificateSummary,
        /// Identity config location
        identity_path: PathBuf,
        /// Key file location
        key_path: PathBuf,
    },
    /// An identity config was already present; nothing was done
    AlreadyEnrolled {
        /// Identity config location
        identity_path: PathBuf,
    },
}

/// Runs the enrollment flow for one host.
#[derive(Debug, Clone)]
pub struct Bootstrapper {
    options: BootstrapOptions,
    client: EnrollClient,
}

impl Bootstrapper {
    /// Create a bootstrapper using `client` to reach the CA service
    #[must_use]
    pub const fn new(options: BootstrapOptions, client: EnrollClient) -> Self {
        Self { options, client }
    }

    /// Create a bootstrapper from a loaded bootstrap profile.
    ///
    /// The profile's CA trust is carried into the identity config.
    pub fn from_profile(options: BootstrapOptions, profile: &BootstrapProfile) -> Result<Self> {
        let client = profile.client_builder()?.build()?;
        Ok(Self::new(options.ca_trust(profile.ca_trust.clone()), client))
    }

    /// Options this bootstrapper runs with
    #[must_use]
    pub const fn options(&self) -> &BootstrapOptions {
        &self.options
    }

    /// Enroll the host, or stop early once `cancel` resolves.
    ///
    /// Safe to rerun after any failure: the key and the request are found
    /// again by name, so no duplicate request is created.
    pub async fn run<C>(&self, cancel: C) -> Result<BootstrapOutcome>
    where
        C: Future<Output = ()>,
    {
        let options = &self.options;
        let host = naming::validate_host(&options.host)?;

        if !options.force && has_identity(&options.identity_path) {
            info!(
                path = %options.identity_path.display(),
                "identity config already present, skipping enrollment"
            );
            return Ok(BootstrapOutcome::AlreadyEnrolled {
                identity_path: options.identity_path.clone(),
            });
        }

        let key_path = options.key_path();
        let key = key::load_or_create(&key_path, options.algorithm)?;
        let csr = csr::build(host, &key)?;

        let submit = SubmitRequest::new(naming::request_name(host), csr)
            .signer(options.signer_name.clone())
            .usages(options.usages.clone())
            .expiration_seconds(options.expiration_seconds);

        let requests = self.client.requests();
        let reference = requests.submit(&submit, &key).await?;

        info!(
            name = %reference.name,
            uid = %reference.uid,
            "Waiting for client certificate to be issued"
        );

        let mut cancel = std::pin::pin!(cancel);
        let mut round = 0;
        let issued = loop {
            match requests
                .wait_for_approval_until(&reference, options.approval_timeout, cancel.as_mut())
                .await
            {
                Ok(issued) => break issued,
                Err(EnrollError::Timeout { waited, .. }) if round < options.resume_attempts => {
                    round += 1;
                    warn!(
                        name = %reference.name,
                        ?waited,
                        round,
                        of = options.resume_attempts,
                        "still waiting for approval, resuming"
                    );
                }
                Err(e) => return Err(e),
            }
        };

        let certificate = verify::ensure_matches_key(&issued.pem, &key)?;
        debug!(
            serial = %certificate.serial,
            not_after = %certificate.not_after,
            "certificate issued"
        );

        write_identity(
            self.client.base_url(),
            &options.ca_trust,
            &issued.pem,
            key.pem().as_bytes(),
            &options.identity_path,
        )?;

        info!(
            name = %reference.name,
            path = %options.identity_path.display(),
            "host enrolled"
        );

        Ok(BootstrapOutcome::Enrolled {
            request: reference,
            certificate,
            identity_path: options.identity_path.clone(),
            key_path,
        })
    }
}

/// An identity config that carries client credentials.
fn has_identity(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }

    match load_identity(path) {
        Ok(config) => config
            .resolve_current()
            .is_some_and(|ctx| ctx.auth_info.client_certificate_data.is_some()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable identity config");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostenroll_client::testing::FakeCa;
    use hostenroll_client::PollConfig;
    use std::time::Instant;
    use tempfile::TempDir;

    struct Harness {
        fake: FakeCa,
        dir: TempDir,
    }

    impl Harness {
        async fn start() -> Self {
            Self {
                fake: FakeCa::start().await,
                dir: TempDir::new().unwrap(),
            }
        }

        fn client(&self) -> EnrollClient {
            EnrollClient::builder(self.fake.uri())
                .poll(PollConfig::new().interval(Duration::from_millis(20)))
                .build()
                .unwrap()
        }

        fn options(&self, host: &str) -> BootstrapOptions {
            BootstrapOptions::new(
                host,
                self.dir.path().join("keys"),
                self.dir.path().join("identity").join("config"),
            )
            .approval_timeout(Duration::from_secs(5))
        }

        fn bootstrapper(&self, options: BootstrapOptions) -> Bootstrapper {
            Bootstrapper::new(options, self.client())
        }
    }

    async fn approve_when_created(fake: &FakeCa, name: &str) {
        while !fake.approve(name) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_enrolls_node() {
        let h = Harness::start().await;
        let options = h.options("node-1").ca_trust(CaTrust::Data(h.fake.ca_pem().into()));
        let bootstrapper = h.bootstrapper(options);

        let (outcome, ()) = tokio::join!(
            bootstrapper.run(std::future::pending()),
            approve_when_created(&h.fake, "enroll-node-1"),
        );

        let BootstrapOutcome::Enrolled {
            request,
            certificate,
            identity_path,
            key_path,
        } = outcome.unwrap()
        else {
            panic!("expected a fresh enrollment");
        };

        assert_eq!(request.name, "enroll-node-1");
        assert!(certificate.subject.contains("identity:host:node-1"));
        assert!(key_path.ends_with("hostenroll-node-1.key"));

        let stored = h.fake.request("enroll-node-1").unwrap();
        assert_eq!(stored.spec.signer_name, "cluster.io/kube-apiserver-client");
        assert_eq!(stored.spec.usages, vec![KeyUsage::ClientAuth]);
        assert_eq!(stored.spec.expiration_seconds, Some(31_536_000));
        let info = csr::inspect(&stored.spec.request).unwrap();
        assert_eq!(info.common_name.as_deref(), Some("identity:host:node-1"));
        assert_eq!(info.organizations, vec!["identity:hosts".to_string()]);

        let config = load_identity(&identity_path).unwrap();
        let resolved = config.resolve_current().unwrap();
        assert_eq!(resolved.name, "default-context");
        assert_eq!(resolved.cluster.server, h.fake.uri());
        assert_eq!(
            resolved.cluster.certificate_authority_data.as_deref(),
            Some(h.fake.ca_pem().as_bytes())
        );
        let key_pem = std::fs::read(&key_path).unwrap();
        assert_eq!(resolved.auth_info.client_key_data.as_deref(), Some(&key_pem[..]));
        assert_eq!(
            resolved.auth_info.client_certificate_data.as_deref(),
            stored.status.certificate.as_deref()
        );
    }

    #[tokio::test]
    async fn test_rerun_reuses_key_and_request() {
        let h = Harness::start().await;
        let first =
            h.bootstrapper(h.options("node-1").approval_timeout(Duration::from_millis(200)));

        let err = first.run(std::future::pending()).await.unwrap_err();
        assert!(matches!(err, EnrollError::Timeout { .. }));
        let key_pem = std::fs::read(first.options().key_path()).unwrap();

        h.fake.approve("enroll-node-1");
        let second = h.bootstrapper(h.options("node-1"));
        let outcome = second.run(std::future::pending()).await.unwrap();

        assert!(matches!(outcome, BootstrapOutcome::Enrolled { .. }));
        assert_eq!(h.fake.len(), 1);
        assert_eq!(h.fake.create_count(), 1);
        assert_eq!(std::fs::read(second.options().key_path()).unwrap(), key_pem);
    }

    #[tokio::test]
    async fn test_repeated_submit_returns_same_request() {
        let h = Harness::start().await;
        let key = key::load_or_create(
            &key::key_path_for(h.dir.path(), "node-1"),
            KeyAlgorithm::default(),
        )
        .unwrap();
        let submit = SubmitRequest::new("enroll-node-1", csr::build("node-1", &key).unwrap());
        let client = h.client();

        let first = client.requests().submit(&submit, &key).await.unwrap();
        let second = client.requests().submit(&submit, &key).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.fake.len(), 1);
        assert_eq!(h.fake.create_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_runs_converge() {
        for round in 0..5 {
            let h = Harness::start().await;
            h.fake.set_auto_approve(true);
            let host = format!("node-{round}");

            let runs: Vec<_> = (0..2)
                .map(|_| {
                    let bootstrapper = h.bootstrapper(h.options(&host));
                    tokio::spawn(async move { bootstrapper.run(std::future::pending()).await })
                })
                .collect();

            for run in runs {
                let outcome = run.await.unwrap().unwrap();
                assert!(matches!(
                    outcome,
                    BootstrapOutcome::Enrolled { .. } | BootstrapOutcome::AlreadyEnrolled { .. }
                ));
            }

            assert_eq!(h.fake.len(), 1);
            assert_eq!(h.fake.create_count(), 1);

            let options = h.options(&host);
            let key_pem = std::fs::read(options.key_path()).unwrap();
            let identity = load_identity(&options.identity_path).unwrap();
            let resolved = identity.resolve_current().unwrap();
            assert_eq!(resolved.auth_info.client_key_data.as_deref(), Some(&key_pem[..]));
        }
    }

    #[tokio::test]
    async fn test_denied_is_terminal() {
        let h = Harness::start().await;
        let bootstrapper = h.bootstrapper(h.options("node-2"));

        let deny = async {
            while !h.fake.deny("enroll-node-2", "NotInInventory", "unknown host") {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        let (outcome, ()) = tokio::join!(bootstrapper.run(std::future::pending()), deny);

        let err = outcome.unwrap_err();
        assert!(
            matches!(err, EnrollError::Denied { ref reason, .. } if reason == "NotInInventory")
        );
        assert!(!err.is_retryable());
        assert!(!h.dir.path().join("identity").join("config").exists());
    }

    #[tokio::test]
    async fn test_deadline_is_bounded() {
        let h = Harness::start().await;
        let bootstrapper =
            h.bootstrapper(h.options("node-3").approval_timeout(Duration::from_millis(300)));

        let started = Instant::now();
        let err = bootstrapper.run(std::future::pending()).await.unwrap_err();

        assert!(matches!(err, EnrollError::Timeout { ref name, .. } if name == "enroll-node-3"));
        assert!(started.elapsed() < Duration::from_millis(1300));
    }

    #[tokio::test]
    async fn test_resume_rounds_keep_request() {
        let h = Harness::start().await;
        let bootstrapper = h.bootstrapper(
            h.options("node-4")
                .approval_timeout(Duration::from_millis(150))
                .resume_attempts(5),
        );

        let approve_late = async {
            tokio::time::sleep(Duration::from_millis(400)).await;
            approve_when_created(&h.fake, "enroll-node-4").await;
        };
        let (outcome, ()) = tokio::join!(bootstrapper.run(std::future::pending()), approve_late);

        assert!(matches!(outcome.unwrap(), BootstrapOutcome::Enrolled { .. }));
        assert_eq!(h.fake.create_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_leaves_request_in_place() {
        let h = Harness::start().await;
        let bootstrapper = h.bootstrapper(h.options("node-5"));

        let err = bootstrapper
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap_err();

        assert!(matches!(err, EnrollError::Cancelled { .. }));
        assert!(h.fake.request("enroll-node-5").is_some());
    }

    #[tokio::test]
    async fn test_existing_identity_short_circuits() {
        let h = Harness::start().await;
        h.fake.set_auto_approve(true);

        let first = h.bootstrapper(h.options("node-6"));
        assert!(matches!(
            first.run(std::future::pending()).await.unwrap(),
            BootstrapOutcome::Enrolled { .. }
        ));

        let again = h.bootstrapper(h.options("node-6"));
        assert!(matches!(
            again.run(std::future::pending()).await.unwrap(),
            BootstrapOutcome::AlreadyEnrolled { .. }
        ));

        let forced = h.bootstrapper(h.options("node-6").force(true));
        assert!(matches!(
            forced.run(std::future::pending()).await.unwrap(),
            BootstrapOutcome::Enrolled { .. }
        ));
        assert_eq!(h.fake.create_count(), 1);
    }

    #[tokio::test]
    async fn test_recreated_request_with_other_key() {
        let h = Harness::start().await;
        let bootstrapper =
            h.bootstrapper(h.options("node-7").approval_timeout(Duration::from_millis(200)));
        assert!(bootstrapper.run(std::future::pending()).await.is_err());

        // Someone else's request now holds the name.
        h.fake.delete("enroll-node-7");
        let other = h.bootstrapper(
            BootstrapOptions::new(
                "node-7",
                h.dir.path().join("other-keys"),
                h.dir.path().join("other-config"),
            )
            .approval_timeout(Duration::from_millis(200)),
        );
        assert!(other.run(std::future::pending()).await.is_err());

        let err = bootstrapper.run(std::future::pending()).await.unwrap_err();
        match err {
            EnrollError::Submission { source, .. } => {
                assert!(matches!(*source, EnrollError::Incompatible { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_host() {
        let h = Harness::start().await;
        let err = h
            .bootstrapper(h.options(""))
            .run(std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollError::Validation(_)));
        assert!(h.fake.is_empty());
    }
}
