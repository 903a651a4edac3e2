//! Stateful fake CA service for tests.
//!
//! Serves the enrollment request collection over a [`MockServer`] and
//! keeps every created resource in memory, so tests can exercise the
//! create-or-get contract and play the approver from the outside.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hostenroll_core::{ConditionType, EnrollmentRequest, RequestCondition};
use hostenroll_pki::testing::TestCa;
use wiremock::matchers::path_regex;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use crate::api::ENROLLMENT_REQUESTS_PATH;

#[derive(Default)]
struct State {
    requests: HashMap<String, EnrollmentRequest>,
    next_uid: u64,
    creates: usize,
    auto_approve: bool,
}

/// In-memory CA service backed by a [`TestCa`].
pub struct FakeCa {
    server: MockServer,
    state: Arc<Mutex<State>>,
    ca: Arc<TestCa>,
}

impl FakeCa {
    /// Start a fake CA service on a random local port.
    ///
    /// # Panics
    ///
    /// Panics if the signing CA cannot be generated.
    pub async fn start() -> Self {
        let ca = Arc::new(TestCa::generate("Fake Enrollment CA").expect("generate test CA"));
        let state = Arc::new(Mutex::new(State::default()));
        let server = MockServer::start().await;

        Mock::given(path_regex(format!(
            "^{ENROLLMENT_REQUESTS_PATH}(/[^/]+)?$"
        )))
        .respond_with(Handler {
            state: Arc::clone(&state),
            ca: Arc::clone(&ca),
        })
        .mount(&server)
        .await;

        Self { server, state, ca }
    }

    /// Base URL to point an [`EnrollClient`](crate::EnrollClient) at
    #[must_use]
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// PEM of the CA that signs issued certificates
    #[must_use]
    pub fn ca_pem(&self) -> &str {
        self.ca.certificate_pem()
    }

    /// Approve and sign every request as soon as it is created
    pub fn set_auto_approve(&self, enabled: bool) {
        self.lock().auto_approve = enabled;
    }

    /// Approve `name` and attach a certificate. Returns false if unknown.
    pub fn approve(&self, name: &str) -> bool {
        let mut state = self.lock();
        state.requests.get_mut(name).is_some_and(|request| {
            approve_and_sign(request, &self.ca);
            true
        })
    }

    /// Deny `name`. Returns false if unknown.
    pub fn deny(&self, name: &str, reason: &str, message: &str) -> bool {
        let mut state = self.lock();
        state.requests.get_mut(name).is_some_and(|request| {
            request
                .status
                .conditions
                .push(condition(ConditionType::Denied, reason, message));
            true
        })
    }

    /// Drop `name` as if an administrator deleted it
    pub fn delete(&self, name: &str) -> Option<EnrollmentRequest> {
        self.lock().requests.remove(name)
    }

    /// Snapshot of a stored request
    #[must_use]
    pub fn request(&self, name: &str) -> Option<EnrollmentRequest> {
        self.lock().requests.get(name).cloned()
    }

    /// Number of stored requests
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().requests.len()
    }

    /// Returns true if nothing has been stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful creates (excludes 409 answers)
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.lock().creates
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Handler {
    state: Arc<Mutex<State>>,
    ca: Arc<TestCa>,
}

impl Respond for Handler {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let name = request
            .url
            .path()
            .strip_prefix(ENROLLMENT_REQUESTS_PATH)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty());

        match (request.method.as_str(), name) {
            ("POST", None) => {
                let Ok(mut created) = serde_json::from_slice::<EnrollmentRequest>(&request.body)
                else {
                    return status(400, "malformed enrollment request");
                };
                let name = created.name().to_string();
                if state.requests.contains_key(&name) {
                    return status(409, &format!("enrollmentrequests {name:?} already exists"));
                }

                state.next_uid += 1;
                created.metadata.uid = Some(format!("uid-{}", state.next_uid));
                created.metadata.creation_timestamp = None;
                created.status = hostenroll_core::EnrollmentRequestStatus::default();
                if state.auto_approve {
                    approve_and_sign(&mut created, &self.ca);
                }

                state.creates += 1;
                state.requests.insert(name, created.clone());
                ResponseTemplate::new(201).set_body_json(created)
            }
            ("GET", Some(name)) => match state.requests.get(name) {
                Some(stored) => ResponseTemplate::new(200).set_body_json(stored),
                None => status(404, &format!("enrollmentrequests {name:?} not found")),
            },
            _ => status(405, "method not allowed"),
        }
    }
}

fn approve_and_sign(request: &mut EnrollmentRequest, ca: &TestCa) {
    request
        .status
        .conditions
        .push(condition(ConditionType::Approved, "AutoApproved", "approved by test"));

    let days = request
        .spec
        .expiration_seconds
        .map_or(365, |secs| (secs / 86_400).max(1));
    let signed = std::str::from_utf8(&request.spec.request)
        .map_err(|e| e.to_string())
        .and_then(|pem| ca.sign_request(pem, days).map_err(|e| e.to_string()));

    match signed {
        Ok(cert) => request.status.certificate = Some(cert.into_bytes()),
        Err(e) => request
            .status
            .conditions
            .push(condition(ConditionType::Failed, "SignerError", &e)),
    }
}

fn condition(condition_type: ConditionType, reason: &str, message: &str) -> RequestCondition {
    RequestCondition {
        condition_type,
        status: Some("True".into()),
        reason: reason.into(),
        message: message.into(),
        last_update_time: None,
    }
}

fn status(code: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(code).set_body_json(serde_json::json!({
        "kind": "Status",
        "code": code,
        "message": message,
    }))
}
