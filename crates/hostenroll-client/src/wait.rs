//! Waiting for an approver and signer to act on a request.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::api::RequestsApi;
use hostenroll_core::{
    ConditionType, EnrollError, EnrollmentRequest, EnrollmentState, IssuedCertificate, RequestRef,
    Result,
};
use tracing::{debug, info, warn};

impl RequestsApi<'_> {
    /// Poll `request` until a certificate is issued or `timeout` elapses.
    pub async fn wait_for_approval(
        &self,
        request: &RequestRef,
        timeout: Duration,
    ) -> Result<IssuedCertificate> {
        self.wait_for_approval_until(request, timeout, std::future::pending())
            .await
    }

    /// Like [`wait_for_approval`](Self::wait_for_approval), but gives up
    /// with [`EnrollError::Cancelled`] as soon as `cancel` resolves.
    ///
    /// Neither the deadline nor cancellation touches the request on the CA
    /// service; a later call with the same [`RequestRef`] resumes waiting.
    pub async fn wait_for_approval_until<C>(
        &self,
        request: &RequestRef,
        timeout: Duration,
        cancel: C,
    ) -> Result<IssuedCertificate>
    where
        C: Future<Output = ()>,
    {
        let started = Instant::now();

        tokio::select! {
            biased;
            () = cancel => {
                info!(name = %request.name, "wait cancelled");
                Err(EnrollError::Cancelled { name: request.name.clone() })
            }
            outcome = tokio::time::timeout(timeout, self.poll_until_terminal(request)) => {
                outcome.unwrap_or_else(|_| {
                    warn!(name = %request.name, ?timeout, "no decision before deadline");
                    Err(EnrollError::Timeout {
                        name: request.name.clone(),
                        waited: started.elapsed(),
                    })
                })
            }
        }
    }

    async fn poll_until_terminal(&self, request: &RequestRef) -> Result<IssuedCertificate> {
        let interval = self.client.poll_config().interval;
        let retry = self.client.retry_config();
        let mut last_state = None;
        let mut failures = 0u32;

        loop {
            let delay = match self.get(&request.name).await {
                Ok(current) => {
                    failures = 0;
                    check_uid(&current, request)?;

                    let state = current.state();
                    if last_state != Some(state) {
                        info!(name = %request.name, %state, "enrollment request state");
                        last_state = Some(state);
                    }

                    match state {
                        EnrollmentState::Denied => {
                            let (reason, message) = decision(&current, ConditionType::Denied);
                            return Err(EnrollError::Denied {
                                name: request.name.clone(),
                                reason,
                                message,
                            });
                        }
                        EnrollmentState::Failed => {
                            let (reason, message) = decision(&current, ConditionType::Failed);
                            return Err(EnrollError::Failed {
                                name: request.name.clone(),
                                reason,
                                message,
                            });
                        }
                        EnrollmentState::Issued => {
                            if let Some(pem) = current.certificate() {
                                return Ok(IssuedCertificate {
                                    request: request.clone(),
                                    pem: pem.to_vec(),
                                });
                            }
                            interval
                        }
                        EnrollmentState::Pending | EnrollmentState::Approved => interval,
                    }
                }
                Err(e) if e.is_transient() => {
                    let delay = match &e {
                        EnrollError::RateLimited {
                            retry_after: Some(secs),
                        } => Duration::from_secs(*secs),
                        _ => retry.backoff_for(failures),
                    };
                    warn!(
                        name = %request.name,
                        status = ?e.status_code(),
                        error = %e,
                        ?delay,
                        "status check failed, retrying"
                    );
                    failures = failures.saturating_add(1);
                    delay
                }
                Err(e) => return Err(e),
            };

            debug!(name = %request.name, ?delay, "sleeping before next status check");
            tokio::time::sleep(delay).await;
        }
    }
}

fn check_uid(current: &EnrollmentRequest, expected: &RequestRef) -> Result<()> {
    match current.metadata.uid.as_deref() {
        Some(found) if found != expected.uid => Err(EnrollError::Recreated {
            name: expected.name.clone(),
            expected: expected.uid.clone(),
            found: found.to_string(),
        }),
        _ => Ok(()),
    }
}

fn decision(request: &EnrollmentRequest, condition_type: ConditionType) -> (String, String) {
    request
        .condition(condition_type)
        .map(|c| (c.reason.clone(), c.message.clone()))
        .unwrap_or_default()
}
