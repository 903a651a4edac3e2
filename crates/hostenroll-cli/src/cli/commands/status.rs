//! `hostenroll status` - show this host's enrollment request.

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use hostenroll::{naming, EnrollError, EnrollmentRequest, EnrollmentState};
use serde::Serialize;

use super::Context;
use crate::cli::args::StatusArgs;

#[derive(Debug, Serialize)]
struct ConditionReport {
    #[serde(rename = "type")]
    condition_type: String,
    reason: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    name: String,
    /// `None` when the CA service has no such request
    state: Option<EnrollmentState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signer: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    conditions: Vec<ConditionReport>,
    certificate_issued: bool,
}

impl StatusReport {
    fn missing(name: String) -> Self {
        Self {
            name,
            state: None,
            uid: None,
            created: None,
            signer: None,
            conditions: Vec::new(),
            certificate_issued: false,
        }
    }

    fn from_request(request: &EnrollmentRequest, state: EnrollmentState) -> Self {
        Self {
            name: request.name().to_string(),
            state: Some(state),
            uid: request.metadata.uid.clone(),
            created: request.metadata.creation_timestamp,
            signer: Some(request.spec.signer_name.clone()),
            conditions: request
                .status
                .conditions
                .iter()
                .filter(|c| c.is_set())
                .map(|c| ConditionReport {
                    condition_type: format!("{:?}", c.condition_type),
                    reason: c.reason.clone(),
                    message: c.message.clone(),
                })
                .collect(),
            certificate_issued: request.certificate().is_some(),
        }
    }
}

pub async fn execute(ctx: Context, args: StatusArgs) -> Result<()> {
    let host = ctx.host(&args.target)?;
    let host = naming::validate_host(&host)?;
    let name = naming::request_name(host);

    let profile = ctx.bootstrap_profile(&args.target)?;
    let client = profile.client_builder()?.build()?;

    let report = match client.requests().status(&name).await {
        Ok((request, state)) => StatusReport::from_request(&request, state),
        Err(EnrollError::NotFound { .. }) => StatusReport::missing(name),
        Err(e) => return Err(e.into()),
    };

    if ctx.output_format.print_structured(&report)? {
        return Ok(());
    }

    let state = match report.state {
        None => "not submitted".dimmed(),
        Some(EnrollmentState::Issued) => "issued".green().bold(),
        Some(terminal @ (EnrollmentState::Denied | EnrollmentState::Failed)) => {
            terminal.to_string().red().bold()
        }
        Some(other) => other.to_string().yellow().bold(),
    };

    println!("{} {}", report.name.bold(), state);
    if let Some(uid) = &report.uid {
        println!("  {} {}", "uid:".bold(), uid);
    }
    if let Some(created) = &report.created {
        println!("  {} {}", "created:".bold(), created.to_rfc3339());
    }
    if let Some(signer) = &report.signer {
        println!("  {} {}", "signer:".bold(), signer);
    }
    for condition in &report.conditions {
        println!(
            "  {} {}: {}",
            format!("{}:", condition.condition_type).bold(),
            condition.reason,
            condition.message
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostenroll::{ConditionType, EnrollmentRequestSpec, KeyUsage, RequestCondition};

    #[test]
    fn test_report_from_denied_request() {
        let mut request = EnrollmentRequest::new(
            "enroll-node-1",
            EnrollmentRequestSpec {
                request: b"csr".to_vec(),
                signer_name: naming::DEFAULT_SIGNER_NAME.into(),
                usages: vec![KeyUsage::ClientAuth],
                expiration_seconds: None,
            },
        );
        request.metadata.uid = Some("uid-3".into());
        request.status.conditions.push(RequestCondition {
            condition_type: ConditionType::Denied,
            status: None,
            reason: "NotInInventory".into(),
            message: "unknown host".into(),
            last_update_time: None,
        });

        let report = StatusReport::from_request(&request, request.state());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "denied");
        assert_eq!(json["uid"], "uid-3");
        assert_eq!(json["conditions"][0]["type"], "Denied");
        assert_eq!(json["certificate_issued"], false);
    }

    #[test]
    fn test_missing_report() {
        let json = serde_json::to_value(StatusReport::missing("enroll-node-9".into())).unwrap();
        assert_eq!(json["name"], "enroll-node-9");
        assert!(json["state"].is_null());
    }
}
