use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::request::{
    Division, ExpenseRequest, Money, ReceiptKind, RequestId, RequestStatus,
};
use crate::domain::site::SiteId;
use crate::domain::user::{name_key, Role, User, UserId};
use crate::errors::{DomainError, FieldError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestEvent {
    RpmApprove,
    RpmReject,
    TopApprove,
    TopReject,
    OpsComplete,
}

impl RequestEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RpmApprove => "rpm_approve",
            Self::RpmReject => "rpm_reject",
            Self::TopApprove => "top_approve",
            Self::TopReject => "top_reject",
            Self::OpsComplete => "ops_complete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rpm_approve" => Some(Self::RpmApprove),
            "rpm_reject" => Some(Self::RpmReject),
            "top_approve" => Some(Self::TopApprove),
            "top_reject" => Some(Self::TopReject),
            "ops_complete" => Some(Self::OpsComplete),
            _ => None,
        }
    }
}

/// A validated transition, ready to apply. `from` doubles as the
/// compare-and-swap precondition for the storage layer: the write only
/// lands if the stored status still equals `from`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPlan {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub event: RequestEvent,
    pub approved_by: Option<String>,
    pub rejected_by: Option<String>,
}

/// True when the acting RPM is the one a request is routed to: by the
/// durable id when the record carries one, otherwise by the legacy
/// normalized display-name match.
pub fn addressed_to_rpm(request: &ExpenseRequest, actor: &User) -> bool {
    match &request.rpm_id {
        Some(rpm_id) => rpm_id == &actor.id,
        None => name_key(&request.rpm) == name_key(&actor.name),
    }
}

/// Validate an event against the current state and the acting user.
/// State is checked first, so replaying an already-applied event on a
/// processed request reports `InvalidTransition` regardless of who
/// asks; an actor who fails the gate on a live transition gets
/// `Unauthorized`.
pub fn plan_transition(
    request: &ExpenseRequest,
    event: &RequestEvent,
    actor: &User,
) -> Result<TransitionPlan, DomainError> {
    use RequestEvent::{OpsComplete, RpmApprove, RpmReject, TopApprove, TopReject};
    use RequestStatus::{ApprovedTop, Done, PendingRpm, PendingTop, Rejected};

    let to = match (request.status, event) {
        (PendingRpm, RpmApprove) => PendingTop,
        (PendingRpm, RpmReject) => Rejected,
        (PendingTop, TopApprove) => ApprovedTop,
        (PendingTop, TopReject) => Rejected,
        (ApprovedTop, OpsComplete) => Done,
        _ => {
            return Err(DomainError::InvalidTransition { from: request.status, event: *event });
        }
    };

    let authorized = match event {
        RpmApprove | RpmReject => actor.role == Role::Rpm && addressed_to_rpm(request, actor),
        TopApprove | TopReject => matches!(actor.role, Role::TopManagement | Role::Ops),
        OpsComplete => actor.role == Role::Ops,
    };
    if !authorized {
        return Err(DomainError::Unauthorized {
            actor: actor.name.clone(),
            action: format!("apply `{}` to request {}", event.as_str(), request.id.0),
        });
    }

    let approved_by = matches!(event, TopApprove).then(|| actor.name.clone());
    let rejected_by = matches!(event, RpmReject | TopReject).then(|| actor.name.clone());

    Ok(TransitionPlan { from: request.status, to, event: *event, approved_by, rejected_by })
}

pub fn plan_transition_with_audit<S>(
    request: &ExpenseRequest,
    event: &RequestEvent,
    actor: &User,
    sink: &S,
    audit: &AuditContext,
) -> Result<TransitionPlan, DomainError>
where
    S: AuditSink,
{
    let result = plan_transition(request, event, actor);
    match &result {
        Ok(plan) => {
            sink.emit(
                AuditEvent::new(
                    Some(request.id.clone()),
                    audit.correlation_id.clone(),
                    "lifecycle.transition_planned",
                    AuditCategory::Lifecycle,
                    audit.actor.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("from", plan.from.as_str())
                .with_metadata("to", plan.to.as_str())
                .with_metadata("event", plan.event.as_str()),
            );
        }
        Err(error) => {
            sink.emit(
                AuditEvent::new(
                    Some(request.id.clone()),
                    audit.correlation_id.clone(),
                    "lifecycle.transition_rejected",
                    AuditCategory::Lifecycle,
                    audit.actor.clone(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("error", error.to_string()),
            );
        }
    }
    result
}

/// Upload gate for evidence attachments. Transfer receipts document the
/// executed disbursement and require a completed request; nota receipts
/// can accompany a request at any point after submission.
pub fn receipt_gate(request: &ExpenseRequest, kind: &ReceiptKind) -> Result<(), DomainError> {
    match kind {
        ReceiptKind::Transfer if request.status != RequestStatus::Done => {
            Err(DomainError::ReceiptPrecondition { kind: *kind, status: request.status })
        }
        _ => Ok(()),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitInput {
    pub activity_id: String,
    pub request_type: String,
    pub detail_plan: String,
    pub division: Division,
    pub date: DateTime<Utc>,
    /// Free-form nominal as entered; normalized to integer rupiah here.
    pub nominal: String,
    pub bank: String,
    pub bank_account_number: String,
    /// Supervising manager, required for PIC submissions. RPM
    /// submissions route to the submitter and ignore this field.
    pub rpm: Option<String>,
    pub rpm_id: Option<UserId>,
    pub site_ref: Option<SiteId>,
}

/// Create a new request. The submitting role decides the entry state:
/// PIC submissions await their line manager, RPM submissions go
/// straight to the executive gate.
pub fn submit(
    input: SubmitInput,
    actor: &User,
    now: DateTime<Utc>,
) -> Result<ExpenseRequest, DomainError> {
    let (status, rpm, rpm_id) = match actor.role {
        Role::Pic => {
            let rpm = input.rpm.clone().unwrap_or_default();
            (RequestStatus::PendingRpm, rpm, input.rpm_id.clone())
        }
        Role::Rpm => (RequestStatus::PendingTop, actor.name.clone(), Some(actor.id.clone())),
        _ => {
            return Err(DomainError::Unauthorized {
                actor: actor.name.clone(),
                action: "submit an expense request".to_string(),
            });
        }
    };

    let mut field_errors = Vec::new();
    require_text(&mut field_errors, "activity_id", &input.activity_id);
    require_text(&mut field_errors, "request_type", &input.request_type);
    require_text(&mut field_errors, "detail_plan", &input.detail_plan);
    require_text(&mut field_errors, "bank", &input.bank);
    require_text(&mut field_errors, "bank_account_number", &input.bank_account_number);
    if actor.role == Role::Pic {
        require_text(&mut field_errors, "rpm", &rpm);
    }

    let amount = match Money::parse_nominal(&input.nominal) {
        Ok(amount) if amount > Money(0) => amount,
        Ok(_) => {
            field_errors.push(FieldError {
                field: "nominal",
                message: "nominal must be greater than zero".to_string(),
            });
            Money(0)
        }
        Err(error) => {
            field_errors.push(FieldError { field: "nominal", message: error.to_string() });
            Money(0)
        }
    };

    if !field_errors.is_empty() {
        return Err(DomainError::Validation { field_errors });
    }

    Ok(ExpenseRequest {
        id: RequestId(format!("REQ-{}", Uuid::new_v4())),
        activity_id: input.activity_id,
        requested_by: actor.id.clone(),
        requested_by_name: actor.name.clone(),
        rpm,
        rpm_id,
        division: input.division,
        request_type: input.request_type,
        detail_plan: input.detail_plan,
        date: input.date,
        amount,
        bank: input.bank,
        bank_account_number: input.bank_account_number,
        transfer_receipt_url: None,
        nota_receipt_url: None,
        status,
        approved_by: None,
        approved_at: None,
        rejected_by: None,
        rejected_at: None,
        site_ref: input.site_ref,
        created_at: now,
        updated_at: now,
    })
}

fn require_text(field_errors: &mut Vec<FieldError>, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        field_errors.push(FieldError { field, message: "is required".to_string() });
    }
}
