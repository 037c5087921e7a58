use thiserror::Error;

use crate::domain::request::{ReceiptKind, RequestStatus};
use crate::lifecycle::RequestEvent;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("request validation failed: {}", format_field_errors(field_errors))]
    Validation { field_errors: Vec<FieldError> },
    #[error("actor `{actor}` is not authorized to {action}")]
    Unauthorized { actor: String, action: String },
    #[error("invalid transition from {from:?} using event {event:?}")]
    InvalidTransition { from: RequestStatus, event: RequestEvent },
    #[error("{kind:?} receipt cannot be attached while the request is {status:?}")]
    ReceiptPrecondition { kind: ReceiptKind, status: RequestStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

fn format_field_errors(field_errors: &[FieldError]) -> String {
    field_errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{kind} `{id}` was not found")]
    NotFound { kind: &'static str, id: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::Conflict { .. } => {
                "This request was already processed. Refresh the list and try again."
            }
            Self::NotFound { .. } => "The record no longer exists. Refresh the list.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = "unassigned".to_string();
        match value {
            ApplicationError::Domain(domain) => match domain {
                DomainError::Validation { .. } | DomainError::InvariantViolation(_) => {
                    Self::BadRequest { message: domain.to_string(), correlation_id: unassigned }
                }
                DomainError::Unauthorized { .. } => {
                    Self::Forbidden { message: domain.to_string(), correlation_id: unassigned }
                }
                DomainError::InvalidTransition { .. } | DomainError::ReceiptPrecondition { .. } => {
                    Self::Conflict { message: domain.to_string(), correlation_id: unassigned }
                }
            },
            ApplicationError::NotFound { .. } => {
                Self::NotFound { message: value.to_string(), correlation_id: unassigned }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::request::RequestStatus;
    use crate::errors::{ApplicationError, DomainError, FieldError, InterfaceError};
    use crate::lifecycle::RequestEvent;

    #[test]
    fn validation_error_maps_to_bad_request_with_correlation_id() {
        let interface = ApplicationError::from(DomainError::Validation {
            field_errors: vec![FieldError {
                field: "nominal",
                message: "nominal value is empty".to_string(),
            }],
        })
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn unauthorized_maps_to_forbidden() {
        let interface = ApplicationError::from(DomainError::Unauthorized {
            actor: "sari".to_string(),
            action: "approve as supervising RPM".to_string(),
        })
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
        assert_eq!(interface.user_message(), "You are not allowed to perform this action.");
    }

    #[test]
    fn invalid_transition_maps_to_conflict_with_processed_message() {
        let interface = ApplicationError::from(DomainError::InvalidTransition {
            from: RequestStatus::Done,
            event: RequestEvent::RpmReject,
        })
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(
            interface.user_message(),
            "This request was already processed. Refresh the list and try again."
        );
    }

    #[test]
    fn not_found_maps_to_not_found() {
        let interface = ApplicationError::NotFound { kind: "request", id: "REQ-404".to_string() }
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::NotFound { .. }));
        assert_eq!(interface.correlation_id(), "req-4");
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface =
            ApplicationError::Persistence("database lock timeout".to_string()).into_interface("req-5");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("invalid receipts dir".to_string()).into_interface("req-6");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
