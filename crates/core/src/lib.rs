pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod export;
pub mod lifecycle;
pub mod reporting;
pub mod session;
pub mod visibility;

pub use domain::request::{
    Division, ExpenseRequest, Money, ReceiptKind, RequestId, RequestStatus,
};
pub use domain::site::{SiteAssignment, SiteId};
pub use domain::user::{name_key, Role, User, UserId};
pub use errors::{ApplicationError, DomainError, FieldError, InterfaceError};
pub use lifecycle::{plan_transition, receipt_gate, submit, RequestEvent, SubmitInput, TransitionPlan};
pub use visibility::visible;
