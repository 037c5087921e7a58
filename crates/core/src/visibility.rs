use crate::domain::request::{Division, ExpenseRequest, RequestStatus};
use crate::domain::user::{Role, User};
use crate::lifecycle::addressed_to_rpm;

/// Divisions QC is allowed to inspect.
fn is_quality_division(division: &Division) -> bool {
    matches!(division, Division::Snd | Division::ElJointer | Division::Document)
}

/// The single role-scoped read predicate. Every read surface (list,
/// reporting, export) filters through this function; no screen carries
/// its own predicate chain.
///
/// Pure and deterministic: re-evaluating with identical inputs never
/// changes the result.
pub fn visible(request: &ExpenseRequest, user: &User) -> bool {
    match user.role {
        Role::Hr => false,
        Role::Rpm => {
            let in_approval_queue =
                request.status == RequestStatus::PendingRpm && addressed_to_rpm(request, user);
            in_approval_queue || request.division == user.division
        }
        Role::TopManagement => true,
        Role::Ops => matches!(
            request.status,
            RequestStatus::PendingTop | RequestStatus::ApprovedTop | RequestStatus::Done
        ),
        Role::Pic => request.division == user.division,
        Role::Qc => request.division == user.division && is_quality_division(&request.division),
    }
}

/// Convenience filter over a request set, preserving order.
pub fn visible_for<'a>(requests: &'a [ExpenseRequest], user: &User) -> Vec<&'a ExpenseRequest> {
    requests.iter().filter(|request| visible(request, user)).collect()
}
