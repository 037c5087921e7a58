use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use siteops_core::domain::request::{ExpenseRequest, ReceiptKind, RequestId};
use siteops_core::domain::site::{SiteAssignment, SiteId};
use siteops_core::domain::user::{name_key, User, UserId};
use siteops_core::lifecycle::TransitionPlan;

use super::{
    RepositoryError, RequestFilter, RequestRepository, SiteRepository, UserRepository,
};

/// In-memory doubles, behavior-compatible with the SQL repositories
/// including the compare-and-swap transition contract.
#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, ExpenseRequest>>,
}

fn filter_matches(request: &ExpenseRequest, filter: &RequestFilter) -> bool {
    if let Some(status) = &filter.status {
        if &request.status != status {
            return false;
        }
    }
    if let Some(division) = &filter.division {
        if &request.division != division {
            return false;
        }
    }
    if let Some(rpm) = &filter.rpm {
        if name_key(&request.rpm) != name_key(rpm) {
            return false;
        }
    }
    if let Some(site_id) = &filter.site_id {
        if request.site_ref.as_ref() != Some(site_id) {
            return false;
        }
    }
    if let Some(activity_id) = &filter.activity_id {
        if &request.activity_id != activity_id {
            return false;
        }
    }
    if let Some(date_from) = &filter.date_from {
        if &request.date < date_from {
            return false;
        }
    }
    if let Some(date_to) = &filter.date_to {
        if &request.date > date_to {
            return false;
        }
    }
    true
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<ExpenseRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn save(&self, request: ExpenseRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<ExpenseRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut matched: Vec<ExpenseRequest> = requests
            .values()
            .filter(|request| filter_matches(request, filter))
            .cloned()
            .collect();
        matched.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        Ok(matched)
    }

    async fn apply_transition(
        &self,
        id: &RequestId,
        plan: &TransitionPlan,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut requests = self.requests.write().await;
        let Some(request) = requests.get_mut(&id.0) else {
            return Ok(false);
        };

        Ok(request.apply_transition(plan, now).is_ok())
    }

    async fn set_receipt_url(
        &self,
        id: &RequestId,
        kind: &ReceiptKind,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut requests = self.requests.write().await;
        let Some(request) = requests.get_mut(&id.0) else {
            return Ok(false);
        };

        match kind {
            ReceiptKind::Transfer => request.transfer_receipt_url = Some(url.to_string()),
            ReceiptKind::Nota => request.nota_receipt_url = Some(url.to_string()),
        }
        request.updated_at = now;
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemorySiteRepository {
    sites: RwLock<HashMap<String, SiteAssignment>>,
}

#[async_trait::async_trait]
impl SiteRepository for InMemorySiteRepository {
    async fn find_by_id(&self, id: &SiteId) -> Result<Option<SiteAssignment>, RepositoryError> {
        let sites = self.sites.read().await;
        Ok(sites.get(&id.0).cloned())
    }

    async fn save(&self, site: SiteAssignment) -> Result<(), RepositoryError> {
        let mut sites = self.sites.write().await;
        sites.insert(site.site_id.0.clone(), site);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SiteAssignment>, RepositoryError> {
        let sites = self.sites.read().await;
        let mut listed: Vec<SiteAssignment> = sites.values().cloned().collect();
        listed.sort_by(|left, right| left.site_id.0.cmp(&right.site_id.0));
        Ok(listed)
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        let key = name_key(name);
        Ok(users.values().find(|user| name_key(&user.name) == key).cloned())
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use siteops_core::domain::request::{Division, RequestStatus};
    use siteops_core::domain::user::{Role, User, UserId};
    use siteops_core::lifecycle::{plan_transition, submit, RequestEvent, SubmitInput};

    use crate::repositories::{
        InMemoryRequestRepository, InMemoryUserRepository, RequestFilter, RequestRepository,
        UserRepository,
    };

    fn pic_sari() -> User {
        User {
            id: UserId("u-sari".to_string()),
            name: "Sari".to_string(),
            role: Role::Pic,
            division: Division::Permit,
        }
    }

    fn rpm_indra() -> User {
        User {
            id: UserId("u-indra".to_string()),
            name: "Indra".to_string(),
            role: Role::Rpm,
            division: Division::Permit,
        }
    }

    fn permit_input() -> SubmitInput {
        SubmitInput {
            activity_id: "ACT-1001".to_string(),
            request_type: "Site permit fee".to_string(),
            detail_plan: "Village permit".to_string(),
            division: Division::Permit,
            date: Utc::now(),
            nominal: "150000".to_string(),
            bank: "BCA".to_string(),
            bank_account_number: "8210045511".to_string(),
            rpm: Some("Indra".to_string()),
            rpm_id: None,
            site_ref: None,
        }
    }

    #[tokio::test]
    async fn submit_then_list_round_trips_the_record() {
        let repo = InMemoryRequestRepository::default();
        let request = submit(permit_input(), &pic_sari(), Utc::now()).expect("submit");

        repo.save(request.clone()).await.expect("save");
        let listed = repo
            .list(&RequestFilter {
                status: Some(RequestStatus::PendingRpm),
                ..RequestFilter::default()
            })
            .await
            .expect("list");

        assert_eq!(listed, vec![request]);
    }

    #[tokio::test]
    async fn in_memory_transition_honors_the_compare_and_swap_contract() {
        let repo = InMemoryRequestRepository::default();
        let request = submit(permit_input(), &pic_sari(), Utc::now()).expect("submit");
        repo.save(request.clone()).await.expect("save");

        let first = plan_transition(&request, &RequestEvent::RpmApprove, &rpm_indra())
            .expect("first plan");
        let second = plan_transition(&request, &RequestEvent::RpmReject, &rpm_indra())
            .expect("second plan");

        assert!(repo.apply_transition(&request.id, &first, Utc::now()).await.expect("first"));
        assert!(!repo.apply_transition(&request.id, &second, Utc::now()).await.expect("second"));

        let stored = repo.find_by_id(&request.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, RequestStatus::PendingTop);
    }

    #[tokio::test]
    async fn in_memory_user_repo_matches_names_case_insensitively() {
        let repo = InMemoryUserRepository::default();
        repo.save(rpm_indra()).await.expect("save");

        let found = repo.find_by_name("indra").await.expect("find");
        assert_eq!(found.map(|user| user.id), Some(UserId("u-indra".to_string())));
    }
}
