use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use siteops_core::domain::request::{
    Division, ExpenseRequest, ReceiptKind, RequestId, RequestStatus,
};
use siteops_core::domain::site::{SiteAssignment, SiteId};
use siteops_core::domain::user::{User, UserId};
use siteops_core::lifecycle::TransitionPlan;

pub mod memory;
pub mod request;
pub mod site;
pub mod user;

pub use memory::{InMemoryRequestRepository, InMemorySiteRepository, InMemoryUserRepository};
pub use request::SqlRequestRepository;
pub use site::SqlSiteRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Store-level filter. Role visibility is applied by callers on top of
/// this; the filter only narrows what is fetched.
#[derive(Clone, Debug, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub division: Option<Division>,
    /// Supervising manager, matched on the normalized name key.
    pub rpm: Option<String>,
    pub site_id: Option<SiteId>,
    pub activity_id: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId)
        -> Result<Option<ExpenseRequest>, RepositoryError>;

    async fn save(&self, request: ExpenseRequest) -> Result<(), RepositoryError>;

    /// Creation-ordered listing.
    async fn list(&self, filter: &RequestFilter) -> Result<Vec<ExpenseRequest>, RepositoryError>;

    /// Compare-and-swap status write: lands only if the stored status
    /// still equals `plan.from`. Returns false when a concurrent actor
    /// won the race; the caller maps that to `InvalidTransition`.
    async fn apply_transition(
        &self,
        id: &RequestId,
        plan: &TransitionPlan,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Single-field receipt URL write; false when the request is gone.
    async fn set_receipt_url(
        &self,
        id: &RequestId,
        kind: &ReceiptKind,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait SiteRepository: Send + Sync {
    async fn find_by_id(&self, id: &SiteId) -> Result<Option<SiteAssignment>, RepositoryError>;
    async fn save(&self, site: SiteAssignment) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<SiteAssignment>, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
}
