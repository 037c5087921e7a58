use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Expected request counts per lifecycle state after seeding.
const SEED_STATUS_CONTRACT: &[(&str, i64)] = &[
    ("pending_rpm", 2),
    ("pending_top", 2),
    ("approved_top", 1),
    ("done", 2),
    ("rejected", 1),
];

const SEED_USER_COUNT: i64 = 6;
const SEED_SITE_COUNT: i64 = 3;
const SEED_REQUEST_COUNT: i64 = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub users: i64,
    pub sites: i64,
    pub requests: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub checks: Vec<(&'static str, bool)>,
    pub all_present: bool,
}

/// Deterministic portal seed dataset: one user per role, three sites,
/// and requests covering every lifecycle state.
pub struct PortalSeedDataset;

impl PortalSeedDataset {
    pub const SQL: &'static str =
        include_str!("../../../config/fixtures/seed_portal_data.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        let users: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM portal_user").fetch_one(pool).await?;
        let sites: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM site_assignment").fetch_one(pool).await?;
        let requests: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM expense_request").fetch_one(pool).await?;

        Ok(SeedResult { users, sites, requests })
    }

    /// Verify that seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let user_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM portal_user").fetch_one(pool).await?;
        checks.push(("users", user_count == SEED_USER_COUNT));

        let site_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM site_assignment").fetch_one(pool).await?;
        checks.push(("sites", site_count == SEED_SITE_COUNT));

        let request_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM expense_request").fetch_one(pool).await?;
        checks.push(("requests", request_count == SEED_REQUEST_COUNT));

        for (status, expected) in SEED_STATUS_CONTRACT {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM expense_request WHERE status = ?1")
                    .bind(*status)
                    .fetch_one(pool)
                    .await?;
            checks.push((*status, count == *expected));
        }

        // Audit-field invariant over the seeded rows.
        let inconsistent: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM expense_request
             WHERE (status IN ('approved_top', 'done') AND approved_by IS NULL)
                OR (status NOT IN ('approved_top', 'done') AND approved_by IS NOT NULL)
                OR (status = 'rejected' AND rejected_by IS NULL)
                OR (status != 'rejected' AND rejected_by IS NOT NULL)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("audit-invariant", inconsistent == 0));

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { checks, all_present })
    }
}
