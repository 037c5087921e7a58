use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row};

use siteops_core::domain::request::{
    Division, ExpenseRequest, Money, ReceiptKind, RequestId, RequestStatus,
};
use siteops_core::domain::site::SiteId;
use siteops_core::domain::user::{name_key, UserId};
use siteops_core::lifecycle::TransitionPlan;

use super::{RepositoryError, RequestFilter, RequestRepository};
use crate::DbPool;

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = "id, activity_id, requested_by, requested_by_name, rpm, rpm_id, \
     division, request_type, detail_plan, request_date, amount, bank, bank_account_number, \
     transfer_receipt_url, nota_receipt_url, status, approved_by, approved_at, rejected_by, \
     rejected_at, site_id, created_at, updated_at";

fn decode_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{field}: {error}")))
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<ExpenseRequest, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let id: String = row.try_get("id").map_err(decode)?;
    let activity_id: String = row.try_get("activity_id").map_err(decode)?;
    let requested_by: String = row.try_get("requested_by").map_err(decode)?;
    let requested_by_name: String = row.try_get("requested_by_name").map_err(decode)?;
    let rpm: String = row.try_get("rpm").map_err(decode)?;
    let rpm_id: Option<String> = row.try_get("rpm_id").map_err(decode)?;
    let division: String = row.try_get("division").map_err(decode)?;
    let request_type: String = row.try_get("request_type").map_err(decode)?;
    let detail_plan: String = row.try_get("detail_plan").map_err(decode)?;
    let request_date: String = row.try_get("request_date").map_err(decode)?;
    let amount: i64 = row.try_get("amount").map_err(decode)?;
    let bank: String = row.try_get("bank").map_err(decode)?;
    let bank_account_number: String = row.try_get("bank_account_number").map_err(decode)?;
    let transfer_receipt_url: Option<String> =
        row.try_get("transfer_receipt_url").map_err(decode)?;
    let nota_receipt_url: Option<String> = row.try_get("nota_receipt_url").map_err(decode)?;
    let status_str: String = row.try_get("status").map_err(decode)?;
    let approved_by: Option<String> = row.try_get("approved_by").map_err(decode)?;
    let approved_at_str: Option<String> = row.try_get("approved_at").map_err(decode)?;
    let rejected_by: Option<String> = row.try_get("rejected_by").map_err(decode)?;
    let rejected_at_str: Option<String> = row.try_get("rejected_at").map_err(decode)?;
    let site_id: Option<String> = row.try_get("site_id").map_err(decode)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode)?;
    let updated_at_str: String = row.try_get("updated_at").map_err(decode)?;

    let status = RequestStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{status_str}`")))?;

    Ok(ExpenseRequest {
        id: RequestId(id),
        activity_id,
        requested_by: UserId(requested_by),
        requested_by_name,
        rpm,
        rpm_id: rpm_id.map(UserId),
        division: Division::parse(&division),
        request_type,
        detail_plan,
        date: decode_timestamp("request_date", &request_date)?,
        amount: Money(amount),
        bank,
        bank_account_number,
        transfer_receipt_url,
        nota_receipt_url,
        status,
        approved_by,
        approved_at: approved_at_str
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        rejected_by,
        rejected_at: rejected_at_str
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        site_ref: site_id.map(SiteId),
        created_at: decode_timestamp("created_at", &created_at_str)?,
        updated_at: decode_timestamp("updated_at", &updated_at_str)?,
    })
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<ExpenseRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM expense_request WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_request(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, request: ExpenseRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO expense_request (id, activity_id, requested_by, requested_by_name,
                                          rpm, rpm_key, rpm_id, division, request_type,
                                          detail_plan, request_date, amount, bank,
                                          bank_account_number, transfer_receipt_url,
                                          nota_receipt_url, status, approved_by, approved_at,
                                          rejected_by, rejected_at, site_id, created_at,
                                          updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 activity_id = excluded.activity_id,
                 requested_by = excluded.requested_by,
                 requested_by_name = excluded.requested_by_name,
                 rpm = excluded.rpm,
                 rpm_key = excluded.rpm_key,
                 rpm_id = excluded.rpm_id,
                 division = excluded.division,
                 request_type = excluded.request_type,
                 detail_plan = excluded.detail_plan,
                 request_date = excluded.request_date,
                 amount = excluded.amount,
                 bank = excluded.bank,
                 bank_account_number = excluded.bank_account_number,
                 transfer_receipt_url = excluded.transfer_receipt_url,
                 nota_receipt_url = excluded.nota_receipt_url,
                 status = excluded.status,
                 approved_by = excluded.approved_by,
                 approved_at = excluded.approved_at,
                 rejected_by = excluded.rejected_by,
                 rejected_at = excluded.rejected_at,
                 site_id = excluded.site_id,
                 updated_at = excluded.updated_at",
        )
        .bind(&request.id.0)
        .bind(&request.activity_id)
        .bind(&request.requested_by.0)
        .bind(&request.requested_by_name)
        .bind(&request.rpm)
        .bind(name_key(&request.rpm))
        .bind(request.rpm_id.as_ref().map(|id| id.0.clone()))
        .bind(request.division.storage_key())
        .bind(&request.request_type)
        .bind(&request.detail_plan)
        .bind(request.date.to_rfc3339())
        .bind(request.amount.0)
        .bind(&request.bank)
        .bind(&request.bank_account_number)
        .bind(&request.transfer_receipt_url)
        .bind(&request.nota_receipt_url)
        .bind(request.status.as_str())
        .bind(&request.approved_by)
        .bind(request.approved_at.map(|dt| dt.to_rfc3339()))
        .bind(&request.rejected_by)
        .bind(request.rejected_at.map(|dt| dt.to_rfc3339()))
        .bind(request.site_ref.as_ref().map(|id| id.0.clone()))
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<ExpenseRequest>, RepositoryError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(format!(
            "SELECT {SELECT_COLUMNS} FROM expense_request WHERE 1 = 1"
        ));

        if let Some(status) = &filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(division) = &filter.division {
            builder.push(" AND division = ").push_bind(division.storage_key());
        }
        if let Some(rpm) = &filter.rpm {
            builder.push(" AND rpm_key = ").push_bind(name_key(rpm));
        }
        if let Some(site_id) = &filter.site_id {
            builder.push(" AND site_id = ").push_bind(site_id.0.clone());
        }
        if let Some(activity_id) = &filter.activity_id {
            builder.push(" AND activity_id = ").push_bind(activity_id.clone());
        }
        if let Some(date_from) = &filter.date_from {
            builder.push(" AND request_date >= ").push_bind(date_from.to_rfc3339());
        }
        if let Some(date_to) = &filter.date_to {
            builder.push(" AND request_date <= ").push_bind(date_to.to_rfc3339());
        }

        builder.push(" ORDER BY created_at ASC, id ASC");

        let rows: Vec<sqlx::sqlite::SqliteRow> =
            builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_request).collect::<Result<Vec<_>, _>>()
    }

    async fn apply_transition(
        &self,
        id: &RequestId,
        plan: &TransitionPlan,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let now_str = now.to_rfc3339();
        let result = sqlx::query(
            "UPDATE expense_request
                SET status = ?2,
                    updated_at = ?3,
                    approved_by = CASE WHEN ?4 IS NULL THEN approved_by ELSE ?4 END,
                    approved_at = CASE WHEN ?4 IS NULL THEN approved_at ELSE ?5 END,
                    rejected_by = CASE WHEN ?6 IS NULL THEN rejected_by ELSE ?6 END,
                    rejected_at = CASE WHEN ?6 IS NULL THEN rejected_at ELSE ?7 END
              WHERE id = ?1 AND status = ?8",
        )
        .bind(&id.0)
        .bind(plan.to.as_str())
        .bind(&now_str)
        .bind(&plan.approved_by)
        .bind(&now_str)
        .bind(&plan.rejected_by)
        .bind(&now_str)
        .bind(plan.from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_receipt_url(
        &self,
        id: &RequestId,
        kind: &ReceiptKind,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let sql = match kind {
            ReceiptKind::Transfer => {
                "UPDATE expense_request SET transfer_receipt_url = ?2, updated_at = ?3 WHERE id = ?1"
            }
            ReceiptKind::Nota => {
                "UPDATE expense_request SET nota_receipt_url = ?2, updated_at = ?3 WHERE id = ?1"
            }
        };

        let result = sqlx::query(sql)
            .bind(&id.0)
            .bind(url)
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
