use chrono::Utc;
use sqlx::Row;

use siteops_core::domain::request::Division;
use siteops_core::domain::site::{SiteAssignment, SiteId};
use siteops_core::domain::user::name_key;

use super::{RepositoryError, SiteRepository};
use crate::DbPool;

pub struct SqlSiteRepository {
    pool: DbPool,
}

impl SqlSiteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_site(row: &sqlx::sqlite::SqliteRow) -> Result<SiteAssignment, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let site_id: String = row.try_get("site_id").map_err(decode)?;
    let site_name: String = row.try_get("site_name").map_err(decode)?;
    let region: String = row.try_get("region").map_err(decode)?;
    let city: String = row.try_get("city").map_err(decode)?;
    let rpm: String = row.try_get("rpm").map_err(decode)?;
    let pic: String = row.try_get("pic").map_err(decode)?;
    let division: String = row.try_get("division").map_err(decode)?;

    Ok(SiteAssignment {
        site_id: SiteId(site_id),
        site_name,
        region,
        city,
        rpm,
        pic,
        division: Division::parse(&division),
    })
}

#[async_trait::async_trait]
impl SiteRepository for SqlSiteRepository {
    async fn find_by_id(&self, id: &SiteId) -> Result<Option<SiteAssignment>, RepositoryError> {
        let row = sqlx::query(
            "SELECT site_id, site_name, region, city, rpm, pic, division
             FROM site_assignment WHERE site_id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_site(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, site: SiteAssignment) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO site_assignment (site_id, site_name, region, city, rpm, rpm_key, pic,
                                          division, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(site_id) DO UPDATE SET
                 site_name = excluded.site_name,
                 region = excluded.region,
                 city = excluded.city,
                 rpm = excluded.rpm,
                 rpm_key = excluded.rpm_key,
                 pic = excluded.pic,
                 division = excluded.division,
                 updated_at = excluded.updated_at",
        )
        .bind(&site.site_id.0)
        .bind(&site.site_name)
        .bind(&site.region)
        .bind(&site.city)
        .bind(&site.rpm)
        .bind(name_key(&site.rpm))
        .bind(&site.pic)
        .bind(site.division.storage_key())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<SiteAssignment>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT site_id, site_name, region, city, rpm, pic, division
             FROM site_assignment ORDER BY site_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_site).collect::<Result<Vec<_>, _>>()
    }
}
