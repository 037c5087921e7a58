use chrono::Utc;
use sqlx::Row;

use siteops_core::domain::request::Division;
use siteops_core::domain::user::{name_key, Role, User, UserId};

use super::{RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let id: String = row.try_get("id").map_err(decode)?;
    let name: String = row.try_get("name").map_err(decode)?;
    let role_str: String = row.try_get("role").map_err(decode)?;
    let division: String = row.try_get("division").map_err(decode)?;

    let role = Role::parse(&role_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role_str}`")))?;

    Ok(User { id: UserId(id), name, role, division: Division::parse(&division) })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, role, division FROM portal_user WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<User>, RepositoryError> {
        let row =
            sqlx::query("SELECT id, name, role, division FROM portal_user WHERE name_key = ?")
                .bind(name_key(name))
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO portal_user (id, name, name_key, role, division, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 name_key = excluded.name_key,
                 role = excluded.role,
                 division = excluded.division,
                 updated_at = excluded.updated_at",
        )
        .bind(&user.id.0)
        .bind(&user.name)
        .bind(name_key(&user.name))
        .bind(user.role.as_str())
        .bind(user.division.storage_key())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use siteops_core::domain::request::Division;
    use siteops_core::domain::user::{Role, User, UserId};

    use super::SqlUserRepository;
    use crate::repositories::UserRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn indra() -> User {
        User {
            id: UserId("u-indra".to_string()),
            name: "Indra".to_string(),
            role: Role::Rpm,
            division: Division::Permit,
        }
    }

    #[tokio::test]
    async fn save_and_find_by_id_round_trip() {
        let pool = setup().await;
        let repo = SqlUserRepository::new(pool);

        repo.save(indra()).await.expect("save");
        let found = repo.find_by_id(&UserId("u-indra".to_string())).await.expect("find");

        assert_eq!(found, Some(indra()));
    }

    #[tokio::test]
    async fn find_by_name_is_case_insensitive() {
        let pool = setup().await;
        let repo = SqlUserRepository::new(pool);

        repo.save(indra()).await.expect("save");
        let found = repo.find_by_name("  INDRA ").await.expect("find");

        assert_eq!(found.map(|user| user.id), Some(UserId("u-indra".to_string())));
    }
}
