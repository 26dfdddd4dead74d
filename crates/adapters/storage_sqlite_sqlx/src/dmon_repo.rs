//! `SQLite` implementation of [`DmonRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use nodehook_app::ports::DmonRepository;
use nodehook_domain::dmon::Dmon;
use nodehook_domain::error::{NodehookError, NotFoundError};
use nodehook_domain::id::{DmonId, UserId, ViewId};

use crate::column;
use crate::error::StorageError;

struct Wrapper(Dmon);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self(Dmon {
            id: DmonId::from_uuid(column::uuid(row, "id")?),
            view: ViewId::from_uuid(column::uuid(row, "view_id")?),
            creator: UserId::from_uuid(column::uuid(row, "creator_id")?),
            name: row.try_get("name")?,
            query: row.try_get("query")?,
            enabled: row.try_get("enabled")?,
            created: column::timestamp(row, "created")?,
        }))
    }
}

/// `SQLite`-backed dmon repository.
#[derive(Clone)]
pub struct SqliteDmonRepository {
    pool: SqlitePool,
}

impl SqliteDmonRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl DmonRepository for SqliteDmonRepository {
    async fn create(&self, dmon: Dmon) -> Result<Dmon, NodehookError> {
        sqlx::query(
            "INSERT INTO dmons (id, view_id, creator_id, name, query, enabled, created) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(dmon.id.as_uuid())
        .bind(dmon.view.as_uuid())
        .bind(dmon.creator.as_uuid())
        .bind(&dmon.name)
        .bind(&dmon.query)
        .bind(dmon.enabled)
        .bind(column::format_timestamp(dmon.created))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(dmon)
    }

    async fn get_by_id(&self, id: DmonId) -> Result<Option<Dmon>, NodehookError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM dmons WHERE id = ?")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }

    async fn get_all(&self) -> Result<Vec<Dmon>, NodehookError> {
        let rows: Vec<Wrapper> = sqlx::query_as("SELECT * FROM dmons ORDER BY rowid")
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn update(&self, dmon: Dmon) -> Result<Dmon, NodehookError> {
        let result = sqlx::query("UPDATE dmons SET name = ?, query = ?, enabled = ? WHERE id = ?")
            .bind(&dmon.name)
            .bind(&dmon.query)
            .bind(dmon.enabled)
            .bind(dmon.id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        if result.rows_affected() == 0 {
            return Err(NotFoundError {
                entity: "Dmon",
                id: dmon.id.to_string(),
            }
            .into());
        }
        Ok(dmon)
    }

    async fn delete(&self, id: DmonId) -> Result<(), NodehookError> {
        sqlx::query("DELETE FROM dmons WHERE id = ?")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;
    use crate::view_repo::SqliteViewRepository;
    use nodehook_app::ports::ViewRepository;
    use nodehook_domain::view::View;

    async fn setup() -> (SqliteDmonRepository, View) {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        let view = SqliteViewRepository::new(db.pool().clone())
            .create(View::root("default").unwrap())
            .await
            .unwrap();
        (SqliteDmonRepository::new(db.pool().clone()), view)
    }

    #[tokio::test]
    async fn should_create_and_retrieve_dmon() {
        let (repo, view) = setup().await;
        let dmon = Dmon::new(view.id, UserId::new(), "feed", "[ +#polled ]").unwrap();
        repo.create(dmon.clone()).await.unwrap();

        assert_eq!(repo.get_by_id(dmon.id).await.unwrap(), Some(dmon));
    }

    #[tokio::test]
    async fn should_persist_enabled_flag() {
        let (repo, view) = setup().await;
        let mut dmon = repo
            .create(Dmon::new(view.id, UserId::new(), "feed", "[ +#polled ]").unwrap())
            .await
            .unwrap();
        dmon.enabled = false;
        repo.update(dmon.clone()).await.unwrap();

        assert!(!repo.get_all().await.unwrap()[0].enabled);
    }

    #[tokio::test]
    async fn should_delete_dmon() {
        let (repo, view) = setup().await;
        let dmon = repo
            .create(Dmon::new(view.id, UserId::new(), "feed", "[ +#polled ]").unwrap())
            .await
            .unwrap();
        repo.delete(dmon.id).await.unwrap();
        assert!(repo.get_by_id(dmon.id).await.unwrap().is_none());
    }
}
