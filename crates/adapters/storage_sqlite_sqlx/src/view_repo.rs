//! `SQLite` implementation of [`ViewRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use nodehook_app::ports::ViewRepository;
use nodehook_domain::error::{NodehookError, NotFoundError};
use nodehook_domain::id::ViewId;
use nodehook_domain::view::View;

use crate::column;
use crate::error::StorageError;

struct Wrapper(View);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let parent: Option<uuid::Uuid> = row.try_get("parent_id")?;
        Ok(Self(View {
            id: ViewId::from_uuid(column::uuid(row, "id")?),
            name: row.try_get("name")?,
            parent: parent.map(ViewId::from_uuid),
            triggers_local: row.try_get("triggers_local")?,
            crons_local: row.try_get("crons_local")?,
            created: column::timestamp(row, "created")?,
        }))
    }
}

/// `SQLite`-backed view repository.
#[derive(Clone)]
pub struct SqliteViewRepository {
    pool: SqlitePool,
}

impl SqliteViewRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn set_flag(&self, statement: &'static str, id: ViewId) -> Result<(), NodehookError> {
        let result = sqlx::query(statement)
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        if result.rows_affected() == 0 {
            return Err(NotFoundError {
                entity: "View",
                id: id.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl ViewRepository for SqliteViewRepository {
    async fn create(&self, view: View) -> Result<View, NodehookError> {
        sqlx::query(
            "INSERT INTO views (id, name, parent_id, triggers_local, crons_local, created) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(view.id.as_uuid())
        .bind(&view.name)
        .bind(view.parent.map(ViewId::as_uuid))
        .bind(view.triggers_local)
        .bind(view.crons_local)
        .bind(column::format_timestamp(view.created))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(view)
    }

    async fn get_by_id(&self, id: ViewId) -> Result<Option<View>, NodehookError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM views WHERE id = ?")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }

    async fn get_all(&self) -> Result<Vec<View>, NodehookError> {
        // A fork is always inserted after its parent.
        let rows: Vec<Wrapper> = sqlx::query_as("SELECT * FROM views ORDER BY rowid")
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn mark_triggers_local(&self, id: ViewId) -> Result<(), NodehookError> {
        self.set_flag("UPDATE views SET triggers_local = 1 WHERE id = ?", id)
            .await
    }

    async fn mark_crons_local(&self, id: ViewId) -> Result<(), NodehookError> {
        self.set_flag("UPDATE views SET crons_local = 1 WHERE id = ?", id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;

    async fn setup() -> SqliteViewRepository {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        SqliteViewRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn should_create_and_retrieve_view() {
        let repo = setup().await;
        let view = View::root("default").unwrap();
        repo.create(view.clone()).await.unwrap();

        let found = repo.get_by_id(view.id).await.unwrap();
        assert_eq!(found, Some(view));
    }

    #[tokio::test]
    async fn should_list_parents_before_forks() {
        let repo = setup().await;
        let root = repo.create(View::root("default").unwrap()).await.unwrap();
        let fork = repo.create(root.fork("scratch").unwrap()).await.unwrap();
        let nested = repo.create(fork.fork("deeper").unwrap()).await.unwrap();

        let ids: Vec<ViewId> = repo.get_all().await.unwrap().iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![root.id, fork.id, nested.id]);
    }

    #[tokio::test]
    async fn should_persist_triggers_local_flag() {
        let repo = setup().await;
        let root = repo.create(View::root("default").unwrap()).await.unwrap();
        let fork = repo.create(root.fork("scratch").unwrap()).await.unwrap();

        repo.mark_triggers_local(fork.id).await.unwrap();

        let stored = repo.get_by_id(fork.id).await.unwrap().unwrap();
        assert!(stored.triggers_local);
        assert!(!stored.crons_local);
        assert_eq!(stored.parent, Some(root.id));
    }

    #[tokio::test]
    async fn should_keep_other_flag_when_marking_from_stale_copy() {
        let repo = setup().await;
        let root = repo.create(View::root("default").unwrap()).await.unwrap();
        let fork = repo.create(root.fork("scratch").unwrap()).await.unwrap();
        let stale = repo.get_by_id(fork.id).await.unwrap().unwrap();

        repo.mark_crons_local(fork.id).await.unwrap();
        assert!(!stale.crons_local);
        repo.mark_triggers_local(stale.id).await.unwrap();

        let stored = repo.get_by_id(fork.id).await.unwrap().unwrap();
        assert!(stored.triggers_local);
        assert!(stored.crons_local);
    }

    #[tokio::test]
    async fn should_return_not_found_when_marking_missing_view() {
        let repo = setup().await;
        let ghost = View::root("ghost").unwrap();
        let result = repo.mark_crons_local(ghost.id).await;
        assert!(matches!(result, Err(NodehookError::NotFound(_))));
    }
}
