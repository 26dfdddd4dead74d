//! `SQLite` implementation of [`TriggerRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use nodehook_app::ports::TriggerRepository;
use nodehook_domain::error::{NodehookError, NotFoundError};
use nodehook_domain::id::{TriggerId, UserId, ViewId};
use nodehook_domain::trigger::TriggerDef;

use crate::column;
use crate::error::StorageError;

struct Wrapper(TriggerDef);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self(TriggerDef {
            id: TriggerId::from_uuid(column::uuid(row, "id")?),
            view: ViewId::from_uuid(column::uuid(row, "view_id")?),
            creator: UserId::from_uuid(column::uuid(row, "creator_id")?),
            enabled: row.try_get("enabled")?,
            condition: column::json(row, "condition")?,
            query: row.try_get("query")?,
            name: row.try_get("name")?,
            doc: row.try_get("doc")?,
            created: column::timestamp(row, "created")?,
        }))
    }
}

/// `SQLite`-backed trigger repository.
#[derive(Clone)]
pub struct SqliteTriggerRepository {
    pool: SqlitePool,
}

impl SqliteTriggerRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl TriggerRepository for SqliteTriggerRepository {
    async fn create(&self, trigger: TriggerDef) -> Result<TriggerDef, NodehookError> {
        let condition = serde_json::to_string(&trigger.condition).map_err(StorageError::from)?;
        sqlx::query(
            "INSERT INTO triggers (view_id, id, creator_id, enabled, condition, query, name, doc, created) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(trigger.view.as_uuid())
        .bind(trigger.id.as_uuid())
        .bind(trigger.creator.as_uuid())
        .bind(trigger.enabled)
        .bind(&condition)
        .bind(&trigger.query)
        .bind(&trigger.name)
        .bind(&trigger.doc)
        .bind(column::format_timestamp(trigger.created))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(trigger)
    }

    async fn get(
        &self,
        view: ViewId,
        id: TriggerId,
    ) -> Result<Option<TriggerDef>, NodehookError> {
        let row: Option<Wrapper> =
            sqlx::query_as("SELECT * FROM triggers WHERE view_id = ? AND id = ?")
                .bind(view.as_uuid())
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }

    async fn list_by_view(&self, view: ViewId) -> Result<Vec<TriggerDef>, NodehookError> {
        let rows: Vec<Wrapper> =
            sqlx::query_as("SELECT * FROM triggers WHERE view_id = ? ORDER BY rowid")
                .bind(view.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn get_all(&self) -> Result<Vec<TriggerDef>, NodehookError> {
        let rows: Vec<Wrapper> = sqlx::query_as("SELECT * FROM triggers ORDER BY rowid")
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn update(&self, trigger: TriggerDef) -> Result<TriggerDef, NodehookError> {
        let result = sqlx::query(
            "UPDATE triggers SET enabled = ?, query = ?, name = ?, doc = ? WHERE view_id = ? AND id = ?",
        )
        .bind(trigger.enabled)
        .bind(&trigger.query)
        .bind(&trigger.name)
        .bind(&trigger.doc)
        .bind(trigger.view.as_uuid())
        .bind(trigger.id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        if result.rows_affected() == 0 {
            return Err(NotFoundError {
                entity: "Trigger",
                id: trigger.id.to_string(),
            }
            .into());
        }
        Ok(trigger)
    }

    async fn delete(&self, view: ViewId, id: TriggerId) -> Result<(), NodehookError> {
        sqlx::query("DELETE FROM triggers WHERE view_id = ? AND id = ?")
            .bind(view.as_uuid())
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}
