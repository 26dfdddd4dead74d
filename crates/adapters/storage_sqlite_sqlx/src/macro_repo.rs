//! `SQLite` implementation of [`MacroRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use nodehook_app::ports::MacroRepository;
use nodehook_domain::error::NodehookError;
use nodehook_domain::id::UserId;
use nodehook_domain::macros::Macro;

use crate::column;
use crate::error::StorageError;

struct Wrapper(Macro);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self(Macro {
            name: row.try_get("name")?,
            creator: UserId::from_uuid(column::uuid(row, "creator_id")?),
            query: row.try_get("query")?,
            doc: row.try_get("doc")?,
            created: column::timestamp(row, "created")?,
            updated: column::timestamp(row, "updated")?,
        }))
    }
}

/// `SQLite`-backed macro repository.
#[derive(Clone)]
pub struct SqliteMacroRepository {
    pool: SqlitePool,
}

impl SqliteMacroRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl MacroRepository for SqliteMacroRepository {
    async fn upsert(&self, mac: Macro) -> Result<Macro, NodehookError> {
        sqlx::query(
            "INSERT INTO macros (name, creator_id, query, doc, created, updated) VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (name) DO UPDATE SET query = excluded.query, doc = excluded.doc, updated = excluded.updated",
        )
        .bind(&mac.name)
        .bind(mac.creator.as_uuid())
        .bind(&mac.query)
        .bind(&mac.doc)
        .bind(column::format_timestamp(mac.created))
        .bind(column::format_timestamp(mac.updated))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(mac)
    }

    async fn get(&self, name: &str) -> Result<Option<Macro>, NodehookError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM macros WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }

    async fn get_all(&self) -> Result<Vec<Macro>, NodehookError> {
        let rows: Vec<Wrapper> = sqlx::query_as("SELECT * FROM macros ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn delete(&self, name: &str) -> Result<(), NodehookError> {
        sqlx::query("DELETE FROM macros WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}
