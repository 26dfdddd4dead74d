//! `SQLite` implementation of [`UserRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use nodehook_app::ports::UserRepository;
use nodehook_domain::error::{NodehookError, NotFoundError};
use nodehook_domain::id::UserId;
use nodehook_domain::user::User;

use crate::column;
use crate::error::StorageError;

struct Wrapper(User);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self(User {
            id: UserId::from_uuid(column::uuid(row, "id")?),
            name: row.try_get("name")?,
            admin: row.try_get("admin")?,
            locked: row.try_get("locked")?,
            rules: column::json(row, "rules")?,
            created: column::timestamp(row, "created")?,
        }))
    }
}

/// `SQLite`-backed user repository.
#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: User) -> Result<User, NodehookError> {
        let rules = serde_json::to_string(&user.rules).map_err(StorageError::from)?;
        sqlx::query(
            "INSERT INTO users (id, name, admin, locked, rules, created) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(user.admin)
        .bind(user.locked)
        .bind(&rules)
        .bind(column::format_timestamp(user.created))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(user)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, NodehookError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }

    async fn get_all(&self) -> Result<Vec<User>, NodehookError> {
        let rows: Vec<Wrapper> = sqlx::query_as("SELECT * FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn update(&self, user: User) -> Result<User, NodehookError> {
        let rules = serde_json::to_string(&user.rules).map_err(StorageError::from)?;
        let result = sqlx::query(
            "UPDATE users SET name = ?, admin = ?, locked = ?, rules = ? WHERE id = ?",
        )
        .bind(&user.name)
        .bind(user.admin)
        .bind(user.locked)
        .bind(&rules)
        .bind(user.id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        if result.rows_affected() == 0 {
            return Err(NotFoundError {
                entity: "User",
                id: user.id.to_string(),
            }
            .into());
        }
        Ok(user)
    }
}
