//! `SQLite` implementation of [`CronRepository`].
//!
//! Definition columns and run-state columns are written by separate
//! statements, so a user editing a job never clobbers state the scheduler
//! wrote in between.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use nodehook_app::ports::CronRepository;
use nodehook_domain::cron::{CronJob, RunState};
use nodehook_domain::error::{NodehookError, NotFoundError};
use nodehook_domain::id::{CronId, UserId, ViewId};

use crate::column;
use crate::error::StorageError;

struct Wrapper(CronJob);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let start_count: i64 = row.try_get("start_count")?;
        let state = RunState {
            running: row.try_get("running")?,
            last_error: row.try_get("last_error")?,
            start_count: u64::try_from(start_count)
                .map_err(|err| sqlx::Error::Decode(Box::new(err)))?,
            last_start: column::maybe_timestamp(row, "last_start")?,
            last_end: column::maybe_timestamp(row, "last_end")?,
            next_fire: column::maybe_timestamp(row, "next_fire")?,
            consumed: row.try_get("consumed")?,
        };
        Ok(Self(CronJob {
            id: CronId::from_uuid(column::uuid(row, "id")?),
            view: ViewId::from_uuid(column::uuid(row, "view_id")?),
            creator: UserId::from_uuid(column::uuid(row, "creator_id")?),
            enabled: row.try_get("enabled")?,
            schedule: column::json(row, "schedule")?,
            query: row.try_get("query")?,
            name: row.try_get("name")?,
            doc: row.try_get("doc")?,
            created: column::timestamp(row, "created")?,
            state,
        }))
    }
}

fn start_count(state: &RunState) -> i64 {
    i64::try_from(state.start_count).unwrap_or(i64::MAX)
}

/// `SQLite`-backed cron job repository.
#[derive(Clone)]
pub struct SqliteCronRepository {
    pool: SqlitePool,
}

impl SqliteCronRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl CronRepository for SqliteCronRepository {
    async fn create(&self, job: CronJob) -> Result<CronJob, NodehookError> {
        let schedule = serde_json::to_string(&job.schedule).map_err(StorageError::from)?;
        sqlx::query(
            "INSERT INTO cron_jobs (view_id, id, creator_id, enabled, schedule, query, name, doc, created, \
             running, last_error, start_count, last_start, last_end, next_fire, consumed) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.view.as_uuid())
        .bind(job.id.as_uuid())
        .bind(job.creator.as_uuid())
        .bind(job.enabled)
        .bind(&schedule)
        .bind(&job.query)
        .bind(&job.name)
        .bind(&job.doc)
        .bind(column::format_timestamp(job.created))
        .bind(job.state.running)
        .bind(&job.state.last_error)
        .bind(start_count(&job.state))
        .bind(job.state.last_start.map(column::format_timestamp))
        .bind(job.state.last_end.map(column::format_timestamp))
        .bind(job.state.next_fire.map(column::format_timestamp))
        .bind(job.state.consumed)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(job)
    }

    async fn get(&self, view: ViewId, id: CronId) -> Result<Option<CronJob>, NodehookError> {
        let row: Option<Wrapper> =
            sqlx::query_as("SELECT * FROM cron_jobs WHERE view_id = ? AND id = ?")
                .bind(view.as_uuid())
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }

    async fn list_by_view(&self, view: ViewId) -> Result<Vec<CronJob>, NodehookError> {
        let rows: Vec<Wrapper> =
            sqlx::query_as("SELECT * FROM cron_jobs WHERE view_id = ? ORDER BY rowid")
                .bind(view.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn get_enabled(&self) -> Result<Vec<CronJob>, NodehookError> {
        let rows: Vec<Wrapper> =
            sqlx::query_as("SELECT * FROM cron_jobs WHERE enabled = 1 ORDER BY rowid")
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn update_definition(&self, job: CronJob) -> Result<CronJob, NodehookError> {
        let result = sqlx::query(
            "UPDATE cron_jobs SET enabled = ?, query = ?, name = ?, doc = ? WHERE view_id = ? AND id = ?",
        )
        .bind(job.enabled)
        .bind(&job.query)
        .bind(&job.name)
        .bind(&job.doc)
        .bind(job.view.as_uuid())
        .bind(job.id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        let not_found = || NotFoundError {
            entity: "CronJob",
            id: job.id.to_string(),
        };
        if result.rows_affected() == 0 {
            return Err(not_found().into());
        }
        self.get(job.view, job.id)
            .await?
            .ok_or_else(|| not_found().into())
    }

    async fn update_state(
        &self,
        view: ViewId,
        id: CronId,
        state: RunState,
    ) -> Result<(), NodehookError> {
        sqlx::query(
            "UPDATE cron_jobs SET running = ?, last_error = ?, start_count = ?, last_start = ?, \
             last_end = ?, next_fire = ?, consumed = ? WHERE view_id = ? AND id = ?",
        )
        .bind(state.running)
        .bind(&state.last_error)
        .bind(start_count(&state))
        .bind(state.last_start.map(column::format_timestamp))
        .bind(state.last_end.map(column::format_timestamp))
        .bind(state.next_fire.map(column::format_timestamp))
        .bind(state.consumed)
        .bind(view.as_uuid())
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }

    async fn clear_running(&self) -> Result<u64, NodehookError> {
        let result = sqlx::query("UPDATE cron_jobs SET running = 0 WHERE running = 1")
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, view: ViewId, id: CronId) -> Result<(), NodehookError> {
        sqlx::query("DELETE FROM cron_jobs WHERE view_id = ? AND id = ?")
            .bind(view.as_uuid())
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}
