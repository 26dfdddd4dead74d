//! JSON handlers for the cron jobs of a view.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use nodehook_app::services::NewCronJob;
use nodehook_domain::cron::{CronJob, Recurrence, Schedule};
use nodehook_domain::error::{NodehookError, ValidationError};
use nodehook_domain::id::{CronId, ViewId};
use nodehook_domain::time::Timestamp;

use crate::actor::Actor;
use crate::api::{EnabledRequest, QueryRequest};
use crate::error::{ApiError, parse_id};
use crate::state::{AppState, Repositories};

/// Request body for creating a cron job.
///
/// Exactly one of `crontab` (five-field expression) and `at` (one-shot
/// instant) must be given.
#[derive(Deserialize)]
pub struct CreateCronRequest {
    pub crontab: Option<String>,
    pub at: Option<Timestamp>,
    pub query: String,
    pub name: Option<String>,
    pub doc: Option<String>,
}

impl CreateCronRequest {
    fn schedule(&self) -> Result<Schedule, NodehookError> {
        match (&self.crontab, self.at) {
            (Some(expr), None) => Ok(Schedule::Recurring {
                rule: Recurrence::parse_crontab(expr)?,
            }),
            (None, Some(at)) => Ok(Schedule::Once { at }),
            (Some(_), Some(_)) => Err(ValidationError::InvalidSchedule(
                "give either crontab or at, not both".to_string(),
            )
            .into()),
            (None, None) => Err(ValidationError::MissingField("schedule").into()),
        }
    }
}

fn ids(view: &str, id: &str) -> Result<(ViewId, CronId), ApiError> {
    Ok((parse_id(view)?, parse_id(id)?))
}

/// `GET /api/views/{view}/cron` — list the jobs visible in a view.
pub async fn list<R: Repositories>(
    State(state): State<AppState<R>>,
    _actor: Actor,
    Path(view): Path<String>,
) -> Result<Json<Vec<CronJob>>, ApiError> {
    let view: ViewId = parse_id(&view)?;
    Ok(Json(state.crons.list_jobs(view).await?))
}

/// `GET /api/views/{view}/cron/{id}` — get one job with its run-state.
pub async fn get<R: Repositories>(
    State(state): State<AppState<R>>,
    _actor: Actor,
    Path((view, id)): Path<(String, String)>,
) -> Result<Json<CronJob>, ApiError> {
    let (view, id) = ids(&view, &id)?;
    Ok(Json(state.crons.get_job(view, id).await?))
}

/// `POST /api/views/{view}/cron` — add a job.
pub async fn create<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path(view): Path<String>,
    Json(req): Json<CreateCronRequest>,
) -> Result<(StatusCode, Json<CronJob>), ApiError> {
    let view: ViewId = parse_id(&view)?;
    let schedule = req.schedule()?;
    let job = state
        .crons
        .add_job(
            actor.id,
            view,
            NewCronJob {
                schedule,
                query: req.query,
                name: req.name,
                doc: req.doc,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// `PUT /api/views/{view}/cron/{id}/query` — replace the query body.
pub async fn set_query<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path((view, id)): Path<(String, String)>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<CronJob>, ApiError> {
    let (view, id) = ids(&view, &id)?;
    Ok(Json(
        state.crons.set_query(actor.id, view, id, &req.query).await?,
    ))
}

/// `PUT /api/views/{view}/cron/{id}/enabled` — enable or disable.
pub async fn set_enabled<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path((view, id)): Path<(String, String)>,
    Json(req): Json<EnabledRequest>,
) -> Result<Json<CronJob>, ApiError> {
    let (view, id) = ids(&view, &id)?;
    Ok(Json(
        state
            .crons
            .set_enabled(actor.id, view, id, req.enabled)
            .await?,
    ))
}

/// `DELETE /api/views/{view}/cron/{id}` — delete a job.
pub async fn delete<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path((view, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let (view, id) = ids(&view, &id)?;
    state.crons.delete_job(actor.id, view, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(crontab: Option<&str>, at: Option<Timestamp>) -> CreateCronRequest {
        CreateCronRequest {
            crontab: crontab.map(str::to_string),
            at,
            query: "[ +#tick ]".to_string(),
            name: None,
            doc: None,
        }
    }

    #[test]
    fn should_build_recurring_schedule_from_crontab() {
        let schedule = request(Some("0 * * * *"), None).schedule().unwrap();
        assert!(!schedule.is_once());
    }

    #[test]
    fn should_require_exactly_one_schedule_kind() {
        let at = nodehook_domain::time::utc(2024, 6, 1, 10, 0).unwrap();
        assert!(request(None, Some(at)).schedule().unwrap().is_once());
        assert!(matches!(
            request(None, None).schedule(),
            Err(NodehookError::Validation(ValidationError::MissingField(
                "schedule"
            )))
        ));
        assert!(matches!(
            request(Some("0 * * * *"), Some(at)).schedule(),
            Err(NodehookError::Validation(
                ValidationError::InvalidSchedule(_)
            ))
        ));
    }
}
