//! JSON handlers for the triggers of a view.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use nodehook_app::services::{NewTrigger, TriggerInfo};
use nodehook_domain::id::{TriggerId, ViewId};
use nodehook_domain::trigger::{TriggerCondition, TriggerDef};

use crate::actor::Actor;
use crate::api::{EnabledRequest, QueryRequest};
use crate::error::{ApiError, parse_id};
use crate::state::{AppState, Repositories};

/// Request body for creating a trigger.
#[derive(Deserialize)]
pub struct CreateTriggerRequest {
    pub condition: TriggerCondition,
    pub query: String,
    pub name: Option<String>,
    pub doc: Option<String>,
}

/// A trigger with its run counters.
#[derive(Serialize)]
pub struct TriggerResponse {
    #[serde(flatten)]
    pub trigger: TriggerDef,
    pub stats: serde_json::Value,
}

impl From<TriggerInfo> for TriggerResponse {
    fn from(info: TriggerInfo) -> Self {
        Self {
            stats: info.stats.to_json(),
            trigger: info.trigger,
        }
    }
}

fn ids(view: &str, id: &str) -> Result<(ViewId, TriggerId), ApiError> {
    Ok((parse_id(view)?, parse_id(id)?))
}

/// `GET /api/views/{view}/triggers` — list the triggers visible in a view.
pub async fn list<R: Repositories>(
    State(state): State<AppState<R>>,
    _actor: Actor,
    Path(view): Path<String>,
) -> Result<Json<Vec<TriggerResponse>>, ApiError> {
    let view: ViewId = parse_id(&view)?;
    let triggers = state.triggers.list_triggers(view).await?;
    Ok(Json(triggers.into_iter().map(Into::into).collect()))
}

/// `GET /api/views/{view}/triggers/{id}` — get one trigger.
pub async fn get<R: Repositories>(
    State(state): State<AppState<R>>,
    _actor: Actor,
    Path((view, id)): Path<(String, String)>,
) -> Result<Json<TriggerDef>, ApiError> {
    let (view, id) = ids(&view, &id)?;
    Ok(Json(state.triggers.get_trigger(view, id)?))
}

/// `POST /api/views/{view}/triggers` — add a trigger.
pub async fn create<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path(view): Path<String>,
    Json(req): Json<CreateTriggerRequest>,
) -> Result<(StatusCode, Json<TriggerDef>), ApiError> {
    let view: ViewId = parse_id(&view)?;
    let trigger = state
        .triggers
        .add_trigger(
            actor.id,
            view,
            NewTrigger {
                condition: req.condition,
                query: req.query,
                name: req.name,
                doc: req.doc,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(trigger)))
}

/// `PUT /api/views/{view}/triggers/{id}/query` — replace the query body.
pub async fn set_query<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path((view, id)): Path<(String, String)>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<TriggerDef>, ApiError> {
    let (view, id) = ids(&view, &id)?;
    let trigger = state
        .triggers
        .set_query(actor.id, view, id, &req.query)
        .await?;
    Ok(Json(trigger))
}

/// `PUT /api/views/{view}/triggers/{id}/enabled` — enable or disable.
pub async fn set_enabled<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path((view, id)): Path<(String, String)>,
    Json(req): Json<EnabledRequest>,
) -> Result<Json<TriggerDef>, ApiError> {
    let (view, id) = ids(&view, &id)?;
    let trigger = state
        .triggers
        .set_enabled(actor.id, view, id, req.enabled)
        .await?;
    Ok(Json(trigger))
}

/// `DELETE /api/views/{view}/triggers/{id}` — delete a trigger.
pub async fn delete<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path((view, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let (view, id) = ids(&view, &id)?;
    state.triggers.delete_trigger(actor.id, view, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
