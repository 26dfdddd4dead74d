//! JSON handlers for dmons.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use nodehook_domain::dmon::{Dmon, DmonStatus};
use nodehook_domain::id::{DmonId, ViewId};

use crate::actor::Actor;
use crate::api::EnabledRequest;
use crate::error::{ApiError, parse_id};
use crate::state::{AppState, Repositories};

/// Request body for creating a dmon.
#[derive(Deserialize)]
pub struct CreateDmonRequest {
    pub view: ViewId,
    pub name: String,
    pub query: String,
}

/// A dmon with its supervision status.
#[derive(Serialize)]
pub struct DmonResponse {
    #[serde(flatten)]
    pub dmon: Dmon,
    pub status: DmonStatus,
}

/// `GET /api/dmons` — list dmons with their status.
pub async fn list<R: Repositories>(
    State(state): State<AppState<R>>,
    _actor: Actor,
) -> Result<Json<Vec<DmonResponse>>, ApiError> {
    let dmons = state.dmons.list_dmons().await?;
    Ok(Json(
        dmons
            .into_iter()
            .map(|(dmon, status)| DmonResponse { dmon, status })
            .collect(),
    ))
}

/// `GET /api/dmons/{id}` — get a dmon.
pub async fn get<R: Repositories>(
    State(state): State<AppState<R>>,
    _actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<Dmon>, ApiError> {
    let id: DmonId = parse_id(&id)?;
    Ok(Json(state.dmons.get_dmon(id).await?))
}

/// `POST /api/dmons` — create and start a dmon.
pub async fn create<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Json(req): Json<CreateDmonRequest>,
) -> Result<(StatusCode, Json<Dmon>), ApiError> {
    let dmon = state
        .dmons
        .add_dmon(actor.id, req.view, &req.name, &req.query)
        .await?;
    Ok((StatusCode::CREATED, Json(dmon)))
}

/// `PUT /api/dmons/{id}/enabled` — start or stop a dmon.
pub async fn set_enabled<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    Json(req): Json<EnabledRequest>,
) -> Result<Json<Dmon>, ApiError> {
    let id: DmonId = parse_id(&id)?;
    Ok(Json(
        state.dmons.set_enabled(actor.id, id, req.enabled).await?,
    ))
}

/// `DELETE /api/dmons/{id}` — stop and delete a dmon.
pub async fn delete<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: DmonId = parse_id(&id)?;
    state.dmons.delete_dmon(actor.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
