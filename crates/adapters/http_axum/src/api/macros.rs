//! JSON handlers for macros.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use nodehook_domain::id::ViewId;
use nodehook_domain::macros::Macro;
use nodehook_domain::node::NodeRef;

use crate::actor::Actor;
use crate::api::views::{RunResponse, run_blocking};
use crate::error::ApiError;
use crate::state::{AppState, Repositories};

/// Request body for creating or replacing a macro.
#[derive(Deserialize)]
pub struct SetMacroRequest {
    pub query: String,
    pub doc: Option<String>,
}

/// Request body for invoking a macro directly.
#[derive(Deserialize)]
pub struct ExecMacroRequest {
    pub view: ViewId,
    #[serde(default)]
    pub nodes: Vec<NodeRef>,
}

/// `GET /api/macros` — list macros by name.
pub async fn list<R: Repositories>(
    State(state): State<AppState<R>>,
    _actor: Actor,
) -> Json<Vec<Macro>> {
    Json(state.macros.list_macros())
}

/// `GET /api/macros/{name}` — get a macro.
pub async fn get<R: Repositories>(
    State(state): State<AppState<R>>,
    _actor: Actor,
    Path(name): Path<String>,
) -> Result<Json<Macro>, ApiError> {
    Ok(Json(state.macros.get_macro(&name)?))
}

/// `PUT /api/macros/{name}` — create or replace a macro.
pub async fn set<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path(name): Path<String>,
    Json(req): Json<SetMacroRequest>,
) -> Result<Json<Macro>, ApiError> {
    let mac = state
        .macros
        .set_macro(actor.id, &name, &req.query, req.doc)
        .await?;
    Ok(Json(mac))
}

/// `DELETE /api/macros/{name}` — delete a macro.
pub async fn delete<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.macros.delete_macro(actor.id, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/macros/{name}/exec` — run a macro as the acting user.
pub async fn exec<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path(name): Path<String>,
    Json(req): Json<ExecMacroRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    state.views.get_view(req.view).await?;
    let nodes = run_blocking(Arc::clone(&state.manager), move |manager| {
        manager.exec_macro(&name, actor.id, req.view, req.nodes)
    })
    .await?;
    Ok(Json(RunResponse { nodes }))
}
