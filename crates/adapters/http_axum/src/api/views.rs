//! JSON handlers for views and ad-hoc query runs.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use nodehook_app::execution::ExecutionManager;
use nodehook_domain::error::NodehookError;
use nodehook_domain::id::ViewId;
use nodehook_domain::node::NodeRef;
use nodehook_domain::view::View;

use crate::actor::Actor;
use crate::error::{ApiError, parse_id};
use crate::state::{AppState, Repositories};

#[derive(Deserialize)]
pub struct ForkRequest {
    pub name: String,
}

/// Request body for running a query.
#[derive(Deserialize)]
pub struct RunRequest {
    pub query: String,
    /// Starting node set; empty when omitted.
    #[serde(default)]
    pub nodes: Vec<NodeRef>,
}

/// The node set a query produced.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub nodes: Vec<NodeRef>,
}

/// `GET /api/views` — list all views, parents before forks.
pub async fn list<R: Repositories>(
    State(state): State<AppState<R>>,
    _actor: Actor,
) -> Result<Json<Vec<View>>, ApiError> {
    Ok(Json(state.views.list_views().await?))
}

/// `GET /api/views/{view}` — get a view by id.
pub async fn get<R: Repositories>(
    State(state): State<AppState<R>>,
    _actor: Actor,
    Path(view): Path<String>,
) -> Result<Json<View>, ApiError> {
    let view: ViewId = parse_id(&view)?;
    Ok(Json(state.views.get_view(view).await?))
}

/// `POST /api/views/{view}/fork` — fork a view.
pub async fn fork<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path(view): Path<String>,
    Json(req): Json<ForkRequest>,
) -> Result<(StatusCode, Json<View>), ApiError> {
    let view: ViewId = parse_id(&view)?;
    let fork = state.views.fork(actor.id, view, &req.name).await?;
    Ok((StatusCode::CREATED, Json(fork)))
}

/// `POST /api/views/{view}/run` — run a query as the acting user.
pub async fn run<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path(view): Path<String>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let view: ViewId = parse_id(&view)?;
    state.views.get_view(view).await?;
    let nodes = run_blocking(Arc::clone(&state.manager), move |manager| {
        manager.run(&req.query, actor.id, view, req.nodes)
    })
    .await?;
    Ok(Json(RunResponse { nodes }))
}

/// Run a synchronous engine call off the async executor.
///
/// Trigger queries run inline inside the store's write, so a single call
/// may take a while.
pub(crate) async fn run_blocking<F>(
    manager: Arc<ExecutionManager>,
    call: F,
) -> Result<Vec<NodeRef>, ApiError>
where
    F: FnOnce(&ExecutionManager) -> Result<Vec<NodeRef>, NodehookError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || call(&manager))
        .await
        .map_err(|err| ApiError::Aborted(err.to_string()))?
        .map_err(ApiError::from)
}
