//! JSON handlers for users. Every change requires an admin.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use nodehook_domain::id::UserId;
use nodehook_domain::user::{Rule, User};

use crate::actor::Actor;
use crate::error::{ApiError, parse_id};
use crate::state::{AppState, Repositories};

/// Request body for creating a user.
#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Deserialize)]
pub struct RulesRequest {
    pub rules: Vec<Rule>,
}

#[derive(Deserialize)]
pub struct AdminRequest {
    pub admin: bool,
}

#[derive(Deserialize)]
pub struct LockedRequest {
    pub locked: bool,
}

/// `GET /api/users` — list all users.
pub async fn list<R: Repositories>(
    State(state): State<AppState<R>>,
    _actor: Actor,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.users.list_users().await?))
}

/// `GET /api/users/{id}` — get a user by id.
pub async fn get<R: Repositories>(
    State(state): State<AppState<R>>,
    _actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let id: UserId = parse_id(&id)?;
    Ok(Json(state.users.get_user(id)?))
}

/// `POST /api/users` — create a user.
pub async fn create<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state
        .users
        .add_user(actor.id, &req.name, req.admin, req.rules)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `PUT /api/users/{id}/rules` — replace a user's rules.
pub async fn set_rules<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    Json(req): Json<RulesRequest>,
) -> Result<Json<User>, ApiError> {
    let id: UserId = parse_id(&id)?;
    Ok(Json(state.users.set_rules(actor.id, id, req.rules).await?))
}

/// `PUT /api/users/{id}/admin` — grant or revoke admin status.
pub async fn set_admin<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    Json(req): Json<AdminRequest>,
) -> Result<Json<User>, ApiError> {
    let id: UserId = parse_id(&id)?;
    Ok(Json(state.users.set_admin(actor.id, id, req.admin).await?))
}

/// `PUT /api/users/{id}/locked` — lock or unlock a user.
pub async fn set_locked<R: Repositories>(
    State(state): State<AppState<R>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    Json(req): Json<LockedRequest>,
) -> Result<Json<User>, ApiError> {
    let id: UserId = parse_id(&id)?;
    Ok(Json(state.users.set_locked(actor.id, id, req.locked).await?))
}
