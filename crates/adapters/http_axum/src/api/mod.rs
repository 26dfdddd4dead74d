//! JSON API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod crons;
#[allow(clippy::missing_errors_doc)]
pub mod dmons;
#[allow(clippy::missing_errors_doc)]
pub mod macros;
pub mod sse;
#[allow(clippy::missing_errors_doc)]
pub mod triggers;
#[allow(clippy::missing_errors_doc)]
pub mod users;
#[allow(clippy::missing_errors_doc)]
pub mod views;

use axum::Router;
use axum::routing::{get, post, put};
use serde::Deserialize;

use crate::state::{AppState, Repositories};

/// Body of every `.../query` endpoint.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

/// Body of every `.../enabled` endpoint.
#[derive(Debug, Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}

/// Build the `/api` sub-router.
pub fn routes<R: Repositories>() -> Router<AppState<R>> {
    Router::new()
        // Users
        .route("/users", get(users::list::<R>).post(users::create::<R>))
        .route("/users/{id}", get(users::get::<R>))
        .route("/users/{id}/rules", put(users::set_rules::<R>))
        .route("/users/{id}/admin", put(users::set_admin::<R>))
        .route("/users/{id}/locked", put(users::set_locked::<R>))
        // Views
        .route("/views", get(views::list::<R>))
        .route("/views/{view}", get(views::get::<R>))
        .route("/views/{view}/fork", post(views::fork::<R>))
        .route("/views/{view}/run", post(views::run::<R>))
        // Triggers
        .route(
            "/views/{view}/triggers",
            get(triggers::list::<R>).post(triggers::create::<R>),
        )
        .route(
            "/views/{view}/triggers/{id}",
            get(triggers::get::<R>).delete(triggers::delete::<R>),
        )
        .route(
            "/views/{view}/triggers/{id}/query",
            put(triggers::set_query::<R>),
        )
        .route(
            "/views/{view}/triggers/{id}/enabled",
            put(triggers::set_enabled::<R>),
        )
        // Cron
        .route(
            "/views/{view}/cron",
            get(crons::list::<R>).post(crons::create::<R>),
        )
        .route(
            "/views/{view}/cron/{id}",
            get(crons::get::<R>).delete(crons::delete::<R>),
        )
        .route("/views/{view}/cron/{id}/query", put(crons::set_query::<R>))
        .route(
            "/views/{view}/cron/{id}/enabled",
            put(crons::set_enabled::<R>),
        )
        // Macros
        .route("/macros", get(macros::list::<R>))
        .route(
            "/macros/{name}",
            get(macros::get::<R>)
                .put(macros::set::<R>)
                .delete(macros::delete::<R>),
        )
        .route("/macros/{name}/exec", post(macros::exec::<R>))
        // Dmons
        .route("/dmons", get(dmons::list::<R>).post(dmons::create::<R>))
        .route(
            "/dmons/{id}",
            get(dmons::get::<R>).delete(dmons::delete::<R>),
        )
        .route("/dmons/{id}/enabled", put(dmons::set_enabled::<R>))
        // Events
        .route("/events/stream", get(sse::stream::<R>))
}
