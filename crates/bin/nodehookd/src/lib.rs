//! # nodehookd — nodehook daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file)
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct repository implementations (adapters) and the demo graph
//! - Construct the engine and application services, then restore stored
//!   users, views, triggers, macros, cron state and dmons
//! - Build the axum router, injecting application services
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

pub mod config;
mod daemon;

pub use daemon::{Daemon, SqliteRepositories};
