//! # nodehook-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the repository port traits defined in `nodehook-app::ports::storage`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Storage conventions
//! Identifiers are stored as UUID blobs, timestamps as RFC 3339 text and
//! structured fields (conditions, schedules, rules) as JSON text. Listings
//! in creation order sort on `rowid`.
//!
//! ## Dependency rule
//! Depends on `nodehook-app` (for port traits) and `nodehook-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod cron_repo;
pub mod dmon_repo;
pub mod error;
pub mod macro_repo;
pub mod pool;
pub mod trigger_repo;
pub mod user_repo;
pub mod view_repo;

mod column;

pub use cron_repo::SqliteCronRepository;
pub use dmon_repo::SqliteDmonRepository;
pub use error::StorageError;
pub use macro_repo::SqliteMacroRepository;
pub use pool::{Config, Database};
pub use trigger_repo::SqliteTriggerRepository;
pub use user_repo::SqliteUserRepository;
pub use view_repo::SqliteViewRepository;
