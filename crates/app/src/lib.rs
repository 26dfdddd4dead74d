//! # nodehook-app
//!
//! Application layer: the automation engine and its **port definitions**.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `TriggerRepository`, `CronRepository`, `MacroRepository`,
//!     `DmonRepository`, `ViewRepository`, `UserRepository`: persistence
//!   - `QueryRuntime`: the graph store's query language and transactions
//!   - `EventPublisher`: fan-out of automation activity
//! - Run the engine components:
//!   - `TriggerRegistry`: per-view trigger sets and event matching
//!   - `ExecutionManager`: identity, transaction and nesting for every run
//!   - `CronScheduler`: wall-clock driven runs with persisted run-state
//!   - `MacroStore`: named stored queries run as the caller
//!   - `DmonSupervisor`: restart loop for long-lived queries
//! - Expose use-case **services** that check permissions before touching
//!   definitions
//!
//! ## Dependency rule
//! Depends on `nodehook-domain` only (plus `tokio` for tasks and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod clock;
pub mod cron_scheduler;
pub mod dmon_supervisor;
pub mod event_bus;
pub mod execution;
pub mod identity;
pub mod macro_store;
pub mod ports;
pub mod services;
pub mod trigger_registry;
pub mod view_sets;

#[cfg(test)]
pub(crate) mod testing;
