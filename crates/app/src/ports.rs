//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the engine and the adapter
//! layer can depend on them without creating circular dependencies.

pub mod event_bus;
pub mod runtime;
pub mod storage;

pub use event_bus::EventPublisher;
pub use runtime::QueryRuntime;
pub use storage::{
    CronRepository, DmonRepository, MacroRepository, TriggerRepository, UserRepository,
    ViewRepository,
};
