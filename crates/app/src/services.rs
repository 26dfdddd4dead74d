//! Use-case services: permission-checked management of every definition
//! kind, writing through to storage before updating the engine's in-memory
//! state.

pub mod cron_service;
pub mod dmon_service;
pub mod macro_service;
pub mod trigger_service;
pub mod user_service;
pub mod view_service;

pub use cron_service::{CronService, NewCronJob};
pub use dmon_service::DmonService;
pub use macro_service::MacroService;
pub use trigger_service::{NewTrigger, TriggerInfo, TriggerService};
pub use user_service::UserService;
pub use view_service::ViewService;
