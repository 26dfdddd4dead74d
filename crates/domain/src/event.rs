//! Event — an immutable record of something the automation engine did.
//!
//! Events are produced when triggers fire or fail, when cron jobs start and
//! finish, and when dmon runs end. They are informational; the durable
//! outcome of cron runs lives on the job's run-state.

use serde::{Deserialize, Serialize};

use crate::id::{EventId, ViewId};
use crate::time::Timestamp;

/// What kind of automation activity an [`Event`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TriggerFired,
    TriggerFailed,
    CronStarted,
    CronFinished,
    DmonExited,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::TriggerFired => "trigger_fired",
            Self::TriggerFailed => "trigger_failed",
            Self::CronStarted => "cron_started",
            Self::CronFinished => "cron_finished",
            Self::DmonExited => "dmon_exited",
        })
    }
}

/// An automation activity record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    pub view: Option<ViewId>,
    pub timestamp: Timestamp,
    pub data: serde_json::Value,
}

impl Event {
    /// Create a new event stamped with the current time.
    #[must_use]
    pub fn new(event_type: EventType, view: Option<ViewId>, data: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            view,
            timestamp: crate::time::now(),
            data,
        }
    }
}
