//! Trigger registry — per-view trigger sets and event matching.
//!
//! The registry is the in-memory source of truth the inline path reads.
//! Persistence is handled by the trigger service, which writes through to
//! storage before updating the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::json;

use nodehook_domain::id::{TriggerId, ViewId};
use nodehook_domain::mutation::MutationEvent;
use nodehook_domain::trigger::TriggerDef;
use nodehook_domain::view::View;

use crate::view_sets::{Scoped, ViewSets};

impl Scoped for TriggerDef {
    type Key = TriggerId;

    fn key(&self) -> TriggerId {
        self.id
    }

    fn copy_to(&self, view: ViewId) -> Self {
        TriggerDef::copy_to(self, view)
    }
}

/// Counters kept per physical trigger record. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerStats {
    pub fired: u64,
    pub failed: u64,
    pub last_error: Option<String>,
}

impl TriggerStats {
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "fired": self.fired,
            "failed": self.failed,
            "last_error": self.last_error,
        })
    }
}

/// Registry of every view's trigger set.
#[derive(Debug, Default)]
pub struct TriggerRegistry {
    sets: RwLock<ViewSets<TriggerDef>>,
    stats: Mutex<HashMap<(ViewId, TriggerId), TriggerStats>>,
}

impl TriggerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view and, for views that own their set, its stored triggers.
    pub fn load_view(&self, view: &View, triggers: Vec<TriggerDef>) {
        let mut sets = self.sets.write().unwrap_or_else(PoisonError::into_inner);
        sets.add_view(view.id, view.parent, view.triggers_local);
        for trigger in triggers {
            sets.insert(view.id, trigger);
        }
    }

    /// Drop a view's set.
    pub fn remove_view(&self, view: ViewId) {
        self.sets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_view(view);
    }

    /// Whether `view` owns its trigger set.
    #[must_use]
    pub fn is_local(&self, view: ViewId) -> bool {
        self.sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_local(view)
    }

    /// Give `view` its own copy of whatever it inherits and return the
    /// copies for persistence.
    pub fn materialize(&self, view: ViewId) -> Vec<TriggerDef> {
        self.sets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .materialize(view)
    }

    /// Add a trigger to its view's own set. Returns `false` if the view does
    /// not own its set yet.
    pub fn register(&self, trigger: TriggerDef) -> bool {
        self.sets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(trigger.view, trigger)
    }

    /// Replace a trigger in its view's own set.
    pub fn update(&self, trigger: TriggerDef) -> bool {
        self.sets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(trigger.view, trigger)
    }

    /// Remove a trigger from `view`'s own set.
    pub fn unregister(&self, view: ViewId, id: TriggerId) -> Option<Arc<TriggerDef>> {
        let removed = self
            .sets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(view, id);
        if removed.is_some() {
            self.lock_stats().remove(&(view, id));
        }
        removed
    }

    /// Look up a trigger visible in `view`.
    #[must_use]
    pub fn get(&self, view: ViewId, id: TriggerId) -> Option<Arc<TriggerDef>> {
        self.sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(view, id)
    }

    /// Every trigger visible in `view`, in creation order.
    #[must_use]
    pub fn list(&self, view: ViewId) -> Vec<Arc<TriggerDef>> {
        self.sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot(view)
            .to_vec()
    }

    /// Enabled triggers visible in the event's view whose condition matches,
    /// in creation order.
    ///
    /// The result is a snapshot: registrations made while it is being
    /// dispatched do not change it.
    #[must_use]
    pub fn matching(&self, event: &MutationEvent) -> Vec<Arc<TriggerDef>> {
        let snapshot = self
            .sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot(event.view);
        snapshot
            .iter()
            .filter(|trigger| trigger.enabled && trigger.condition.matches(event))
            .cloned()
            .collect()
    }

    /// Whether the trigger is still registered and enabled in `view`.
    #[must_use]
    pub fn is_live(&self, view: ViewId, id: TriggerId) -> bool {
        self.get(view, id).is_some_and(|trigger| trigger.enabled)
    }

    /// Counters for a physical trigger record.
    #[must_use]
    pub fn stats(&self, trigger: &TriggerDef) -> TriggerStats {
        self.lock_stats()
            .get(&(trigger.view, trigger.id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn record_success(&self, trigger: &TriggerDef) {
        self.lock_stats()
            .entry((trigger.view, trigger.id))
            .or_default()
            .fired += 1;
    }

    pub fn record_failure(&self, trigger: &TriggerDef, error: String) {
        let mut stats = self.lock_stats();
        let entry = stats.entry((trigger.view, trigger.id)).or_default();
        entry.fired += 1;
        entry.failed += 1;
        entry.last_error = Some(error);
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, HashMap<(ViewId, TriggerId), TriggerStats>> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
