//! Macro store — named query bodies readable from the inline path.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use nodehook_domain::error::{NodehookError, NotFoundError};
use nodehook_domain::macros::Macro;

/// In-memory cache of every macro, kept in sync by the macro service.
#[derive(Debug, Default)]
pub struct MacroStore {
    macros: RwLock<BTreeMap<String, Macro>>,
}

impl MacroStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a macro.
    pub fn set(&self, mac: Macro) {
        self.macros
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(mac.name.clone(), mac);
    }

    /// Look up a macro by name.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown name.
    pub fn get(&self, name: &str) -> Result<Macro, NodehookError> {
        self.macros
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| {
                NotFoundError {
                    entity: "Macro",
                    id: name.to_string(),
                }
                .into()
            })
    }

    /// Remove a macro, returning it if it existed.
    pub fn delete(&self, name: &str) -> Option<Macro> {
        self.macros
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Every macro, ordered by name.
    #[must_use]
    pub fn list(&self) -> Vec<Macro> {
        self.macros
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
