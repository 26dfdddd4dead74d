//! Copy-on-write definition sets keyed by view.
//!
//! A root view owns its set. A fork starts out pointing at its parent's set
//! and only gets a set of its own (copied from whatever it inherited) on its
//! first local change. Readers always get an immutable snapshot, so a change
//! made while a snapshot is being iterated never affects that iteration.

use std::collections::HashMap;
use std::sync::Arc;

use nodehook_domain::id::ViewId;

/// A definition that lives in exactly one view's set.
pub trait Scoped: Clone {
    type Key: Copy + Eq;

    fn key(&self) -> Self::Key;

    /// Copy the definition into `view`, keeping its key.
    #[must_use]
    fn copy_to(&self, view: ViewId) -> Self;
}

/// Immutable snapshot of one view's definitions, in insertion order.
pub type Snapshot<T> = Arc<Vec<Arc<T>>>;

#[derive(Debug)]
enum Slot<T> {
    Local(Snapshot<T>),
    Inherited(ViewId),
}

/// Per-view definition sets with lazy copy-on-write inheritance.
#[derive(Debug)]
pub struct ViewSets<T> {
    slots: HashMap<ViewId, Slot<T>>,
}

impl<T> Default for ViewSets<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<T: Scoped> ViewSets<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view. Views without a parent always own their set.
    pub fn add_view(&mut self, view: ViewId, parent: Option<ViewId>, local: bool) {
        let slot = match parent {
            Some(parent) if !local => Slot::Inherited(parent),
            _ => Slot::Local(Arc::default()),
        };
        self.slots.insert(view, slot);
    }

    #[must_use]
    pub fn contains_view(&self, view: ViewId) -> bool {
        self.slots.contains_key(&view)
    }

    /// Whether `view` owns its set.
    #[must_use]
    pub fn is_local(&self, view: ViewId) -> bool {
        matches!(self.slots.get(&view), Some(Slot::Local(_)))
    }

    /// The view whose set `view` currently reads from.
    #[must_use]
    pub fn owner(&self, view: ViewId) -> Option<ViewId> {
        let mut current = view;
        // A parent chain can never be longer than the number of views.
        for _ in 0..=self.slots.len() {
            match self.slots.get(&current)? {
                Slot::Local(_) => return Some(current),
                Slot::Inherited(parent) => current = *parent,
            }
        }
        None
    }

    /// The set visible in `view`.
    #[must_use]
    pub fn snapshot(&self, view: ViewId) -> Snapshot<T> {
        self.owner(view)
            .and_then(|owner| match self.slots.get(&owner) {
                Some(Slot::Local(items)) => Some(Arc::clone(items)),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Find a definition visible in `view`.
    #[must_use]
    pub fn get(&self, view: ViewId, key: T::Key) -> Option<Arc<T>> {
        self.snapshot(view)
            .iter()
            .find(|item| item.key() == key)
            .cloned()
    }

    /// Give `view` its own set if it still inherits one.
    ///
    /// Returns the copies that were created (empty when the view was already
    /// local) so the caller can persist them.
    pub fn materialize(&mut self, view: ViewId) -> Vec<T> {
        if !matches!(self.slots.get(&view), Some(Slot::Inherited(_))) {
            return Vec::new();
        }
        let copies: Vec<T> = self
            .snapshot(view)
            .iter()
            .map(|item| item.copy_to(view))
            .collect();
        let items = copies.iter().cloned().map(Arc::new).collect();
        self.slots.insert(view, Slot::Local(Arc::new(items)));
        copies
    }

    /// Append a definition to its view's own set.
    ///
    /// Returns `false` when the view is unknown or does not own its set.
    pub fn insert(&mut self, view: ViewId, item: T) -> bool {
        match self.slots.get_mut(&view) {
            Some(Slot::Local(items)) => {
                Arc::make_mut(items).push(Arc::new(item));
                true
            }
            _ => false,
        }
    }

    /// Replace a definition in its view's own set, keeping its position.
    pub fn replace(&mut self, view: ViewId, item: T) -> bool {
        let Some(Slot::Local(items)) = self.slots.get_mut(&view) else {
            return false;
        };
        let key = item.key();
        let Some(pos) = items.iter().position(|existing| existing.key() == key) else {
            return false;
        };
        Arc::make_mut(items)[pos] = Arc::new(item);
        true
    }

    /// Remove a definition from its view's own set.
    pub fn remove(&mut self, view: ViewId, key: T::Key) -> Option<Arc<T>> {
        let Some(Slot::Local(items)) = self.slots.get_mut(&view) else {
            return None;
        };
        let pos = items.iter().position(|existing| existing.key() == key)?;
        Some(Arc::make_mut(items).remove(pos))
    }

    /// Drop a view. Forks still pointing at it fall back to an empty set.
    pub fn remove_view(&mut self, view: ViewId) {
        self.slots.remove(&view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Def {
        id: u32,
        view: ViewId,
        body: &'static str,
    }

    impl Scoped for Def {
        type Key = u32;

        fn key(&self) -> u32 {
            self.id
        }

        fn copy_to(&self, view: ViewId) -> Self {
            Self {
                view,
                ..self.clone()
            }
        }
    }

    fn setup() -> (ViewSets<Def>, ViewId, ViewId) {
        let mut sets = ViewSets::new();
        let root = ViewId::new();
        let fork = ViewId::new();
        sets.add_view(root, None, false);
        sets.add_view(fork, Some(root), false);
        sets.insert(
            root,
            Def {
                id: 1,
                view: root,
                body: "a",
            },
        );
        (sets, root, fork)
    }

    #[test]
    fn should_treat_root_as_local_even_when_flag_is_false() {
        let (sets, root, fork) = setup();
        assert!(sets.is_local(root));
        assert!(!sets.is_local(fork));
    }

    #[test]
    fn should_see_parent_definitions_from_inheriting_fork() {
        let (sets, root, fork) = setup();
        assert_eq!(sets.owner(fork), Some(root));
        assert_eq!(sets.snapshot(fork).len(), 1);
        assert_eq!(sets.get(fork, 1).unwrap().view, root);
    }

    #[test]
    fn should_copy_on_first_local_change() {
        let (mut sets, root, fork) = setup();
        let copies = sets.materialize(fork);
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].view, fork);
        assert_eq!(copies[0].id, 1);

        sets.replace(
            fork,
            Def {
                id: 1,
                view: fork,
                body: "b",
            },
        );
        assert_eq!(sets.get(fork, 1).unwrap().body, "b");
        assert_eq!(sets.get(root, 1).unwrap().body, "a");
    }

    #[test]
    fn should_return_no_copies_when_already_local() {
        let (mut sets, root, _) = setup();
        assert!(sets.materialize(root).is_empty());
    }

    #[test]
    fn should_refuse_insert_into_inherited_set() {
        let (mut sets, _, fork) = setup();
        let def = Def {
            id: 2,
            view: fork,
            body: "c",
        };
        assert!(!sets.insert(fork, def));
    }

    #[test]
    fn should_keep_snapshot_stable_while_set_changes() {
        let (mut sets, root, _) = setup();
        let before = sets.snapshot(root);
        sets.insert(
            root,
            Def {
                id: 2,
                view: root,
                body: "c",
            },
        );
        sets.remove(root, 1);
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].id, 1);
        assert_eq!(sets.snapshot(root).len(), 1);
        assert_eq!(sets.snapshot(root)[0].id, 2);
    }

    #[test]
    fn should_preserve_insertion_order() {
        let (mut sets, root, _) = setup();
        for id in 2..5 {
            sets.insert(
                root,
                Def {
                    id,
                    view: root,
                    body: "x",
                },
            );
        }
        let ids: Vec<u32> = sets.snapshot(root).iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }
}
