//! In-memory entity stores backing the task list and comment threads.
//!
//! An [`EntityStore`] keeps entities keyed by [`EntityId`] plus a display
//! order. Every mutation is idempotent: applying the same call twice in a
//! row leaves the store exactly as applying it once. `insert_one` upgrades
//! to a replace when the id is already present, which is what keeps a local
//! optimistic insert and the broker's `created` echo from duplicating.
//!
//! Ids removed with [`EntityStore::bury`] are remembered for the life of
//! the store. A late rollback or confirmation never brings them back.

pub mod board;

use std::collections::{HashMap, HashSet};

use taskdeck_proto::model::{Comment, EntityId, Task};

pub use board::CommentBoard;

/// Anything stored by identifier.
pub trait Entity: Clone {
    /// Returns the entity's identifier.
    fn id(&self) -> &EntityId;
}

impl Entity for Task {
    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl Entity for Comment {
    fn id(&self) -> &EntityId {
        &self.id
    }
}

/// Where newly inserted entities appear in the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Newest first (task list).
    Front,
    /// Oldest first (comment threads).
    Back,
}

/// Result of [`EntityStore::insert_one`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    /// The id was new and the entity was placed.
    New,
    /// The id was already present; its entry was replaced in place.
    Replaced,
}

/// Keyed collection with a stable display order.
#[derive(Debug, Clone)]
pub struct EntityStore<E> {
    entries: HashMap<EntityId, E>,
    order: Vec<EntityId>,
    tombstones: HashSet<EntityId>,
    placement: Placement,
}

impl<E: Entity> EntityStore<E> {
    /// Creates an empty store.
    #[must_use]
    pub fn new(placement: Placement) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            tombstones: HashSet::new(),
            placement,
        }
    }

    /// Replaces the whole collection, keeping the list order.
    ///
    /// If the list repeats an id, the later entity wins and the earlier
    /// position is kept. Buried ids are skipped: a list fetched before a
    /// delete landed must not resurrect it.
    pub fn set_all(&mut self, items: impl IntoIterator<Item = E>) {
        self.entries.clear();
        self.order.clear();
        for item in items {
            let id = item.id().clone();
            if self.tombstones.contains(&id) {
                continue;
            }
            if self.entries.insert(id.clone(), item).is_none() {
                self.order.push(id);
            }
        }
    }

    /// Inserts an entity, or replaces it in place if its id is present.
    pub fn insert_one(&mut self, entity: E) -> Inserted {
        let id = entity.id().clone();
        if let Some(existing) = self.entries.get_mut(&id) {
            *existing = entity;
            return Inserted::Replaced;
        }
        match self.placement {
            Placement::Front => self.order.insert(0, id.clone()),
            Placement::Back => self.order.push(id.clone()),
        }
        self.entries.insert(id, entity);
        Inserted::New
    }

    /// Replaces the entity with the same id. No-op if absent.
    ///
    /// Returns `true` if an entry was replaced.
    pub fn replace_one(&mut self, entity: E) -> bool {
        match self.entries.get_mut(entity.id()) {
            Some(existing) => {
                *existing = entity;
                true
            }
            None => false,
        }
    }

    /// Removes the entity with `id`, returning its display position and value.
    pub fn remove_one(&mut self, id: &EntityId) -> Option<(usize, E)> {
        let entity = self.entries.remove(id)?;
        let position = self.position(id)?;
        self.order.remove(position);
        Some((position, entity))
    }

    /// Removes `id` for good. Later [`restore`](Self::restore),
    /// [`substitute`](Self::substitute) and [`set_all`](Self::set_all) calls
    /// skip it.
    pub fn bury(&mut self, id: &EntityId) -> Option<(usize, E)> {
        self.tombstones.insert(id.clone());
        self.remove_one(id)
    }

    /// Returns `true` if `id` was buried.
    #[must_use]
    pub fn is_buried(&self, id: &EntityId) -> bool {
        self.tombstones.contains(id)
    }

    /// Empties the store and forgets buried ids.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.tombstones.clear();
    }

    /// Puts an entity back at `position` (clamped to the list length).
    ///
    /// If the id is present the entry is replaced and keeps its position.
    /// Buried ids stay gone.
    pub fn restore(&mut self, position: usize, entity: E) {
        let id = entity.id().clone();
        if self.tombstones.contains(&id) {
            return;
        }
        if self.entries.contains_key(&id) {
            self.entries.insert(id, entity);
            return;
        }
        let position = position.min(self.order.len());
        self.order.insert(position, id.clone());
        self.entries.insert(id, entity);
    }

    /// Swaps the entity stored under `old` for `confirmed`, which carries
    /// its final identifier.
    ///
    /// - `old` present, new id absent: `confirmed` takes `old`'s position.
    /// - `old` present, new id present (the `created` echo won the race):
    ///   `old` is dropped and the existing entry is replaced.
    /// - `old` absent: behaves like [`insert_one`](Self::insert_one).
    /// - new id buried: `old` is dropped and nothing takes its place.
    pub fn substitute(&mut self, old: &EntityId, confirmed: E) {
        let new_id = confirmed.id().clone();
        if self.tombstones.contains(&new_id) {
            self.remove_one(old);
            return;
        }
        if *old == new_id {
            self.insert_one(confirmed);
            return;
        }
        let Some(position) = self.position(old) else {
            self.insert_one(confirmed);
            return;
        };
        self.entries.remove(old);
        if self.entries.contains_key(&new_id) {
            self.order.remove(position);
            self.entries.insert(new_id, confirmed);
        } else {
            self.order[position] = new_id.clone();
            self.entries.insert(new_id, confirmed);
        }
    }

    /// Returns the entity with `id`.
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&E> {
        self.entries.get(id)
    }

    /// Returns `true` if `id` is present.
    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.contains_key(id)
    }

    /// Display position of `id`.
    #[must_use]
    pub fn position(&self, id: &EntityId) -> Option<usize> {
        self.order.iter().position(|candidate| candidate == id)
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates in display order.
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Clones the display list.
    #[must_use]
    pub fn to_vec(&self) -> Vec<E> {
        self.iter().cloned().collect()
    }
}
