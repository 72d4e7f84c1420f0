//! Optimistic mutations.
//!
//! A mutation is applied to a store immediately and remembered as a
//! [`PendingMutation`] holding a [`Snapshot`] of the affected entity. Once
//! the server answers, the pending mutation is consumed exactly once:
//! [`confirm`](PendingMutation::confirm) keeps the change (substituting the
//! server's entity), [`roll_back`](PendingMutation::roll_back) restores the
//! snapshot. Both consume `self`, so a mutation cannot be resolved twice.
//!
//! Snapshots are scoped to one entity. Rolling back touches that entity
//! only, so remote events applied to other entities in the meantime survive.
//! An entity deleted remotely while the mutation was in flight stays
//! deleted whichever way the mutation ends.

use taskdeck_proto::model::EntityId;

use crate::store::{Entity, EntityStore};

/// What kind of change was applied optimistically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// A new entity under a transient id.
    Insert,
    /// An existing entity was replaced.
    Replace,
    /// An existing entity was removed.
    Remove,
}

/// The affected entity as it was before the mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<E> {
    id: EntityId,
    prior: Option<(usize, E)>,
}

impl<E> Snapshot<E> {
    /// Identifier the mutation applied to.
    #[must_use]
    pub const fn id(&self) -> &EntityId {
        &self.id
    }

    /// The entity before the mutation and its display position, or `None`
    /// if it did not exist.
    #[must_use]
    pub const fn prior(&self) -> Option<&(usize, E)> {
        self.prior.as_ref()
    }
}

/// How a mutation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<E> {
    /// The server accepted the change.
    Confirmed,
    /// The server refused or could not be reached; the snapshot was restored.
    RolledBack(Snapshot<E>),
}

/// A change applied locally and awaiting the server's answer.
#[derive(Debug)]
#[must_use = "a pending mutation must be confirmed or rolled back"]
pub struct PendingMutation<E> {
    kind: MutationKind,
    snapshot: Snapshot<E>,
}

impl<E: Entity> PendingMutation<E> {
    /// Inserts `entity` (carrying a transient id) into `store`.
    pub fn insert(store: &mut EntityStore<E>, entity: E) -> Self {
        let id = entity.id().clone();
        let prior = store
            .position(&id)
            .and_then(|pos| store.get(&id).map(|e| (pos, e.clone())));
        store.insert_one(entity);
        Self {
            kind: MutationKind::Insert,
            snapshot: Snapshot { id, prior },
        }
    }

    /// Replaces the entity with `entity`'s id. Returns `None` if absent.
    pub fn replace(store: &mut EntityStore<E>, entity: E) -> Option<Self> {
        let id = entity.id().clone();
        let position = store.position(&id)?;
        let previous = store.get(&id)?.clone();
        store.replace_one(entity);
        Some(Self {
            kind: MutationKind::Replace,
            snapshot: Snapshot {
                id,
                prior: Some((position, previous)),
            },
        })
    }

    /// Removes the entity with `id`. Returns `None` if absent.
    pub fn remove(store: &mut EntityStore<E>, id: &EntityId) -> Option<Self> {
        let prior = store.remove_one(id)?;
        Some(Self {
            kind: MutationKind::Remove,
            snapshot: Snapshot {
                id: id.clone(),
                prior: Some(prior),
            },
        })
    }

    /// Kind of change.
    pub const fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Identifier the mutation applied to.
    pub const fn id(&self) -> &EntityId {
        &self.snapshot.id
    }

    /// Keeps the change.
    ///
    /// `confirmed` is the server's version of the entity. For inserts it
    /// replaces the transient entry (and may carry a different id); for
    /// replaces it overwrites the optimistic value. Removes take `None` and
    /// bury the id.
    pub fn confirm(self, store: &mut EntityStore<E>, confirmed: Option<E>) -> Resolution<E> {
        match (self.kind, confirmed) {
            (MutationKind::Insert, Some(entity)) => store.substitute(&self.snapshot.id, entity),
            (MutationKind::Replace, Some(entity)) => {
                if !store.replace_one(entity) {
                    tracing::debug!(id = %self.snapshot.id, "confirmed entity no longer in store");
                }
            }
            (MutationKind::Remove, _) => {
                store.bury(&self.snapshot.id);
            }
            (_, _) => {}
        }
        Resolution::Confirmed
    }

    /// Restores the snapshot.
    ///
    /// A replaced entity that has since left the store is not put back.
    pub fn roll_back(self, store: &mut EntityStore<E>) -> Resolution<E> {
        match (self.kind, &self.snapshot.prior) {
            (_, None) => {
                store.remove_one(&self.snapshot.id);
            }
            (MutationKind::Replace, Some((_, previous))) => {
                store.replace_one(previous.clone());
            }
            (_, Some((position, previous))) => store.restore(*position, previous.clone()),
        }
        Resolution::RolledBack(self.snapshot)
    }
}
