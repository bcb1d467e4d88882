//! Entity creation and destruction.
//!
//! [`EntityLifetimes`] keeps two sparse sets: `alive` and `tombstones`. An
//! index appears in at most one of the two. Creating an ID either recycles a
//! tombstone (whose version was already promoted at destroy time) or
//! allocates the next unused index; destroying an ID moves it from `alive`
//! to `tombstones` with the next version and cleared unassigned bits.

use crate::entity::{Entity, INDEX_MASK};
use crate::sparse_set::SparseSet;

/// Manages the creation and destruction of entity IDs.
#[derive(Debug, Default)]
pub struct EntityLifetimes {
    alive: SparseSet,
    tombstones: SparseSet,
    next_index: u64,
}

impl EntityLifetimes {
    /// Creates an empty lifetime manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new entity.
    ///
    /// Recycles the most recently tombstoned ID if one exists (its version
    /// was promoted when it was destroyed), otherwise allocates the next
    /// unused index with version zero.
    ///
    /// # Panics
    ///
    /// Panics if the 32-bit index space is exhausted.
    pub fn create(&mut self) -> Entity {
        let id = match self.tombstones.last() {
            Some(t) => {
                self.tombstones.erase_exact(t);
                t
            }
            None => self.next(),
        };

        let (_, inserted) = self.alive.insert(id);
        debug_assert!(inserted, "failed to create entity {id}");
        id
    }

    /// Creates an entity with the given ID.
    ///
    /// Fails if an entity currently occupies the same index, or if a
    /// tombstone exists at that index whose version is not strictly below
    /// the supplied version.
    pub fn create_with_id(&mut self, entity: Entity) -> bool {
        if entity.is_tombstone() || self.alive.contains_any_version(entity.index()) {
            return false;
        }

        if let Some(tombstone) = self.tombstones.find_any_version(entity.index()) {
            if tombstone.version() < entity.version() {
                self.tombstones.erase_exact(tombstone);
            } else {
                return false;
            }
        }

        let (_, inserted) = self.alive.insert(entity);
        debug_assert!(inserted, "failed to create entity {entity}");
        inserted
    }

    /// Destroys the given entity, if it is alive. Returns whether it was.
    ///
    /// The tombstone stores the next version so any future occupant of the
    /// index compares strictly greater; unassigned bits are not preserved.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        if !self.alive.erase(entity) {
            return false;
        }
        self.tombstones.insert(entity.next_version());
        true
    }

    /// Returns `true` if this exact entity (index+version) exists currently.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.alive.contains(entity)
    }

    /// Returns `true` if this entity existed in the past but does not
    /// anymore: a newer version occupies or tombstones its index.
    #[must_use]
    pub fn is_dead(&self, entity: Entity) -> bool {
        if let Some(t) = self.tombstones.find_any_version(entity.index()) {
            return t.version() > entity.version();
        }
        if let Some(a) = self.alive.find_any_version(entity.index()) {
            return a.version() > entity.version();
        }
        false
    }

    /// Returns `true` if this entity exists currently or existed in the past.
    #[must_use]
    pub fn has_existed(&self, entity: Entity) -> bool {
        self.is_alive(entity) || self.is_dead(entity)
    }

    /// Number of currently alive entities.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    /// The set of alive entities.
    #[must_use]
    pub fn alive(&self) -> &SparseSet {
        &self.alive
    }

    /// The set of tombstoned entities.
    #[must_use]
    pub fn tombstoned(&self) -> &SparseSet {
        &self.tombstones
    }

    fn next(&mut self) -> Entity {
        debug_assert!(
            self.tombstones.is_empty(),
            "cannot allocate a fresh index while tombstones exist"
        );

        while self.alive.contains_any_version(self.next_index) {
            self.next_index += 1;
        }
        assert!(self.next_index < INDEX_MASK, "entity index space exhausted");

        Entity::from_parts(self.next_index, 0, 0)
    }
}
