//! Per-type component storage.
//!
//! A [`ComponentPool`] pairs a sparse set of entities (the owner of the
//! index space) with paged value slots addressed by dense position. Pages
//! are boxed and never relocate once allocated, which is what makes the
//! reference-stability contract hold: a reference-stable pool uses an
//! index-stable entity set, so a value's dense position, and therefore its
//! address, is fixed from insertion until erase or clear.
//!
//! Pools for storage-eluding component types keep no per-entity values at
//! all; reads return a shared sentinel and writes land on the sentinel,
//! which is a no-op for the zero-sized types elusion is restricted to.

use crate::component::Component;
use crate::entity::Entity;
use crate::sparse_set::SparseSet;

/// Observer for storage mutations of a component pool.
///
/// Change trackers and secondary indices hook these without the pool owning
/// their state. All methods default to no-ops.
pub trait StorageMixin<C> {
    /// A value was inserted for the entity.
    fn on_insert(&mut self, _entity: Entity, _value: &C) {}
    /// The entity's value was erased.
    fn on_erase(&mut self, _entity: Entity) {}
    /// A surviving value was relocated between dense positions.
    fn on_swap(&mut self, _moved: Entity, _from: usize, _to: usize) {}
    /// The pool was cleared.
    fn on_clear(&mut self) {}
}

/// The default mixin; observes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStorageMixin;

impl<C> StorageMixin<C> for NoStorageMixin {}

#[derive(Debug)]
struct PagedSlots<C> {
    pages: Vec<Option<Box<[Option<C>]>>>,
    page_size: usize,
}

impl<C> PagedSlots<C> {
    fn new(page_size: usize) -> Self {
        debug_assert!(page_size.is_power_of_two(), "page size must be a power of two");
        Self {
            pages: Vec::new(),
            page_size,
        }
    }

    fn locate(&self, pos: usize) -> (usize, usize) {
        (pos / self.page_size, pos % self.page_size)
    }

    fn get(&self, pos: usize) -> Option<&C> {
        let (page, slot) = self.locate(pos);
        self.pages.get(page)?.as_ref()?.get(slot)?.as_ref()
    }

    fn get_mut(&mut self, pos: usize) -> Option<&mut C> {
        let (page, slot) = self.locate(pos);
        self.pages.get_mut(page)?.as_mut()?.get_mut(slot)?.as_mut()
    }

    fn set(&mut self, pos: usize, value: C) {
        let (page, slot) = self.locate(pos);
        if page >= self.pages.len() {
            self.pages.resize_with(page + 1, || None);
        }
        let size = self.page_size;
        let p = self.pages[page]
            .get_or_insert_with(|| (0..size).map(|_| None).collect::<Vec<_>>().into_boxed_slice());
        p[slot] = Some(value);
    }

    fn take(&mut self, pos: usize) -> Option<C> {
        let (page, slot) = self.locate(pos);
        self.pages.get_mut(page)?.as_mut()?.get_mut(slot)?.take()
    }

    fn clear(&mut self) {
        self.pages.clear();
    }
}

#[derive(Debug)]
enum Slots<C> {
    Paged(PagedSlots<C>),
    Eluded(C),
}

/// Paged component storage for a single component type.
#[derive(Debug)]
pub struct ComponentPool<C: Component, M: StorageMixin<C> = NoStorageMixin> {
    entities: SparseSet,
    slots: Slots<C>,
    mixin: M,
}

impl<C: Component> ComponentPool<C> {
    /// Creates an empty pool with the component type's declared traits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mixin(NoStorageMixin)
    }
}

impl<C: Component> Default for ComponentPool<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Component, M: StorageMixin<C>> ComponentPool<C, M> {
    /// Creates an empty pool with the given mixin.
    #[must_use]
    pub fn with_mixin(mixin: M) -> Self {
        debug_assert!(
            !C::ELUDE_STORAGE || std::mem::size_of::<C>() == 0,
            "storage elusion requires a zero-sized component type"
        );

        let slots = if C::ELUDE_STORAGE {
            Slots::Eluded(C::default())
        } else {
            Slots::Paged(PagedSlots::new(C::PAGE_SIZE))
        };

        Self {
            entities: if C::REFERENCE_STABILITY {
                SparseSet::new_stable()
            } else {
                SparseSet::new()
            },
            slots,
            mixin,
        }
    }

    /// Number of entities with a component in this pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entity has a component in this pool.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The entity set recording membership.
    #[must_use]
    pub fn entity_set(&self) -> &SparseSet {
        &self.entities
    }

    /// Index+version membership test.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    /// Inserts a value for the entity if its index is not already present.
    ///
    /// Returns the dense position and whether a new entry was created; on an
    /// occupied index the existing value is untouched and `false` is
    /// returned. The pool does not validate the entity against any entity
    /// store; callers ensure it is alive.
    pub fn emplace(&mut self, entity: Entity, value: C) -> (usize, bool) {
        if let Some(pos) = self
            .entities
            .find_any_version(entity.index())
            .and_then(|stored| self.entities.dense_position(stored))
        {
            return (pos, false);
        }

        let (pos, inserted) = self.entities.insert(entity);
        debug_assert!(inserted);

        match &mut self.slots {
            Slots::Paged(slots) => slots.set(pos, value),
            Slots::Eluded(_) => drop(value),
        }

        let stored = match &self.slots {
            Slots::Paged(slots) => slots.get(pos),
            Slots::Eluded(sentinel) => Some(sentinel),
        };
        if let Some(stored) = stored {
            self.mixin.on_insert(entity, stored);
        }

        (pos, inserted)
    }

    /// Erases the entity's value (index+version match). Returns whether an
    /// entry was removed.
    pub fn erase(&mut self, entity: Entity) -> bool {
        let Some(pos) = self.entities.dense_position(entity) else {
            return false;
        };

        if self.entities.is_index_stable() {
            // The dense slot becomes a tombstone; the value slot is emptied
            // and reused only when a future insert takes the same slot.
            let _ = match &mut self.slots {
                Slots::Paged(slots) => slots.take(pos),
                Slots::Eluded(_) => None,
            };
            self.entities.erase(entity);
            self.mixin.on_erase(entity);
        } else {
            let last = self.entities.iteration_complexity() - 1;
            if let Slots::Paged(slots) = &mut self.slots {
                let _ = slots.take(pos);
                if pos != last {
                    if let Some(moved) = slots.take(last) {
                        slots.set(pos, moved);
                    }
                }
            }
            self.entities.erase(entity);
            self.mixin.on_erase(entity);
            if pos != last {
                if let Some(moved) = self.entities.entity_at(pos) {
                    self.mixin.on_swap(moved, last, pos);
                }
            }
        }

        true
    }

    /// Returns a reference to the entity's value, if present.
    #[must_use]
    pub fn find(&self, entity: Entity) -> Option<&C> {
        let pos = self.entities.dense_position(entity)?;
        match &self.slots {
            Slots::Paged(slots) => slots.get(pos),
            Slots::Eluded(sentinel) => Some(sentinel),
        }
    }

    /// Returns a mutable reference to the entity's value, if present.
    ///
    /// For eluded storage this is the shared sentinel; writing to it is a
    /// no-op for the zero-sized types elusion permits.
    #[must_use]
    pub fn find_mut(&mut self, entity: Entity) -> Option<&mut C> {
        let pos = self.entities.dense_position(entity)?;
        match &mut self.slots {
            Slots::Paged(slots) => slots.get_mut(pos),
            Slots::Eluded(sentinel) => Some(sentinel),
        }
    }

    /// Unchecked access; the entity must be present.
    ///
    /// # Panics
    ///
    /// Panics if the entity has no value in this pool. [`find`](Self::find)
    /// is the checked form.
    #[must_use]
    pub fn get(&self, entity: Entity) -> &C {
        match self.find(entity) {
            Some(value) => value,
            None => panic!("entity {entity} has no {} component", C::type_name()),
        }
    }

    /// Unchecked mutable access; the entity must be present.
    ///
    /// # Panics
    ///
    /// Panics if the entity has no value in this pool.
    #[must_use]
    pub fn get_mut(&mut self, entity: Entity) -> &mut C {
        match self.find_mut(entity) {
            Some(value) => value,
            None => panic!("entity {entity} has no {} component", C::type_name()),
        }
    }

    /// Removes every value and frees all pages.
    pub fn clear(&mut self) {
        self.entities.clear();
        if let Slots::Paged(slots) = &mut self.slots {
            slots.clear();
        }
        self.mixin.on_clear();
    }

    /// Iterates `(entity, value)` pairs in dense order, skipping tombstones.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &C)> + '_ {
        (0..self.entities.iteration_complexity()).filter_map(move |pos| {
            let entity = self.entities.entity_at(pos)?;
            let value = match &self.slots {
                Slots::Paged(slots) => slots.get(pos)?,
                Slots::Eluded(sentinel) => sentinel,
            };
            Some((entity, value))
        })
    }

    /// Returns a reference to the mixin.
    #[must_use]
    pub fn mixin(&self) -> &M {
        &self.mixin
    }
}
