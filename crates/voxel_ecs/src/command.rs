//! Deferred registry mutations.
//!
//! Entity creation and destruction from inside a running system would
//! violate the scheduler's access invariant, so systems append commands to a
//! per-tick [`CommandBuffer`] instead. The buffer is drained at the tick
//! barrier by whoever owns the registry.

use crate::component::Component;
use crate::entity::Entity;
use crate::registry::Registry;

type Command = Box<dyn FnOnce(&mut Registry) + Send>;

/// An append-only buffer of deferred registry mutations.
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if no commands are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Appends an arbitrary deferred mutation.
    pub fn push(&mut self, command: impl FnOnce(&mut Registry) + Send + 'static) {
        self.commands.push(Box::new(command));
    }

    /// Defers creation of an entity carrying one component.
    pub fn create_entity_with<C: Component>(&mut self, value: C) {
        self.push(move |registry| {
            let entity = registry.create_entity();
            registry.emplace(entity, value);
        });
    }

    /// Defers destruction of an entity.
    pub fn destroy_entity(&mut self, entity: Entity) {
        self.push(move |registry| {
            registry.destroy_entity(entity);
        });
    }

    /// Defers attaching a component to an entity.
    pub fn emplace<C: Component>(&mut self, entity: Entity, value: C) {
        self.push(move |registry| {
            registry.emplace(entity, value);
        });
    }

    /// Defers detaching a component from an entity.
    pub fn erase<C: Component>(&mut self, entity: Entity) {
        self.push(move |registry| {
            registry.erase::<C>(entity);
        });
    }

    /// Applies all buffered commands in append order and empties the buffer.
    pub fn apply(&mut self, registry: &mut Registry) {
        for command in self.commands.drain(..) {
            command(registry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Tag(u32);

    impl Component for Tag {
        fn type_name() -> &'static str {
            "command_test::Tag"
        }
    }

    #[test]
    fn test_commands_apply_in_order() {
        let mut reg = Registry::new();
        let e = reg.create_entity();

        let mut buffer = CommandBuffer::new();
        buffer.emplace(e, Tag(1));
        buffer.push(move |reg| {
            reg.get_mut::<Tag>(e).unwrap().0 = 2;
        });
        assert_eq!(buffer.len(), 2);

        // Nothing happens until the barrier.
        assert!(!reg.contains::<Tag>(e));

        buffer.apply(&mut reg);
        assert_eq!(reg.get::<Tag>(e), Some(&Tag(2)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_deferred_create_and_destroy() {
        let mut reg = Registry::new();
        let doomed = reg.create_entity();

        let mut buffer = CommandBuffer::new();
        buffer.create_entity_with(Tag(7));
        buffer.destroy_entity(doomed);
        buffer.apply(&mut reg);

        assert!(reg.is_dead(doomed));
        assert_eq!(reg.alive_count(), 1);
        let created: Vec<_> = reg.pool::<Tag>().unwrap().iter().collect();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].1, &Tag(7));
    }
}
