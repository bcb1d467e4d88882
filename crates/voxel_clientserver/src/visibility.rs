//! Per-remote entity visibility tracking.
//!
//! Each instance carries at most one visibility rule. Every tick the rule
//! is evaluated for every alive entity against every connected remote, and
//! a two-bit state per (entity, remote) records the current visibility and
//! whether it changed this tick. Entities transitioning to visible are
//! batched into `ADD_ENTITY`; entities transitioning to invisible
//! (including destroyed ones) into `DEL_ENTITY`.

use std::collections::HashMap;
use std::sync::Arc;

use voxel_ecs::{Entity, Registry};

use crate::instance::InstanceId;

/// The per-(entity, remote) visibility rule.
pub type VisibilityRule = Arc<dyn Fn(&Registry, Entity, InstanceId) -> bool + Send + Sync>;

/// Entity is invisible and was invisible last tick.
pub const INVISIBLE: u8 = 0b00;
/// Entity is visible and was visible last tick.
pub const VISIBLE: u8 = 0b01;
/// Entity went invisible this tick.
pub const BECAME_INVISIBLE: u8 = 0b10;
/// Entity went visible this tick.
pub const BECAME_VISIBLE: u8 = 0b11;

/// Mask of the "currently visible" bit.
pub const VISIBILITY_BIT: u8 = 0b01;
/// Mask of the "changed this tick" bit.
pub const CHANGED_BIT: u8 = 0b10;

/// Visibility rule plus the per-remote status table.
pub struct VisibilityState {
    rule: VisibilityRule,
    status: HashMap<InstanceId, HashMap<Entity, u8>>,
}

impl VisibilityState {
    /// Creates visibility state with the given rule.
    #[must_use]
    pub fn new(rule: VisibilityRule) -> Self {
        Self {
            rule,
            status: HashMap::new(),
        }
    }

    /// Creates visibility state where every entity is visible to every
    /// remote.
    #[must_use]
    pub fn always_visible() -> Self {
        Self::new(Arc::new(|_, _, _| true))
    }

    /// Replaces the rule; status tables are kept so transitions stay
    /// incremental.
    pub fn set_rule(&mut self, rule: VisibilityRule) {
        self.rule = rule;
    }

    /// Re-evaluates the rule for every alive entity against one remote.
    ///
    /// Returns the entities that became visible and invisible this tick.
    /// `destroyed` lists entities destroyed since the last evaluation; any
    /// of them that were visible report as going invisible.
    pub fn update_remote(
        &mut self,
        registry: &Registry,
        remote: InstanceId,
        destroyed: &[Entity],
    ) -> (Vec<Entity>, Vec<Entity>) {
        let table = self.status.entry(remote).or_default();
        let mut added = Vec::new();
        let mut removed = Vec::new();

        for entity in registry.entities().iter() {
            let old = table.get(&entity).copied().unwrap_or(INVISIBLE);
            let now_visible = (self.rule)(registry, entity, remote);

            let new = (now_visible as u8 & VISIBILITY_BIT)
                | ((((old & VISIBILITY_BIT) != now_visible as u8) as u8) << 1);
            table.insert(entity, new);

            match new {
                BECAME_VISIBLE => added.push(entity),
                BECAME_INVISIBLE => removed.push(entity),
                _ => {}
            }
        }

        for &entity in destroyed {
            if let Some(status) = table.remove(&entity) {
                if status & VISIBILITY_BIT != 0 {
                    removed.push(entity);
                }
            }
        }

        (added, removed)
    }

    /// Returns `true` if the entity is currently visible to the remote.
    #[must_use]
    pub fn is_visible(&self, entity: Entity, remote: InstanceId) -> bool {
        self.status
            .get(&remote)
            .and_then(|table| table.get(&entity))
            .is_some_and(|status| status & VISIBILITY_BIT != 0)
    }

    /// Entities currently visible to the remote.
    #[must_use]
    pub fn visible_entities(&self, remote: InstanceId) -> Vec<Entity> {
        self.status
            .get(&remote)
            .map(|table| {
                table
                    .iter()
                    .filter(|(_, &status)| status & VISIBILITY_BIT != 0)
                    .map(|(&entity, _)| entity)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drops all state for a disconnected remote.
    pub fn forget_remote(&mut self, remote: InstanceId) {
        self.status.remove(&remote);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use voxel_ecs::Component;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Hidden;

    impl Component for Hidden {
        fn type_name() -> &'static str {
            "visibility_test::Hidden"
        }
        const ELUDE_STORAGE: bool = true;
    }

    fn rule_not_hidden() -> VisibilityRule {
        Arc::new(|registry, entity, _remote| !registry.contains::<Hidden>(entity))
    }

    #[test]
    fn test_transitions_are_reported_once() {
        let mut registry = Registry::new();
        let entity = registry.create_entity();
        let remote = uuid::Uuid::new_v4();
        let mut vis = VisibilityState::new(rule_not_hidden());

        let (added, removed) = vis.update_remote(&registry, remote, &[]);
        assert_eq!(added, vec![entity]);
        assert!(removed.is_empty());
        assert!(vis.is_visible(entity, remote));

        // Steady state: no transition.
        let (added, removed) = vis.update_remote(&registry, remote, &[]);
        assert!(added.is_empty());
        assert!(removed.is_empty());

        // Going invisible.
        registry.emplace(entity, Hidden);
        let (added, removed) = vis.update_remote(&registry, remote, &[]);
        assert!(added.is_empty());
        assert_eq!(removed, vec![entity]);
        assert!(!vis.is_visible(entity, remote));

        // Back to visible.
        registry.erase::<Hidden>(entity);
        let (added, _) = vis.update_remote(&registry, remote, &[]);
        assert_eq!(added, vec![entity]);
    }

    #[test]
    fn test_destroyed_entities_report_as_going_invisible() {
        let mut registry = Registry::new();
        let entity = registry.create_entity();
        let remote = uuid::Uuid::new_v4();
        let mut vis = VisibilityState::always_visible();

        vis.update_remote(&registry, remote, &[]);
        assert!(vis.is_visible(entity, remote));

        registry.destroy_entity(entity);
        let (added, removed) = vis.update_remote(&registry, remote, &[entity]);
        assert!(added.is_empty());
        assert_eq!(removed, vec![entity]);
        assert!(!vis.is_visible(entity, remote));
    }

    #[test]
    fn test_remotes_are_independent() {
        let mut registry = Registry::new();
        let entity = registry.create_entity();
        let near = uuid::Uuid::new_v4();
        let far = uuid::Uuid::new_v4();

        let mut vis = VisibilityState::new(Arc::new(move |_, _, remote| remote == near));
        let (added, _) = vis.update_remote(&registry, near, &[]);
        assert_eq!(added, vec![entity]);
        let (added, _) = vis.update_remote(&registry, far, &[]);
        assert!(added.is_empty());

        assert!(vis.is_visible(entity, near));
        assert!(!vis.is_visible(entity, far));
    }
}
