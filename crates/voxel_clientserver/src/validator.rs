//! The change validator: policy for inbound component edits.
//!
//! On an authoritative instance every inbound `SET_COMPONENT` is classified
//! per `(component type, source remote)`:
//!
//! - `Allowed` — apply the edit, send nothing back;
//! - `Forbidden` — drop the edit and reply `UNDO_COMPONENT` with the
//!   authoritative value so the originator reverts its optimistic edit;
//! - `Ignored` — drop silently. The default, so unprivileged clients learn
//!   nothing about state they cannot see.

use std::collections::HashMap;

use voxel_ecs::ComponentTypeId;

use crate::instance::InstanceId;

/// Verdict for one inbound component edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeResult {
    /// Apply; do not respond.
    Allowed,
    /// Do not apply; respond with the authoritative value.
    Forbidden,
    /// Do not apply; do not respond.
    #[default]
    Ignored,
}

/// Registry-wide edit policy, most specific rule wins.
#[derive(Debug, Default)]
pub struct ChangeValidator {
    default: ChangeResult,
    per_component: HashMap<ComponentTypeId, ChangeResult>,
    per_pair: HashMap<(ComponentTypeId, InstanceId), ChangeResult>,
}

impl ChangeValidator {
    /// Creates a validator that ignores everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies an inbound edit: per-(component, remote) override first,
    /// then per-component, then the default.
    #[must_use]
    pub fn check(&self, component: ComponentTypeId, remote: InstanceId) -> ChangeResult {
        if let Some(&result) = self.per_pair.get(&(component, remote)) {
            return result;
        }
        if let Some(&result) = self.per_component.get(&component) {
            return result;
        }
        self.default
    }

    /// Sets the fallback verdict.
    pub fn set_default(&mut self, result: ChangeResult) {
        self.default = result;
    }

    /// Sets the verdict for one component type, any remote.
    pub fn set_for_component(&mut self, component: ComponentTypeId, result: ChangeResult) {
        self.per_component.insert(component, result);
    }

    /// Sets the verdict for one component type from one remote.
    pub fn set_for_component_from(
        &mut self,
        component: ComponentTypeId,
        remote: InstanceId,
        result: ChangeResult,
    ) {
        self.per_pair.insert((component, remote), result);
    }

    /// Applies one verdict to a whole set of component types, as used to
    /// mark every synchronized component at once.
    pub fn set_for_components(&mut self, components: &[ComponentTypeId], result: ChangeResult) {
        for &component in components {
            self.set_for_component(component, result);
        }
    }
}
