//! Core [`Component`] trait and type identifiers.
//!
//! Every piece of data stored in a registry implements [`Component`]. The
//! trait requires `Send + Sync + 'static` so components can cross thread and
//! network boundaries, serde bounds for wire transport, and `Default` so
//! remote mirrors and eluded sentinels can be constructed without a value.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A stable identifier for a component type.
///
/// The ID is an FNV-1a hash of [`Component::type_name`], so it is identical
/// across processes and builds and can travel on the wire. Rust's `TypeId`
/// deliberately is not used: its bits are not stable across compiler
/// versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, serde::Deserialize)]
pub struct ComponentTypeId(pub u64);

impl ComponentTypeId {
    /// Computes the ID for a concrete component type.
    #[must_use]
    pub fn of<C: Component>() -> Self {
        Self::from_name(C::type_name())
    }

    /// Hashes an arbitrary name into the ID space.
    ///
    /// Besides component types this is used for well-known pseudo-access
    /// markers (entity lifecycle, connection table) that participate in the
    /// scheduler's conflict rule without backing storage.
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        Self(fnv1a_64(name))
    }
}

/// FNV-1a over a name, the hash behind every stable wire-visible type ID.
#[must_use]
pub const fn fnv1a_64(name: &str) -> u64 {
    let bytes = name.as_bytes();
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        i += 1;
    }
    hash
}

/// The component contract.
///
/// The associated constants are the storage traits of the type:
///
/// - [`REFERENCE_STABILITY`](Component::REFERENCE_STABILITY) — if `true`,
///   a component's address never changes between its insertion and its
///   erasure. The pool pairs an index-stable entity set with paged slots
///   that are never relocated.
/// - [`ELUDE_STORAGE`](Component::ELUDE_STORAGE) — if `true`, no per-entity
///   values are stored; reads return a shared sentinel. Only valid for
///   zero-sized types (checked at pool construction in debug builds).
/// - [`PAGE_SIZE`](Component::PAGE_SIZE) — slots per storage page; must be a
///   power of two.
///
/// # Examples
///
/// ```rust
/// use serde::{Serialize, Deserialize};
/// use voxel_ecs::Component;
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {
///     fn type_name() -> &'static str { "Health" }
/// }
/// ```
pub trait Component:
    Send + Sync + Default + Serialize + DeserializeOwned + 'static
{
    /// A human-readable, process-independent name for this component type.
    fn type_name() -> &'static str;

    /// Component addresses survive all storage mutations until erase.
    const REFERENCE_STABILITY: bool = false;

    /// Store no values; serve reads from a shared sentinel.
    const ELUDE_STORAGE: bool = false;

    /// Slots per storage page. Must be a power of two.
    const PAGE_SIZE: usize = 1024;

    /// Returns the [`ComponentTypeId`] for this component type.
    #[must_use]
    fn component_type_id() -> ComponentTypeId {
        ComponentTypeId::of::<Self>()
    }
}
