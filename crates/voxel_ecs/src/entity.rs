//! Entity identifiers.
//!
//! An [`Entity`] is a `u64` partitioned into three bit-fields: a 32-bit
//! `index`, a 24-bit `version` and 8 `unassigned` bits. The index addresses
//! dense storage, the version makes recycled indices ABA-safe, and the
//! unassigned bits are a small per-entity payload the engine itself never
//! interprets.

use serde::{Deserialize, Serialize};

/// Number of bits used for the entity index.
pub const INDEX_BITS: u32 = 32;
/// Number of bits used for the entity version.
pub const VERSION_BITS: u32 = 24;
/// Number of bits left unassigned for user payloads.
pub const UNASSIGNED_BITS: u32 = 8;

/// Mask covering the index field (low bits).
pub const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;
/// Mask covering the version field.
pub const VERSION_MASK: u64 = ((1 << VERSION_BITS) - 1) << INDEX_BITS;
/// Mask covering the unassigned bits (high bits).
pub const UNASSIGNED_MASK: u64 = !(INDEX_MASK | VERSION_MASK);

/// A bit-partitioned entity identifier.
///
/// Entities are pure identifiers; components attached through a registry
/// give them meaning. The all-ones index is reserved for [`Entity::TOMBSTONE`]
/// and is never allocated.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(u64);

impl Entity {
    /// Reserved value marking a vacated dense slot in an index-stable set.
    pub const TOMBSTONE: Entity = Entity(INDEX_MASK);

    /// Builds an entity from its raw bit pattern.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Builds an entity from its three fields. Each field is masked to its
    /// own width before being shifted into place.
    #[must_use]
    pub const fn from_parts(index: u64, version: u64, unassigned: u64) -> Self {
        Self(
            (index & INDEX_MASK)
                | ((version << INDEX_BITS) & VERSION_MASK)
                | ((unassigned << (INDEX_BITS + VERSION_BITS)) & UNASSIGNED_MASK),
        )
    }

    /// Returns the raw bit pattern.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns the index field.
    #[must_use]
    pub const fn index(self) -> u64 {
        self.0 & INDEX_MASK
    }

    /// Returns the version field, shifted down to a plain counter.
    #[must_use]
    pub const fn version(self) -> u64 {
        (self.0 & VERSION_MASK) >> INDEX_BITS
    }

    /// Returns the unassigned bits, shifted down to a plain value.
    #[must_use]
    pub const fn unassigned_bits(self) -> u64 {
        (self.0 & UNASSIGNED_MASK) >> (INDEX_BITS + VERSION_BITS)
    }

    /// Returns a copy of this entity with the version field replaced.
    #[must_use]
    pub const fn with_version(self, version: u64) -> Self {
        Self((self.0 & !VERSION_MASK) | ((version << INDEX_BITS) & VERSION_MASK))
    }

    /// Returns a copy of this entity with the unassigned bits replaced.
    #[must_use]
    pub const fn with_unassigned_bits(self, bits: u64) -> Self {
        Self((self.0 & !UNASSIGNED_MASK) | ((bits << (INDEX_BITS + VERSION_BITS)) & UNASSIGNED_MASK))
    }

    /// Returns this entity with the version incremented (wrapping within the
    /// field width) and the unassigned bits cleared.
    ///
    /// Tombstones store the next version so that recycled indices always
    /// compare greater than any previously issued ID at the same index.
    #[must_use]
    pub const fn next_version(self) -> Self {
        let bumped = (self.version() + 1) & (VERSION_MASK >> INDEX_BITS);
        Self(self.index() | (bumped << INDEX_BITS))
    }

    /// Returns `true` if this is the reserved tombstone index.
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.index() == INDEX_MASK
    }

    /// Default match: equal index and version, unassigned bits ignored.
    #[must_use]
    pub const fn matches(self, other: Entity) -> bool {
        (self.0 & (INDEX_MASK | VERSION_MASK)) == (other.0 & (INDEX_MASK | VERSION_MASK))
    }

    /// Exact match: equal full bit pattern.
    #[must_use]
    pub const fn matches_exact(self, other: Entity) -> bool {
        self.0 == other.0
    }

    /// Any-version match: equal index only.
    #[must_use]
    pub const fn same_index(self, other: Entity) -> bool {
        self.index() == other.index()
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_tombstone() {
            write!(f, "Entity(tombstone)")
        } else {
            write!(f, "Entity({}v{})", self.index(), self.version())
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_roundtrip() {
        let e = Entity::from_parts(42, 7, 3);
        assert_eq!(e.index(), 42);
        assert_eq!(e.version(), 7);
        assert_eq!(e.unassigned_bits(), 3);
    }

    #[test]
    fn test_fields_do_not_overlap() {
        let e = Entity::from_parts(u64::MAX, u64::MAX, u64::MAX);
        assert_eq!(e.index(), INDEX_MASK);
        assert_eq!(e.version(), (1 << VERSION_BITS) - 1);
        assert_eq!(e.unassigned_bits(), (1 << UNASSIGNED_BITS) - 1);
        assert_eq!(e.bits(), u64::MAX);
    }

    #[test]
    fn test_next_version_clears_unassigned_bits() {
        let e = Entity::from_parts(9, 1, 0xFF);
        let next = e.next_version();
        assert_eq!(next.index(), 9);
        assert_eq!(next.version(), 2);
        assert_eq!(next.unassigned_bits(), 0);
    }

    #[test]
    fn test_next_version_wraps_within_field() {
        let e = Entity::from_parts(1, (1 << VERSION_BITS) - 1, 0);
        assert_eq!(e.next_version().version(), 0);
        assert_eq!(e.next_version().index(), 1);
    }

    #[test]
    fn test_match_modes() {
        let a = Entity::from_parts(5, 2, 0);
        let b = Entity::from_parts(5, 2, 9);
        let c = Entity::from_parts(5, 3, 0);

        assert!(a.matches(b));
        assert!(!a.matches_exact(b));
        assert!(!a.matches(c));
        assert!(a.same_index(c));
    }

    #[test]
    fn test_tombstone_is_reserved() {
        assert!(Entity::TOMBSTONE.is_tombstone());
        assert!(Entity::from_parts(INDEX_MASK, 3, 1).is_tombstone());
        assert!(!Entity::from_parts(0, 0, 0).is_tombstone());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let e = Entity::from_parts(123, 4, 1);
        let bytes = rmp_serde::to_vec(&e).unwrap();
        let restored: Entity = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(e, restored);
    }
}
