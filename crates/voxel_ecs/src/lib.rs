//! # voxel_ecs
//!
//! Sparse-set entity-component storage for the voxel engine core.
//!
//! This crate provides:
//!
//! - [`Entity`] — bit-partitioned `u64` identifiers (index / version /
//!   unassigned bits) with a reserved tombstone value.
//! - [`EntityLifetimes`] — ABA-safe creation and destruction with tombstone
//!   recycling.
//! - [`SparseSet`] — dense+sparse entity containers with configurable index
//!   stability and paged sparse tables.
//! - [`Component`] / [`ComponentPool`] — per-type paged storage with
//!   reference-stability and storage-elusion traits.
//! - [`Registry`] — the entity store plus a type-keyed map of pools.
//! - [`query`] / [`View`] — compile-time boolean queries compiled into
//!   iteration plans.
//! - [`CommandBuffer`] — deferred mutations drained at the tick barrier.

pub mod command;
pub mod component;
pub mod entity;
pub mod error;
pub mod lifetime;
pub mod pool;
pub mod query;
pub mod registry;
pub mod sparse_set;
pub mod view;

pub use command::CommandBuffer;
pub use component::{Component, ComponentTypeId};
pub use entity::Entity;
pub use error::EcsError;
pub use lifetime::EntityLifetimes;
pub use pool::{ComponentPool, NoStorageMixin, StorageMixin};
pub use query::{All, And, Has, Not, Nothing, Or, QueryExpr};
pub use registry::{AnyPool, Registry};
pub use sparse_set::{NoMixin, SparseSet, SparseSetMixin};
pub use view::View;
