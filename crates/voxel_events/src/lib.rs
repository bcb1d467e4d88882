//! # voxel_events
//!
//! Typed event dispatch for the voxel engine core.
//!
//! Two variants:
//!
//! - [`EventDispatcher`] — immediate: `dispatch` runs all handlers for the
//!   event synchronously, in descending priority order; the cancellable
//!   entry point stops at the first handler returning
//!   [`EventOutcome::Stop`].
//! - [`DelayedEventDispatcher`] — buffered: `enqueue` stores events,
//!   `dispatch_pending` drains them on the owning thread.
//!
//! Handler insertion and removal from inside a running handler are legal
//! and take effect once the current dispatch finishes; re-entrant dispatch
//! runs nested to completion.

pub mod delayed;
pub mod immediate;

pub use delayed::DelayedEventDispatcher;
pub use immediate::{EventDispatcher, EventOutcome, HandlerId};
