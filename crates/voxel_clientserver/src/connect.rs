//! Wiring instances together.
//!
//! Local wiring pairs two in-process instances through queue-backed
//! connections, bypassing framing and compression. Remote wiring goes
//! through [`Instance::host`] / [`Instance::connect_to`]; the identity
//! exchange and connection installation happen during `update`.

use crate::connection::LocalConnection;
use crate::instance::Instance;

/// Connects a client and a server running within the same process.
///
/// Both endpoints are created with their bootstrap queues engaged, wired,
/// and only then released, so neither side can observe a half-wired pair.
pub fn connect_local(a: &mut Instance, b: &mut Instance) {
    let (mut for_a, mut for_b) = LocalConnection::pair(a.id(), b.id());
    for_a.set_queueing(false);
    for_b.set_queueing(false);
    a.add_connection(Box::new(for_a));
    b.add_connection(Box::new(for_b));
}

/// Disconnects two locally connected instances.
pub fn disconnect_local(a: &mut Instance, b: &mut Instance) {
    let b_id = b.id();
    let a_id = a.id();
    a.disconnect(b_id);
    b.disconnect(a_id);
}
