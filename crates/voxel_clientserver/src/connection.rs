//! Connections between instances.
//!
//! A connection is the per-remote message carrier owned by an instance.
//! Two flavours exist:
//!
//! - [`LocalConnection`] — in-process pairs that move [`Message`] values
//!   directly into the peer's inbound queue, bypassing framing and
//!   compression. A bootstrap queue holds outbound messages until both
//!   endpoints are wired.
//! - [`RemoteConnection`] — backed by a started `voxel_net` session; the
//!   owning instance routes that session's inbound frames into it.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Arc;

use tracing::warn;
use voxel_net::{Message, Session, SessionId};

use crate::instance::InstanceId;

/// A per-remote message carrier.
pub trait Connection: Send {
    /// The remote instance's ID.
    fn remote_id(&self) -> InstanceId;

    /// Queues a message for the remote.
    fn send_message(&mut self, message: Message);

    /// Removes and returns every message received since the last drain, in
    /// arrival order.
    fn drain_inbound(&mut self) -> Vec<Message>;

    /// Hands the carrier an already-parsed inbound message. Only
    /// session-backed carriers use this; for local pairs delivery happens
    /// through the channel instead.
    fn push_inbound(&mut self, _message: Message) {}

    /// Returns `false` once the carrier can no longer deliver.
    fn is_open(&self) -> bool;
}

/// In-process connection endpoint.
pub struct LocalConnection {
    remote: InstanceId,
    outbound: mpsc::Sender<Message>,
    inbound: mpsc::Receiver<Message>,
    /// Bootstrap buffer used while the pair is still being wired.
    queued: Vec<Message>,
    queueing: bool,
}

impl LocalConnection {
    /// Creates a wired pair of endpoints with bootstrap queueing enabled.
    /// Callers finish wiring both sides, then call
    /// [`set_queueing`](Self::set_queueing)`(false)` on each.
    #[must_use]
    pub fn pair(a: InstanceId, b: InstanceId) -> (LocalConnection, LocalConnection) {
        let (a_to_b, b_from_a) = mpsc::channel();
        let (b_to_a, a_from_b) = mpsc::channel();

        (
            LocalConnection {
                remote: b,
                outbound: a_to_b,
                inbound: a_from_b,
                queued: Vec::new(),
                queueing: true,
            },
            LocalConnection {
                remote: a,
                outbound: b_to_a,
                inbound: b_from_a,
                queued: Vec::new(),
                queueing: true,
            },
        )
    }

    /// Toggles the bootstrap queue. Disabling flushes everything held.
    pub fn set_queueing(&mut self, queueing: bool) {
        self.queueing = queueing;
        if !queueing {
            for message in self.queued.drain(..) {
                let _ = self.outbound.send(message);
            }
        }
    }
}

impl Connection for LocalConnection {
    fn remote_id(&self) -> InstanceId {
        self.remote
    }

    fn send_message(&mut self, message: Message) {
        if self.queueing {
            self.queued.push(message);
        } else if self.outbound.send(message).is_err() {
            warn!(remote = %self.remote, "local peer dropped; message lost");
        }
    }

    fn drain_inbound(&mut self) -> Vec<Message> {
        self.inbound.try_iter().collect()
    }

    fn is_open(&self) -> bool {
        true
    }
}

/// Session-backed connection endpoint.
pub struct RemoteConnection {
    remote: InstanceId,
    session: Arc<Session>,
    inbound: VecDeque<Message>,
}

impl RemoteConnection {
    /// Wraps a started session whose peer identity is already known.
    #[must_use]
    pub fn new(remote: InstanceId, session: Arc<Session>) -> Self {
        Self {
            remote,
            session,
            inbound: VecDeque::new(),
        }
    }

    /// The backing session's ID, used to route inbound session events.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }
}

impl Connection for RemoteConnection {
    fn remote_id(&self) -> InstanceId {
        self.remote
    }

    fn send_message(&mut self, message: Message) {
        self.session.write(message.to_bytes());
    }

    fn drain_inbound(&mut self) -> Vec<Message> {
        self.inbound.drain(..).collect()
    }

    fn push_inbound(&mut self, message: Message) {
        self.inbound.push_back(message);
    }

    fn is_open(&self) -> bool {
        self.session.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel_net::kind;

    fn message(n: u32) -> Message {
        Message::new(kind::USER_START, &n).unwrap()
    }

    #[test]
    fn test_local_pair_moves_messages() {
        let a_id = uuid::Uuid::new_v4();
        let b_id = uuid::Uuid::new_v4();
        let (mut a, mut b) = LocalConnection::pair(a_id, b_id);
        a.set_queueing(false);
        b.set_queueing(false);

        assert_eq!(a.remote_id(), b_id);
        assert_eq!(b.remote_id(), a_id);

        a.send_message(message(1));
        a.send_message(message(2));
        let received = b.drain_inbound();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].decode_body::<u32>().unwrap(), 1);
        assert_eq!(received[1].decode_body::<u32>().unwrap(), 2);
        assert!(b.drain_inbound().is_empty());
    }

    #[test]
    fn test_bootstrap_queue_holds_until_released() {
        let (mut a, mut b) = LocalConnection::pair(uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
        b.set_queueing(false);

        a.send_message(message(7));
        assert!(b.drain_inbound().is_empty());

        a.set_queueing(false);
        let received = b.drain_inbound();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].decode_body::<u32>().unwrap(), 7);
    }
}
