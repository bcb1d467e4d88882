//! Framed stream sessions.
//!
//! A session owns a TCP stream split between two tasks on the owning
//! runtime: a writer task that drains the outgoing queue (writes may
//! originate from any thread, but only this task touches the socket) and a
//! reader task that parses frames strictly sequentially: header, payload,
//! enqueue, next header.
//!
//! Sessions never restart: `created → started → ended`. Any socket error
//! emits `Error` followed by `Ended` exactly once and the session becomes
//! unusable. Lifecycle and message events accumulate in an [`EventQueue`]
//! the owner drains on its own thread each tick, preserving wire order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::compress::{compress, decompress};
use crate::error::{NetError, SessionErrorKind};
use crate::varint;

/// Monotonic session identifier, unique within the process.
pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Session parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound for message sizes in both directions, checked against
    /// the frame header and again while inflating.
    pub message_size_limit: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            message_size_limit: 16 * 1024 * 1024,
        }
    }
}

/// Lifecycle and message events emitted by sessions.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session started.
    Started(SessionId),
    /// A complete message arrived; payload is decompressed message bytes.
    MessageReceived(SessionId, Vec<u8>),
    /// The session failed; always followed by `Ended`.
    Error(SessionId, SessionErrorKind),
    /// The session ended; no further I/O occurs.
    Ended(SessionId),
}

/// Ordered queue of session events, drained by the owner on its thread.
#[derive(Default)]
pub struct EventQueue {
    events: Mutex<VecDeque<SessionEvent>>,
}

impl EventQueue {
    /// Appends an event.
    pub fn push(&self, event: SessionEvent) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.push_back(event);
    }

    /// Removes and returns all pending events in arrival order.
    pub fn drain(&self) -> Vec<SessionEvent> {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.drain(..).collect()
    }

    /// Returns `true` if no events are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.is_empty()
    }
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed but not yet running.
    Created,
    /// Reader and writer tasks are running.
    Started,
    /// Closed; cannot restart.
    Ended,
}

const STATE_CREATED: u8 = 0;
const STATE_STARTED: u8 = 1;
const STATE_ENDED: u8 = 2;

struct Shared {
    id: SessionId,
    state: AtomicU8,
    queue: Arc<EventQueue>,
    config: SessionConfig,
}

impl Shared {
    /// Transitions to `Ended` with an error, emitting `Error` then `Ended`
    /// exactly once.
    fn fail(&self, kind: SessionErrorKind) {
        if self.state.swap(STATE_ENDED, Ordering::AcqRel) != STATE_ENDED {
            self.queue.push(SessionEvent::Error(self.id, kind));
            self.queue.push(SessionEvent::Ended(self.id));
        }
    }

    /// Transitions to `Ended` cleanly, emitting `Ended` exactly once.
    fn finish(&self) {
        if self.state.swap(STATE_ENDED, Ordering::AcqRel) != STATE_ENDED {
            self.queue.push(SessionEvent::Ended(self.id));
        }
    }
}

/// One framed, compressed stream connection.
pub struct Session {
    shared: Arc<Shared>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Session {
    /// Starts a session over a connected stream. The reader and writer
    /// tasks run on the given runtime; events land in `queue`.
    pub fn start(
        handle: &tokio::runtime::Handle,
        stream: TcpStream,
        queue: Arc<EventQueue>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(Shared {
            id,
            state: AtomicU8::new(STATE_STARTED),
            queue,
            config,
        });
        shared.queue.push(SessionEvent::Started(id));

        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();

        let tasks = vec![
            handle.spawn(write_loop(rx, writer, shared.clone())),
            handle.spawn(read_loop(reader, shared.clone())),
        ];

        Arc::new(Self {
            shared,
            outgoing: Mutex::new(Some(tx)),
            tasks: Mutex::new(tasks),
        })
    }

    /// The session's monotonic ID.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        match self.shared.state.load(Ordering::Acquire) {
            STATE_CREATED => SessionState::Created,
            STATE_STARTED => SessionState::Started,
            _ => SessionState::Ended,
        }
    }

    /// Returns `true` until the session has ended.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() != SessionState::Ended
    }

    /// Queues message bytes for transmission. May be called from any
    /// thread; the writer task serializes the actual I/O. Writes against an
    /// ended session emit `Error(NotConnected)` instead of transmitting.
    pub fn write(&self, message: Vec<u8>) {
        let outgoing = self.outgoing.lock().unwrap_or_else(|e| e.into_inner());
        let accepted = match outgoing.as_ref() {
            Some(tx) if self.is_open() => tx.send(message).is_ok(),
            _ => false,
        };
        if !accepted {
            self.shared
                .queue
                .push(SessionEvent::Error(self.shared.id, SessionErrorKind::NotConnected));
        }
    }

    /// Stops the session: pending queued writes are dropped, the socket
    /// closes and `Ended` is emitted. Idempotent; sessions cannot restart.
    pub fn stop(&self) {
        {
            let mut outgoing = self.outgoing.lock().unwrap_or_else(|e| e.into_inner());
            outgoing.take();
        }
        self.shared.finish();
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for task in tasks.iter() {
            task.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_frame(message: &[u8]) -> Result<Vec<u8>, NetError> {
    let payload = compress(message)?;
    let mut frame = Vec::with_capacity(varint::MAX_HEADER_LEN + payload.len());
    varint::encode_header(payload.len() as u64, &mut frame);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

async fn write_loop(
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut writer: OwnedWriteHalf,
    shared: Arc<Shared>,
) {
    while let Some(message) = rx.recv().await {
        if shared.state.load(Ordering::Acquire) == STATE_ENDED {
            shared
                .queue
                .push(SessionEvent::Error(shared.id, SessionErrorKind::NotConnected));
            continue;
        }

        let frame = match build_frame(&message) {
            Ok(frame) => frame,
            Err(error) => {
                shared.fail(SessionErrorKind::of(&error));
                return;
            }
        };

        if writer.write_all(&frame).await.is_err() {
            shared.fail(SessionErrorKind::Io);
            return;
        }
        debug!(session = shared.id, bytes = frame.len(), "frame sent");
    }

    // All senders gone: the session is stopping. Flush the socket.
    let _ = writer.shutdown().await;
}

async fn read_loop(mut reader: OwnedReadHalf, shared: Arc<Shared>) {
    loop {
        // Header: accumulate until the terminator byte.
        let mut header = Vec::with_capacity(varint::MAX_HEADER_LEN);
        loop {
            match reader.read_u8().await {
                Ok(byte) => {
                    header.push(byte);
                    if varint::header_complete(&header) {
                        break;
                    }
                    if header.len() >= varint::MAX_HEADER_LEN {
                        shared.fail(SessionErrorKind::MalformedFrame);
                        return;
                    }
                }
                Err(error) => {
                    // EOF between frames is a clean close; EOF inside a
                    // header is not.
                    if header.is_empty()
                        && error.kind() == std::io::ErrorKind::UnexpectedEof
                    {
                        shared.finish();
                    } else {
                        shared.fail(SessionErrorKind::Io);
                    }
                    return;
                }
            }
        }

        let size = match varint::decode_header(&header) {
            Ok(size) => size,
            Err(_) => {
                shared.fail(SessionErrorKind::MalformedFrame);
                return;
            }
        };
        if size > shared.config.message_size_limit {
            shared.fail(SessionErrorKind::MessageSize);
            return;
        }

        let mut payload = vec![0u8; size as usize];
        if reader.read_exact(&mut payload).await.is_err() {
            shared.fail(SessionErrorKind::Io);
            return;
        }

        match decompress(&payload, shared.config.message_size_limit) {
            Ok(message) => {
                debug!(session = shared.id, bytes = message.len(), "message received");
                shared
                    .queue
                    .push(SessionEvent::MessageReceived(shared.id, message));
            }
            Err(error) => {
                shared.fail(SessionErrorKind::of(&error));
                return;
            }
        }
    }
}
