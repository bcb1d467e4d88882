//! Socket endpoints owning their runtime.
//!
//! [`SocketServer`] and [`SocketClient`] wrap a small background tokio
//! runtime so the rest of the engine keeps its synchronous tick surface:
//! `start`/`connect`, `write`, `update` (drain events on the calling
//! thread) and `stop`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::error::NetError;
use crate::session::{EventQueue, Session, SessionConfig, SessionEvent, SessionId};

fn build_runtime() -> Result<tokio::runtime::Runtime, NetError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    Ok(runtime)
}

/// Accepts inbound sessions on a bound address.
pub struct SocketServer {
    /// Kept alive for the lifetime of the server; dropping it stops every
    /// session task.
    _runtime: tokio::runtime::Runtime,
    queue: Arc<EventQueue>,
    sessions: Arc<Mutex<HashMap<SessionId, Arc<Session>>>>,
    local_addr: SocketAddr,
    accept_task: tokio::task::JoinHandle<()>,
}

impl SocketServer {
    /// Binds `addr` and starts accepting connections. Each accepted
    /// connection becomes a started [`Session`] whose events land in this
    /// server's queue.
    pub fn start(addr: &str, config: SessionConfig) -> Result<Self, NetError> {
        let runtime = build_runtime()?;
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let queue = Arc::new(EventQueue::default());
        let sessions: Arc<Mutex<HashMap<SessionId, Arc<Session>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let accept_task = {
            let queue = queue.clone();
            let sessions = sessions.clone();
            runtime.spawn(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(listener) => listener,
                    Err(error) => {
                        warn!(error = %error, "failed to register listener");
                        return;
                    }
                };
                info!(addr = %local_addr, "listening");

                loop {
                    match listener.accept().await {
                        Ok((stream, peer)) => {
                            let _ = stream.set_nodelay(true);
                            let session = Session::start(
                                &tokio::runtime::Handle::current(),
                                stream,
                                queue.clone(),
                                config.clone(),
                            );
                            info!(%peer, session = session.id(), "session accepted");
                            let mut sessions =
                                sessions.lock().unwrap_or_else(|e| e.into_inner());
                            sessions.insert(session.id(), session);
                        }
                        Err(error) => {
                            warn!(error = %error, "accept failed");
                        }
                    }
                }
            })
        };

        Ok(Self {
            _runtime: runtime,
            queue,
            sessions,
            local_addr,
            accept_task,
        })
    }

    /// The bound address (useful with port 0).
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Drains pending session events in arrival order. Ended sessions are
    /// dropped from the session table.
    pub fn update(&self) -> Vec<SessionEvent> {
        let events = self.queue.drain();
        for event in &events {
            if let SessionEvent::Ended(id) = event {
                let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
                sessions.remove(id);
            }
        }
        events
    }

    /// Looks up an active session.
    #[must_use]
    pub fn session(&self, id: SessionId) -> Option<Arc<Session>> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(&id).cloned()
    }

    /// Queues message bytes on one session. Returns whether the session
    /// exists.
    pub fn write(&self, id: SessionId, message: Vec<u8>) -> bool {
        match self.session(id) {
            Some(session) => {
                session.write(message);
                true
            }
            None => false,
        }
    }

    /// Stops accepting and ends every session.
    pub fn stop(&self) {
        self.accept_task.abort();
        let sessions: Vec<_> = {
            let mut table = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            table.drain().map(|(_, s)| s).collect()
        };
        for session in sessions {
            session.stop();
        }
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A single outbound session.
pub struct SocketClient {
    /// Kept alive for the lifetime of the client; dropping it stops the
    /// session tasks.
    _runtime: tokio::runtime::Runtime,
    queue: Arc<EventQueue>,
    session: Arc<Session>,
}

impl SocketClient {
    /// Connects to a server and starts the session.
    pub fn connect(addr: &str, config: SessionConfig) -> Result<Self, NetError> {
        let runtime = build_runtime()?;
        let stream = runtime.block_on(TcpStream::connect(addr))?;
        let _ = stream.set_nodelay(true);

        let queue = Arc::new(EventQueue::default());
        let session = Session::start(runtime.handle(), stream, queue.clone(), config);
        info!(%addr, session = session.id(), "connected");

        Ok(Self {
            _runtime: runtime,
            queue,
            session,
        })
    }

    /// The client's session.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Queues message bytes for transmission.
    pub fn write(&self, message: Vec<u8>) {
        self.session.write(message);
    }

    /// Drains pending session events in arrival order.
    pub fn update(&self) -> Vec<SessionEvent> {
        self.queue.drain()
    }

    /// Ends the session.
    pub fn stop(&self) {
        self.session.stop();
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.stop();
    }
}
