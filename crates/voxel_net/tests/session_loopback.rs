//! Session transport over a real TCP loopback.

use std::time::{Duration, Instant};

use voxel_net::{
    kind, Message, SessionConfig, SessionErrorKind, SessionEvent, SessionState, SocketClient,
    SocketServer,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `update` until `predicate` finds a match among the accumulated
/// events.
fn wait_for<T>(
    update: impl Fn() -> Vec<SessionEvent>,
    mut predicate: impl FnMut(&SessionEvent) -> Option<T>,
) -> T {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        for event in update() {
            if let Some(found) = predicate(&event) {
                return found;
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for event");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_message_roundtrip_over_tcp() {
    init_tracing();
    let server = SocketServer::start("127.0.0.1:0", SessionConfig::default()).unwrap();
    let addr = server.local_addr().to_string();
    let client = SocketClient::connect(&addr, SessionConfig::default()).unwrap();

    // Both sides observe their session start.
    let server_session = wait_for(
        || server.update(),
        |event| match event {
            SessionEvent::Started(id) => Some(*id),
            _ => None,
        },
    );
    wait_for(
        || client.update(),
        |event| match event {
            SessionEvent::Started(id) => Some(*id),
            _ => None,
        },
    );

    // Client → server.
    let hello = Message::new(kind::IGNORE, &"hello from the client").unwrap();
    client.write(hello.to_bytes());
    let received = wait_for(
        || server.update(),
        |event| match event {
            SessionEvent::MessageReceived(_, bytes) => Some(bytes.clone()),
            _ => None,
        },
    );
    let received = Message::from_bytes(&received).unwrap();
    assert_eq!(received, hello);
    assert_eq!(
        received.decode_body::<String>().unwrap(),
        "hello from the client"
    );

    // Server → client, a large compressible payload.
    let payload: Vec<u64> = (0..50_000).collect();
    let big = Message::new(kind::USER_START, &payload).unwrap();
    assert!(server.write(server_session, big.to_bytes()));
    let received = wait_for(
        || client.update(),
        |event| match event {
            SessionEvent::MessageReceived(_, bytes) => Some(bytes.clone()),
            _ => None,
        },
    );
    let received = Message::from_bytes(&received).unwrap();
    assert_eq!(received.decode_body::<Vec<u64>>().unwrap(), payload);

    // Clean shutdown: the server observes the close as a session end with
    // no error.
    client.stop();
    assert_eq!(client.session().state(), SessionState::Ended);
    wait_for(
        || server.update(),
        |event| match event {
            SessionEvent::Ended(_) => Some(()),
            SessionEvent::Error(_, kind) => panic!("unexpected error: {kind:?}"),
            _ => None,
        },
    );
}

#[test]
fn test_ordering_is_preserved() {
    init_tracing();
    let server = SocketServer::start("127.0.0.1:0", SessionConfig::default()).unwrap();
    let addr = server.local_addr().to_string();
    let client = SocketClient::connect(&addr, SessionConfig::default()).unwrap();

    for n in 0u32..100 {
        client.write(Message::new(kind::USER_START, &n).unwrap().to_bytes());
    }

    let deadline = Instant::now() + TIMEOUT;
    let mut seen = Vec::new();
    while seen.len() < 100 {
        for event in server.update() {
            if let SessionEvent::MessageReceived(_, bytes) = event {
                seen.push(
                    Message::from_bytes(&bytes)
                        .unwrap()
                        .decode_body::<u32>()
                        .unwrap(),
                );
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for messages");
        std::thread::sleep(Duration::from_millis(2));
    }
    let expected: Vec<u32> = (0..100).collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_oversized_message_tears_down_session() {
    init_tracing();
    // The server only accepts tiny messages.
    let server = SocketServer::start(
        "127.0.0.1:0",
        SessionConfig {
            message_size_limit: 256,
        },
    )
    .unwrap();
    let addr = server.local_addr().to_string();
    let client = SocketClient::connect(&addr, SessionConfig::default()).unwrap();

    // Incompressible payload so the compressed frame also exceeds 256
    // bytes.
    let noise: Vec<u8> = (0..4096u32)
        .map(|i| (i.wrapping_mul(2_654_435_761) >> 11) as u8)
        .collect();
    client.write(Message::new(kind::USER_START, &noise).unwrap().to_bytes());

    // The error and the end may land in the same drained batch; collect
    // until the session ends and check the sequence afterwards.
    let deadline = Instant::now() + TIMEOUT;
    let mut errors = Vec::new();
    let mut ended = false;
    while !ended {
        for event in server.update() {
            match event {
                SessionEvent::Error(_, kind) => errors.push(kind),
                SessionEvent::Ended(_) => ended = true,
                _ => {}
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for teardown");
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(errors, vec![SessionErrorKind::MessageSize]);
}

#[test]
fn test_write_after_stop_reports_not_connected() {
    init_tracing();
    let server = SocketServer::start("127.0.0.1:0", SessionConfig::default()).unwrap();
    let addr = server.local_addr().to_string();
    let client = SocketClient::connect(&addr, SessionConfig::default()).unwrap();

    client.stop();
    client.write(vec![1, 2, 3]);

    let error = wait_for(
        || client.update(),
        |event| match event {
            SessionEvent::Error(_, kind) => Some(*kind),
            _ => None,
        },
    );
    assert_eq!(error, SessionErrorKind::NotConnected);
}
