#![cfg(unix)]

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use framelink_conn::{
    CloseCode, CloseFrame, ConnConfig, MessageConnection, MessageWrite, StreamConnection,
};
use framelink_transport::{
    ConnectionErrorKind, Context, Transport, TransportError, TransportState,
};

fn transport_pair() -> (Transport, Transport) {
    let (left, right) = StreamConnection::pair().expect("socket pair should open");
    (
        Transport::new(left).expect("left transport should wrap"),
        Transport::new(right).expect("right transport should wrap"),
    )
}

#[test]
fn concurrent_senders_deliver_every_frame_intact() {
    const SENDERS: usize = 8;
    const PER_SENDER: usize = 200;

    let (left, right) = transport_pair();
    let left = Arc::new(left);
    let start = Arc::new(Barrier::new(SENDERS));

    let senders: Vec<_> = (0..SENDERS)
        .map(|id| {
            let left = Arc::clone(&left);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for seq in 0..PER_SENDER {
                    let payload = format!("{id}:{seq}:{}", "x".repeat(seq % 64));
                    left.send(&Context::background(), &format!("sender-{id}"), payload.as_bytes())
                        .expect("concurrent send should succeed");
                }
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for _ in 0..SENDERS * PER_SENDER {
        let message = right
            .receive(&Context::background())
            .expect("every frame should decode");
        let payload = std::str::from_utf8(&message.payload).expect("payload should be utf-8");
        let mut parts = payload.splitn(3, ':');
        let id: usize = parts.next().and_then(|s| s.parse().ok()).expect("sender id");
        let seq: usize = parts.next().and_then(|s| s.parse().ok()).expect("sequence");
        assert_eq!(message.msg_type, format!("sender-{id}"));
        assert_eq!(parts.next().map(str::len), Some(seq % 64));
        assert!(seen.insert((id, seq)), "duplicate frame {id}:{seq}");
    }

    for sender in senders {
        sender.join().expect("sender thread should finish");
    }
    assert_eq!(seen.len(), SENDERS * PER_SENDER);
}

#[test]
fn blocked_receive_does_not_block_send() {
    let (left, right) = transport_pair();
    let left = Arc::new(left);

    let receiver = {
        let left = Arc::clone(&left);
        thread::spawn(move || left.receive(&Context::background()))
    };
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    left.send(&Context::background(), "ping", b"while blocked")
        .expect("send should not wait on the blocked receiver");
    assert!(started.elapsed() < Duration::from_secs(1));

    let ping = right
        .receive(&Context::background())
        .expect("peer should get the ping");
    assert_eq!(ping.payload.as_ref(), b"while blocked");

    right
        .send(&Context::background(), "pong", b"")
        .expect("reply should send");
    let pong = receiver
        .join()
        .expect("receiver thread should finish")
        .expect("blocked receive should complete");
    assert_eq!(pong.msg_type, "pong");
}

#[test]
fn blocked_send_does_not_block_receive() {
    const CHUNK: usize = 1024 * 1024;
    const CHUNKS: usize = 32;

    let (left, right) = transport_pair();
    let left = Arc::new(left);
    let right = Arc::new(right);

    // Nobody drains `right` yet, so this fills the socket buffers and blocks.
    let sender = {
        let left = Arc::clone(&left);
        thread::spawn(move || {
            let chunk = vec![0x5a; CHUNK];
            for _ in 0..CHUNKS {
                left.send(&Context::background(), "bulk", &chunk)
                    .expect("bulk send should eventually complete");
            }
        })
    };
    thread::sleep(Duration::from_millis(100));
    assert!(!sender.is_finished(), "sender should be blocked on a full buffer");

    right
        .send(&Context::background(), "ping", b"")
        .expect("reverse send should succeed");
    let ping = left
        .receive(&Context::background())
        .expect("receive should not wait on the blocked sender");
    assert_eq!(ping.msg_type, "ping");

    for _ in 0..CHUNKS {
        let bulk = right
            .receive(&Context::background())
            .expect("bulk message should arrive");
        assert_eq!(bulk.payload.len(), CHUNK);
    }
    sender.join().expect("sender thread should finish");
}

#[test]
fn graceful_close_reports_closed_error_on_both_paths() {
    let (left, right) = transport_pair();

    left.close().expect("close should succeed");
    assert_eq!(left.state(), TransportState::Closed);

    let err = right
        .receive(&Context::background())
        .expect_err("peer close should end receive");
    assert!(err.is_closed(), "expected closed error, got {err}");

    let err = right
        .send(&Context::background(), "late", b"")
        .expect_err("peer close should end send");
    assert!(err.is_closed(), "expected closed error, got {err}");

    assert!(left
        .send(&Context::background(), "late", b"")
        .expect_err("local close should end send")
        .is_closed());
}

#[test]
fn send_after_peer_close_is_closed_error_without_receiving() {
    let (left, right) = transport_pair();

    left.close().expect("close should succeed");

    for _ in 0..3 {
        let err = right
            .send(&Context::background(), "late", b"x")
            .expect_err("peer close should end send");
        assert!(err.is_closed(), "expected closed error, got {err}");
    }
    assert_eq!(right.state(), TransportState::Open);

    let err = right
        .receive(&Context::background())
        .expect_err("close record should still be delivered");
    assert!(err.is_closed(), "expected closed error, got {err}");
}

#[test]
fn send_after_peer_close_keeps_earlier_messages_readable() {
    let (left, right) = transport_pair();

    left.send(&Context::background(), "last", b"words")
        .expect("send should succeed");
    left.close().expect("close should succeed");

    let err = right
        .send(&Context::background(), "late", b"")
        .expect_err("peer close should end send");
    assert!(err.is_closed(), "expected closed error, got {err}");

    let message = right
        .receive(&Context::background())
        .expect("message sent before the close should arrive");
    assert_eq!(message.msg_type, "last");
    assert!(right
        .receive(&Context::background())
        .expect_err("close should follow")
        .is_closed());
}

#[test]
fn send_after_peer_close_with_blocked_receiver_is_closed_error() {
    let (left, right) = transport_pair();
    let right = Arc::new(right);

    let receiver = {
        let right = Arc::clone(&right);
        thread::spawn(move || right.receive(&Context::background()))
    };
    thread::sleep(Duration::from_millis(50));
    left.close().expect("close should succeed");

    let err = right
        .send(&Context::background(), "late", b"")
        .expect_err("peer close should end send");
    assert!(err.is_closed(), "expected closed error, got {err}");

    let err = receiver
        .join()
        .expect("receiver thread should finish")
        .expect_err("receiver should see the close");
    assert!(err.is_closed(), "expected closed error, got {err}");
}

#[test]
fn close_unblocks_pending_receiver() {
    let (left, _right) = transport_pair();
    let left = Arc::new(left);

    let receiver = {
        let left = Arc::clone(&left);
        thread::spawn(move || left.receive(&Context::background()))
    };
    thread::sleep(Duration::from_millis(50));
    left.close().expect("close should succeed");

    let err = receiver
        .join()
        .expect("receiver thread should finish")
        .expect_err("receive should be released by close");
    assert!(err.is_closed(), "expected closed error, got {err}");
}

#[test]
fn terminate_unblocks_pending_receiver() {
    let (left, right) = transport_pair();
    let left = Arc::new(left);

    let receiver = {
        let left = Arc::clone(&left);
        thread::spawn(move || left.receive(&Context::background()))
    };
    thread::sleep(Duration::from_millis(50));
    left.terminate().expect("terminate should succeed");

    let err = receiver
        .join()
        .expect("receiver thread should finish")
        .expect_err("receive should be released by terminate");
    assert!(err.is_closed(), "expected closed error, got {err}");

    // No close record went out, so the peer sees a plain connection fault.
    let err = right
        .receive(&Context::background())
        .expect_err("peer should see the drop");
    assert_eq!(err.connection_kind(), Some(ConnectionErrorKind::Io));
}

#[test]
fn peer_drop_is_connection_error() {
    let (left, right) = transport_pair();
    drop(right);

    let err = left
        .receive(&Context::background())
        .expect_err("dropped peer should end receive");
    assert_eq!(err.connection_kind(), Some(ConnectionErrorKind::Io));
}

#[test]
fn non_going_away_close_is_connection_error() {
    let (conn, raw) = StreamConnection::pair().expect("socket pair should open");
    let transport = Transport::new(conn).expect("transport should wrap");
    let (_reader, mut writer, _control) = raw.split().expect("raw side should split");

    writer
        .write_close(&CloseFrame::new(CloseCode::Policy, "not allowed"))
        .expect("close record should write");

    let err = transport
        .receive(&Context::background())
        .expect_err("policy close should end receive");
    assert_eq!(err.connection_kind(), Some(ConnectionErrorKind::PeerClosed));
    assert!(err.to_string().contains("not allowed"));
}

#[test]
fn undecodable_message_leaves_connection_usable() {
    let (conn, raw) = StreamConnection::pair().expect("socket pair should open");
    let transport = Transport::new(conn).expect("transport should wrap");
    let (_reader, mut writer, _control) = raw.split().expect("raw side should split");

    writer
        .write_message(b"no separator here")
        .expect("raw message should write");
    writer
        .write_message(b"event\n{}")
        .expect("raw message should write");

    let err = transport
        .receive(&Context::background())
        .expect_err("malformed frame should fail");
    assert!(matches!(err, TransportError::Frame(_)));

    let message = transport
        .receive(&Context::background())
        .expect("next frame should decode");
    assert_eq!(message.msg_type, "event");
    assert_eq!(transport.state(), TransportState::Open);
}

#[test]
fn oversized_record_tears_connection_down() {
    let (left, right) = std::os::unix::net::UnixStream::pair().expect("socket pair should open");
    let conn = StreamConnection::with_config(
        left,
        ConnConfig {
            max_message_size: 4,
            ..ConnConfig::default()
        },
    );
    let transport = Transport::new(conn).expect("transport should wrap");
    let (_reader, mut writer, _control) = StreamConnection::new(right)
        .split()
        .expect("raw side should split");

    writer
        .write_message(b"toolong\n")
        .expect("raw message should write");
    writer
        .write_message(b"a\nb")
        .expect("raw message should write");

    let err = transport
        .receive(&Context::background())
        .expect_err("oversized record should fail");
    assert_eq!(err.connection_kind(), Some(ConnectionErrorKind::Protocol));
    assert_eq!(transport.state(), TransportState::Closed);

    let err = transport
        .receive(&Context::background())
        .expect_err("torn-down transport should refuse receives");
    assert_eq!(err.connection_kind(), Some(ConnectionErrorKind::Protocol));
    let err = transport
        .send(&Context::background(), "late", b"")
        .expect_err("torn-down transport should refuse sends");
    assert_eq!(err.connection_kind(), Some(ConnectionErrorKind::Protocol));
}

#[test]
fn empty_payload_and_tag_are_allowed() {
    let (left, right) = transport_pair();

    left.send(&Context::background(), "", b"")
        .expect("empty frame should send");
    let message = right
        .receive(&Context::background())
        .expect("empty frame should decode");
    assert_eq!(message.msg_type, "");
    assert!(message.payload.is_empty());
}

#[test]
fn payload_may_contain_separators() {
    let (left, right) = transport_pair();

    left.send(&Context::background(), "multi", b"a\nb\n\nc")
        .expect("send should succeed");
    let message = right
        .receive(&Context::background())
        .expect("receive should succeed");
    assert_eq!(message.payload.as_ref(), b"a\nb\n\nc");
}

#[test]
fn receive_deadline_tears_connection_down() {
    let (left, right) = transport_pair();

    let started = Instant::now();
    let err = left
        .receive(&Context::with_timeout(Duration::from_millis(100)))
        .expect_err("idle receive should hit the deadline");
    assert_eq!(
        err.connection_kind(),
        Some(ConnectionErrorKind::DeadlineExceeded)
    );
    assert!(started.elapsed() >= Duration::from_millis(90));
    assert_eq!(left.state(), TransportState::Closed);

    let err = left
        .send(&Context::background(), "late", b"")
        .expect_err("torn-down transport should refuse sends");
    assert_eq!(
        err.connection_kind(),
        Some(ConnectionErrorKind::DeadlineExceeded)
    );

    let err = right
        .receive(&Context::background())
        .expect_err("peer should see the teardown");
    assert_eq!(err.connection_kind(), Some(ConnectionErrorKind::Io));
}

#[test]
fn deadline_that_does_not_fire_leaves_connection_open() {
    let (left, right) = transport_pair();

    left.send(&Context::with_timeout(Duration::from_secs(5)), "quick", b"")
        .expect("send within deadline should succeed");
    let message = right
        .receive(&Context::with_timeout(Duration::from_secs(5)))
        .expect("receive within deadline should succeed");
    assert_eq!(message.msg_type, "quick");

    // A later call without a deadline must not inherit the old socket timeout.
    let receiver = thread::spawn(move || right.receive(&Context::background()));
    thread::sleep(Duration::from_millis(100));
    left.send(&Context::background(), "later", b"")
        .expect("send should succeed");
    let later = receiver
        .join()
        .expect("receiver thread should finish")
        .expect("receive without deadline should wait");
    assert_eq!(later.msg_type, "later");
}
