//! End-to-end scenarios driven entirely through `MockTransport`, replacing
//! the teacher's live-network tests (`tests/basic.rs`, `tests/reqres.rs`,
//! which dialed real hosts over `tokio`). Each test plays the part of both
//! client and "server": it drives the public façade to send a request, then
//! hand-builds the server's wire bytes with `h2_core::frame`/`h2_core::hpack`
//! and feeds them back in through `Connection::stream`.

use h2_core::frame::{self, Frame};
use h2_core::hpack::Encoder as HpackEncoder;
use h2_core::{
    ConnectOptions, Connection, Http2Error, MockTransport, Method, RequestBody, ResponseEvent, Transport, TransportConnector,
    TransportError, TransportOpts, WindowScope,
};
use bytes::Bytes;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Gives the test both ends of the wire: a handle it can feed/inspect, and
/// a `TransportConnector` that hands the same backing `MockTransport` to
/// the `Connection` under test.
struct Shared(Rc<RefCell<MockTransport>>);

impl Shared {
    fn new() -> Self {
        Self(Rc::new(RefCell::new(MockTransport::new())))
    }

    fn take_written(&self) -> Vec<u8> {
        self.0.borrow_mut().take_written()
    }
}

struct Handle(Rc<RefCell<MockTransport>>);

impl Transport for Handle {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.0.borrow_mut().send(bytes)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.0.borrow_mut().close()
    }

    fn recv(&mut self, min_bytes: usize, timeout: Duration) -> Result<Bytes, TransportError> {
        self.0.borrow_mut().recv(min_bytes, timeout)
    }

    fn peer_addr(&self) -> Option<String> {
        Some("mock:0".to_string())
    }
}

impl TransportConnector for Shared {
    fn connect(&self, _scheme: &str, _host: &str, _port: u16, _opts: &TransportOpts) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(Handle(self.0.clone())))
    }
}

/// Dials a fresh connection and pushes it past the handshake: one inbound
/// SETTINGS (so `remote_settings_received`), one inbound SETTINGS ACK (so
/// `local_settings_acked`). With `enable_async_settings` left off (the
/// default) neither surfaces as a response event, matching §4.6.
fn connected(shared: &Shared) -> Connection {
    let mut conn = Connection::connect(shared, "https", "example.com", 443, ConnectOptions::default()).unwrap();
    shared.take_written(); // drop the preface + our outbound SETTINGS

    let mut handshake = Vec::new();
    handshake.extend_from_slice(&frame::encode_settings(false, &[]));
    handshake.extend_from_slice(&frame::encode_settings(true, &[]));
    let outcome = conn.stream(h2_core::TransportMessage::Bytes(Bytes::from(handshake)));
    assert!(matches!(outcome, h2_core::StreamOutcome::Ok(events) if events.is_empty()));
    shared.take_written(); // our SETTINGS ack to the server's SETTINGS
    conn
}

fn encode_status_headers(pairs: &[(&str, &str)]) -> Bytes {
    let headers: Vec<(String, String)> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    HpackEncoder::with_dynamic_table_size(4096).encode(&headers)
}

fn get(conn: &mut Connection, path: &str) -> h2_core::RequestRef {
    conn.request(Method::Get, path, Vec::new(), RequestBody::None).unwrap()
}

#[test]
fn scenario_1_simple_get_200() {
    let shared = Shared::new();
    let mut conn = connected(&shared);
    let r = get(&mut conn, "/");
    shared.take_written();

    let block = encode_status_headers(&[(":status", "200")]);
    let frames = frame::encode_headers_split(1, true, &block, 16_384);
    let outcome = conn.stream(h2_core::TransportMessage::Bytes(frames.concat().into()));

    let events = match outcome {
        h2_core::StreamOutcome::Ok(events) => events,
        other => panic!("expected Ok, got {other:?}"),
    };
    assert_eq!(
        events,
        vec![
            ResponseEvent::Status { request_ref: r, code: 200 },
            ResponseEvent::Headers { request_ref: r, headers: Vec::new() },
            ResponseEvent::Done { request_ref: r },
        ]
    );
    assert!(conn.open());
}

#[test]
fn scenario_2_headers_continuation_reassembly() {
    let shared = Shared::new();
    let mut conn = connected(&shared);
    let r = get(&mut conn, "/");
    shared.take_written();

    let block = encode_status_headers(&[(":status", "200"), ("foo", "bar"), ("baz", "bong")]);
    // Force the split across three frames regardless of how small the
    // encoded block turns out to be, by capping max_frame_size tightly.
    let max_frame = (block.len() / 3).max(1) as u32;
    let frames = frame::encode_headers_split(1, false, &block, max_frame);
    assert!(frames.len() >= 2, "expected at least one CONTINUATION");

    let mut all = Vec::new();
    for f in &frames {
        all.extend_from_slice(f);
    }
    let outcome = conn.stream(h2_core::TransportMessage::Bytes(Bytes::from(all)));
    let events = match outcome {
        h2_core::StreamOutcome::Ok(events) => events,
        other => panic!("expected Ok, got {other:?}"),
    };
    assert_eq!(
        events,
        vec![
            ResponseEvent::Status { request_ref: r, code: 200 },
            ResponseEvent::Headers {
                request_ref: r,
                headers: vec![("foo".to_string(), "bar".to_string()), ("baz".to_string(), "bong".to_string())],
            },
        ]
    );
}

#[test]
fn scenario_3_rst_stream_cancel() {
    let shared = Shared::new();
    let mut conn = connected(&shared);
    let r = get(&mut conn, "/");
    shared.take_written();

    let rst = frame::encode_reset_stream(1, h2_core::types::ErrorCode::Cancel);
    let outcome = conn.stream(h2_core::TransportMessage::Bytes(rst));
    let events = match outcome {
        h2_core::StreamOutcome::Ok(events) => events,
        other => panic!("expected Ok, got {other:?}"),
    };
    assert_eq!(
        events,
        vec![ResponseEvent::Error {
            request_ref: r,
            error: Http2Error::ServerClosedRequest(h2_core::types::ErrorCode::Cancel),
        }]
    );
    assert!(conn.open());
}

#[test]
fn scenario_4_goaway_marks_later_streams_unprocessed() {
    let shared = Shared::new();
    let mut conn = connected(&shared);
    let r1 = get(&mut conn, "/a");
    let r2 = get(&mut conn, "/b");
    let r3 = get(&mut conn, "/c");
    shared.take_written();

    let goaway = frame::encode_goaway(1, h2_core::types::ErrorCode::ProtocolError, b"debug data");
    let outcome = conn.stream(h2_core::TransportMessage::Bytes(goaway));
    let events = match outcome {
        h2_core::StreamOutcome::Ok(events) => events,
        other => panic!("expected Ok, got {other:?}"),
    };

    assert_eq!(events.len(), 2);
    for ev in &events {
        match ev {
            ResponseEvent::Error { request_ref, error } => {
                assert!(*request_ref == r2 || *request_ref == r3);
                assert_eq!(*error, Http2Error::Unprocessed);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    let _ = r1;

    assert_eq!(conn.open_request_count(), 1);
    assert!(!conn.open_dir(h2_core::Direction::Write));
    assert!(conn.open_dir(h2_core::Direction::Read));
    assert_eq!(
        conn.connection_error(),
        Some(&Http2Error::ServerClosedConnection {
            code: h2_core::types::ErrorCode::ProtocolError,
            debug: "debug data".to_string(),
        })
    );
}

#[test]
fn scenario_5_malformed_headers_is_fatal() {
    let shared = Shared::new();
    let mut conn = connected(&shared);
    let _r = get(&mut conn, "/");
    shared.take_written();

    let garbage = frame::encode_headers_split(1, true, b"not a good hbf", 16_384);
    let outcome = conn.stream(h2_core::TransportMessage::Bytes(garbage.concat().into()));

    match outcome {
        h2_core::StreamOutcome::ProtocolFatal(Http2Error::CompressionError(debug), _events) => {
            assert!(debug.contains("unable to decode headers"));
        }
        other => panic!("expected ProtocolFatal(CompressionError), got {other:?}"),
    }
    assert!(!conn.open());

    let written = shared.take_written();
    let mut buf = bytes::BytesMut::from(&written[..]);
    let sent = frame::decode_frame(&mut buf, 16_384).unwrap().unwrap();
    assert!(matches!(sent, Frame::GoAway { error_code, .. } if error_code == h2_core::types::ErrorCode::CompressionError));
}

#[test]
fn scenario_6_too_many_concurrent_requests() {
    let shared = Shared::new();
    let mut conn = connected(&shared);
    // The cap enforced on outbound requests is the *remote*
    // max_concurrent_streams — drive it the way the peer would, via an
    // inbound SETTINGS frame.
    let update = frame::encode_settings(false, &[(h2_core::settings::SettingsParameter::MaxConcurrentStreams, 1)]);
    conn.stream(h2_core::TransportMessage::Bytes(update));
    shared.take_written();

    let before = conn.get_window_size(WindowScope::Connection, None).unwrap();
    let _first = get(&mut conn, "/a");
    let err = conn.request(Method::Get, "/b", Vec::new(), RequestBody::None).unwrap_err();
    assert!(matches!(err, Http2Error::TooManyConcurrentRequests));
    assert_eq!(conn.get_window_size(WindowScope::Connection, None).unwrap(), before);
    assert!(conn.open());
}

#[test]
fn scenario_7_request_body_split_across_max_frame_size() {
    let shared = Shared::new();
    let mut conn = connected(&shared);

    let body = Bytes::from(vec![b'x'; 100]);
    conn.request(Method::Post, "/upload", Vec::new(), RequestBody::Fixed(body.clone())).unwrap();
    let written = shared.take_written();

    let mut buf = bytes::BytesMut::from(&written[..]);
    let mut data_frames = Vec::new();
    while let Some(f) = frame::decode_frame(&mut buf, 16_384).unwrap() {
        if let Frame::Data { data, end_stream, .. } = f {
            data_frames.push((data, end_stream));
        }
    }

    assert!(!data_frames.is_empty());
    for (i, (_, end_stream)) in data_frames.iter().enumerate() {
        assert_eq!(*end_stream, i == data_frames.len() - 1);
    }
    let reassembled: Vec<u8> = data_frames.iter().flat_map(|(d, _)| d.to_vec()).collect();
    assert_eq!(reassembled, body.to_vec());
}

#[test]
fn scenario_10_rst_stream_on_never_opened_stream_is_fatal() {
    let shared = Shared::new();
    let mut conn = connected(&shared);
    let _r = get(&mut conn, "/"); // only stream 1 has ever been opened
    shared.take_written();

    let rst = frame::encode_reset_stream(99, h2_core::types::ErrorCode::Cancel);
    let outcome = conn.stream(h2_core::TransportMessage::Bytes(rst));
    match outcome {
        h2_core::StreamOutcome::ProtocolFatal(Http2Error::ProtocolError(debug), _events) => {
            assert!(debug.contains("99"));
        }
        other => panic!("expected ProtocolFatal(ProtocolError), got {other:?}"),
    }
    assert!(!conn.open());
}

#[test]
fn scenario_9_custom_request_headers_pass_through() {
    use h2_core::hpack::Decoder as HpackDecoder;
    use maplit::hashmap;

    let shared = Shared::new();
    let mut conn = connected(&shared);

    let extra: std::collections::HashMap<&str, &str> = hashmap! {
        "x-request-id" => "abc123",
        "accept" => "application/json",
    };
    let headers: Vec<(String, String)> = extra.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    conn.request(Method::Get, "/widgets", headers, RequestBody::None).unwrap();
    let written = shared.take_written();

    let mut buf = bytes::BytesMut::from(&written[..]);
    let frame = frame::decode_frame(&mut buf, 16_384).unwrap().unwrap();
    let block = match frame {
        Frame::Headers { fragment, .. } => fragment,
        other => panic!("expected Headers, got {other:?}"),
    };
    let decoded = HpackDecoder::with_dynamic_table_size(4096).decode(&block).unwrap();
    let sent: std::collections::HashMap<String, String> = decoded.into_iter().collect();
    assert_eq!(sent.get("x-request-id"), Some(&"abc123".to_string()));
    assert_eq!(sent.get("accept"), Some(&"application/json".to_string()));
    assert_eq!(sent.get(":path"), Some(&"/widgets".to_string()));
}

#[test]
fn scenario_8_ping_ack_is_silent() {
    let shared = Shared::new();
    let mut conn = connected(&shared);

    let opaque = [0u8; 8];
    let ping = frame::encode_ping(false, opaque);
    let outcome = conn.stream(h2_core::TransportMessage::Bytes(ping));
    let events = match outcome {
        h2_core::StreamOutcome::Ok(events) => events,
        other => panic!("expected Ok, got {other:?}"),
    };
    assert!(events.is_empty());

    let written = shared.take_written();
    let mut buf = bytes::BytesMut::from(&written[..]);
    let sent = frame::decode_frame(&mut buf, 16_384).unwrap().unwrap();
    assert!(matches!(sent, Frame::Ping { ack: true, data } if data == opaque));
}
