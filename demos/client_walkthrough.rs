//! A narrative walkthrough of wiring a `Transport` to this crate's façade,
//! in the spirit of the teacher's `src/main.rs`/`src/client.rs` CLI (a
//! `clap`-parsed URL, `Client::get`, print the body). This file is not a
//! compiled binary target — TLS/TCP ownership is the caller's job, out of
//! scope for this core (§1) — it exists only to show the shape an owner
//! reaches for.
//!
//! A real owner would plug in a `Transport` backed by `rustls` + a
//! `TcpStream` the way the teacher's `src/socket.rs` did, negotiate ALPN
//! `h2` itself, then hand the connected socket to [`Connection::connect`].
//! What's sketched below stands in for that socket with a hypothetical
//! `TcpTlsTransport` so the rest of the flow reads the same either way.

use h2_core::{
    ConnectOptions, Connection, Method, RequestBody, ResponseEvent, StreamOutcome, TransportMessage,
};
use std::time::Duration;

/// Blocks on the owner's transport until a response for `request_ref`
/// completes or fails, printing headers and body as they arrive. Mirrors
/// the teacher's `Client::get` printing `response.body` once the request
/// resolves, generalized here to the event-stream shape this core hands
/// back instead of one `Response` struct.
fn drive_to_completion(conn: &mut Connection, request_ref: h2_core::RequestRef) -> Result<(), h2_core::Http2Error> {
    loop {
        let outcome = conn.recv(1, Duration::from_secs(30)).map_err(|e| h2_core::Http2Error::ProtocolError(e.to_string()))?;
        let events = match outcome {
            StreamOutcome::Ok(events) => events,
            StreamOutcome::ProtocolFatal(err, events) => {
                for ev in events {
                    print_event(request_ref, &ev);
                }
                return Err(err);
            }
            StreamOutcome::TransportFailed(err) => {
                eprintln!("transport failed: {err:#?}");
                return Ok(());
            }
        };
        let mut done = false;
        for ev in &events {
            print_event(request_ref, ev);
            if matches!(ev, ResponseEvent::Done { request_ref: r } | ResponseEvent::Error { request_ref: r, .. } if *r == request_ref)
            {
                done = true;
            }
        }
        if done {
            return Ok(());
        }
    }
}

fn print_event(request_ref: h2_core::RequestRef, ev: &ResponseEvent) {
    match ev {
        ResponseEvent::Status { request_ref: r, code } if *r == request_ref => println!("status: {code}"),
        ResponseEvent::Headers { request_ref: r, headers } if *r == request_ref => {
            for (name, value) in headers {
                println!("{name}: {value}");
            }
        }
        ResponseEvent::Data { request_ref: r, chunk } if *r == request_ref => {
            print!("{}", String::from_utf8_lossy(chunk));
        }
        ResponseEvent::Error { request_ref: r, error } if *r == request_ref => eprintln!("{error:#?}"),
        _ => {}
    }
}

/// Stand-in for the owner's real connector — in production this would
/// dial a `TcpStream`, drive a `rustls::ClientConnection` through the TLS
/// handshake, confirm ALPN negotiated `h2`, and return a `Transport` impl
/// wrapping that socket (see `src/transport.rs`'s doc comment for the
/// shape the teacher's `src/socket.rs` used). Left unimplemented here:
/// this file only documents the call sequence, it is never built.
struct TcpTlsConnector;

impl h2_core::TransportConnector for TcpTlsConnector {
    fn connect(
        &self,
        _scheme: &str,
        _host: &str,
        _port: u16,
        _opts: &h2_core::TransportOpts,
    ) -> Result<Box<dyn h2_core::Transport>, h2_core::TransportError> {
        unimplemented!("dial TCP, negotiate TLS+ALPN, hand back the socket")
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let connector = TcpTlsConnector;
    let mut conn = Connection::connect(&connector, "https", "example.com", 443, ConnectOptions::default())
        .map_err(|e| anyhow::anyhow!("connect failed: {e:?}"))?;

    // The owner drives bytes off its socket into the connection however it
    // likes — a read loop on another thread, an async task, whatever fits.
    // Every inbound chunk goes through `stream`; nothing here calls
    // `recv`/`stream` concurrently, since the core is not re-entrant (§5).
    loop {
        let mut buf = [0u8; 4096];
        let n = 0; // owner's socket read goes here
        if n == 0 {
            let _ = conn.stream(TransportMessage::Closed);
            break;
        }
        let outcome = conn.stream(TransportMessage::Bytes(bytes::Bytes::copy_from_slice(&buf[..n])));
        if matches!(outcome, StreamOutcome::Ok(ref events) if events.is_empty()) {
            break; // handshake SETTINGS exchanged; ready to issue requests
        }
    }

    let request_ref = conn
        .request(Method::Get, "/", Vec::new(), RequestBody::None)
        .map_err(|e| anyhow::anyhow!("request failed: {e:?}"))?;
    drive_to_completion(&mut conn, request_ref).map_err(|e| anyhow::anyhow!("{e:?}"))?;
    conn.close();
    Ok(())
}
