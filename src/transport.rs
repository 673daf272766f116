//! The transport abstraction (§4.9): this core never owns a socket.
//! Grounded on the teacher's `src/socket.rs` (`Socket` wrapping a
//! `rustls::ClientConnection` + `TcpStream`, with `read_exact_maybe`/
//! `write_all`), generalized into a trait so the caller supplies TLS/TCP
//! (or, in tests, an in-memory double) instead of this crate owning it.

use crate::error::TransportError;
use bytes::Bytes;
use std::time::Duration;

/// An already-connected, already-negotiated (TLS+ALPN) byte pipe.
pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;

    /// Reads at least `min_bytes` (unless the transport closes first),
    /// waiting up to `timeout`.
    fn recv(&mut self, min_bytes: usize, timeout: Duration) -> Result<Bytes, TransportError>;

    /// For diagnostics / `get_socket`-style introspection; no parsing
    /// meaning is attached to the string.
    fn peer_addr(&self) -> Option<String> {
        None
    }
}

/// Transport connect options (§6); opaque beyond what this core reads.
#[derive(Debug, Clone, Default)]
pub struct TransportOpts {
    pub connect_timeout: Option<Duration>,
}

/// The seam `connect` calls through. This crate ships no production
/// connector (TLS/TCP negotiation is out of scope, §1) — only
/// [`MockTransport`] for tests.
pub trait TransportConnector {
    fn connect(
        &self,
        scheme: &str,
        host: &str,
        port: u16,
        opts: &TransportOpts,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// A deterministic in-memory transport double (§4.9, glossary). Backed by
/// two byte queues: `written` accumulates everything the connection core
/// sent, and `inbox` is drained (in order, honoring `min_bytes`) by
/// `recv`. Mirrors the teacher's `Socket` without doing any real I/O.
#[derive(Debug, Default)]
pub struct MockTransport {
    written: Vec<u8>,
    inbox: std::collections::VecDeque<u8>,
    closed: bool,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes a test pretends the "server" sent, to be handed back
    /// by subsequent `recv` calls.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.inbox.extend(bytes.iter().copied());
    }

    /// Everything written to this transport so far, for test assertions.
    #[must_use]
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Transport for MockTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.written.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }

    fn recv(&mut self, min_bytes: usize, _timeout: Duration) -> Result<Bytes, TransportError> {
        if self.inbox.len() < min_bytes {
            return Err(TransportError::Closed);
        }
        let drained: Vec<u8> = self.inbox.drain(..).collect();
        Ok(Bytes::from(drained))
    }

    fn peer_addr(&self) -> Option<String> {
        Some("mock:0".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_then_recv_round_trips() {
        let mut t = MockTransport::new();
        t.feed(b"hello");
        let got = t.recv(5, Duration::from_millis(0)).unwrap();
        assert_eq!(&got[..], b"hello");
    }

    #[test]
    fn send_after_close_errors() {
        let mut t = MockTransport::new();
        t.close().unwrap();
        assert!(matches!(t.send(b"x"), Err(TransportError::Closed)));
    }
}
