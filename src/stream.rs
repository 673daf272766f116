//! The per-stream state machine (§4.5). Grounded on the teacher's
//! `src/stream.rs` `transition_state` (same trigger/state shape, same
//! `trace!` logging of the transition), generalized from its combined
//! frame-dispatch-plus-transition method into small, independently
//! testable transition functions that `connection.rs` drives.

use crate::error::{Http2Error, WindowScope};
use crate::flow::{FlowWindow, InboundFlow};
use crate::types::{RequestRef, StreamId};
use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamState {
    Idle,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Informational,
    Final,
}

/// A single open (or once-open) HTTP/2 stream (§3).
#[derive(Debug, Clone)]
pub struct Stream {
    pub id: StreamId,
    pub request_ref: RequestRef,
    state: StreamState,
    pub send_window: FlowWindow,
    pub recv_window: InboundFlow,
    received_status_class: Option<StatusClass>,
    pub request_streaming: bool,
    pub request_body_done: bool,
    pub content_length_declared: Option<u64>,
}

impl Stream {
    #[must_use]
    pub fn new(id: StreamId, request_ref: RequestRef, initial_send_window: u32, initial_recv_window: u32) -> Self {
        Self {
            id,
            request_ref,
            state: StreamState::Idle,
            send_window: FlowWindow::new(initial_send_window),
            recv_window: InboundFlow::new(initial_recv_window),
            received_status_class: None,
            request_streaming: false,
            request_body_done: false,
            content_length_declared: None,
        }
    }

    #[must_use]
    pub fn new_reserved_remote(id: StreamId, request_ref: RequestRef, initial_send_window: u32, initial_recv_window: u32) -> Self {
        let mut stream = Self::new(id, request_ref, initial_send_window, initial_recv_window);
        stream.set_state(StreamState::ReservedRemote);
        stream
    }

    #[must_use]
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether this stream counts toward `open_request_count` (§3): open,
    /// half_closed_local, or half_closed_remote. `reserved_remote` is
    /// deliberately excluded — a pushed stream the caller hasn't seen any
    /// response on yet isn't a request the caller is waiting on.
    #[must_use]
    pub fn is_open_facing_caller(&self) -> bool {
        matches!(self.state, StreamState::Open | StreamState::HalfClosedLocal | StreamState::HalfClosedRemote)
    }

    /// Whether this stream occupies a table slot at all: anything past
    /// `idle` and short of `closed`, including `reserved_remote`. Used for
    /// the symmetric concurrency cap on server-initiated pushes (§4.4),
    /// which is not the same count as `open_request_count`.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state != StreamState::Idle && self.state != StreamState::Closed
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    fn set_state(&mut self, next: StreamState) {
        if next != self.state {
            trace!("stream {} {:?} -> {:?}", self.id, self.state, next);
            self.state = next;
        }
    }

    /// The client sent HEADERS opening this stream (§4.5).
    pub fn on_client_headers_sent(&mut self, end_stream: bool) {
        self.set_state(if end_stream { StreamState::HalfClosedLocal } else { StreamState::Open });
    }

    /// The client finished its request body (`stream_request_body(:eof)`).
    pub fn on_client_end_stream(&mut self) {
        if self.state == StreamState::Open {
            self.set_state(StreamState::HalfClosedLocal);
        }
    }

    /// Records an incoming HEADERS block's status class, enforcing that
    /// informational (1xx) responses only precede the final one (§4.5).
    pub fn note_status(&mut self, class: StatusClass) -> Result<(), Http2Error> {
        if self.received_status_class == Some(StatusClass::Final) {
            return Err(Http2Error::ProtocolError(
                "informational headers must appear before the final response".into(),
            ));
        }
        self.received_status_class = Some(class);
        Ok(())
    }

    #[must_use]
    pub fn has_received_final_status(&self) -> bool {
        self.received_status_class == Some(StatusClass::Final)
    }

    /// Applies an END_STREAM bit observed on an inbound frame (§4.5).
    pub fn apply_recv_end_stream(&mut self) {
        match self.state {
            StreamState::Open | StreamState::ReservedRemote => self.set_state(StreamState::HalfClosedRemote),
            StreamState::HalfClosedLocal => self.set_state(StreamState::Closed),
            StreamState::HalfClosedRemote | StreamState::Closed | StreamState::Idle => {}
        }
    }

    pub fn apply_rst_received(&mut self) {
        self.set_state(StreamState::Closed);
    }

    pub fn cancel(&mut self) {
        self.set_state(StreamState::Closed);
    }

    /// Consumes `n` bytes of outbound body budget from both the stream and
    /// (via the caller) the connection window (§4.3).
    pub fn consume_send_window(&mut self, n: u32) -> Result<(), Http2Error> {
        self.send_window.consume(n, WindowScope::Request)
    }

    pub fn increment_send_window(&mut self, n: u32) -> Result<(), Http2Error> {
        self.send_window.increment(n, WindowScope::Request)
    }

    pub fn adjust_send_window_by_delta(&mut self, delta: i64) {
        self.send_window.adjust_by_delta(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestRefAllocator;

    fn test_stream() -> Stream {
        let mut alloc = RequestRefAllocator::new(1);
        Stream::new(1, alloc.allocate(), 65_535, 65_535)
    }

    #[test]
    fn headers_with_end_stream_skips_open() {
        let mut s = test_stream();
        s.on_client_headers_sent(true);
        assert_eq!(s.state(), StreamState::HalfClosedLocal);
    }

    #[test]
    fn informational_after_final_is_rejected() {
        let mut s = test_stream();
        s.note_status(StatusClass::Final).unwrap();
        assert!(s.note_status(StatusClass::Informational).is_err());
    }

    #[test]
    fn end_stream_from_open_half_closes_remote() {
        let mut s = test_stream();
        s.on_client_headers_sent(false);
        s.apply_recv_end_stream();
        assert_eq!(s.state(), StreamState::HalfClosedRemote);
    }

    #[test]
    fn end_stream_on_half_closed_local_closes() {
        let mut s = test_stream();
        s.on_client_headers_sent(true);
        s.apply_recv_end_stream();
        assert_eq!(s.state(), StreamState::Closed);
    }
}
