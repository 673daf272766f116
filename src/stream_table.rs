//! The stream table (§4.4): stream_id → Stream, plus the reverse
//! request_ref → stream_id lookup. Grounded on the teacher's
//! `src/stream_coordinator.rs` (id allocation, `with_stream` accessor
//! shape), generalized from its single `DashMap` — this core is
//! single-threaded, so a plain `HashMap` replaces the concurrent one, and
//! the teacher's `AtomicU32` counter becomes a plain field.

use crate::error::Http2Error;
use crate::stream::Stream;
use crate::types::{RequestRef, RequestRefAllocator, StreamId, MAX_STREAM_ID};
use std::collections::HashMap;

#[derive(Debug)]
pub struct StreamTable {
    streams: HashMap<StreamId, Stream>,
    by_ref: HashMap<RequestRef, StreamId>,
    refs: RequestRefAllocator,
    next_client_id: StreamId,
    last_reserved_server_id: StreamId,
}

impl StreamTable {
    #[must_use]
    pub fn new(nonce: u64) -> Self {
        Self {
            streams: HashMap::new(),
            by_ref: HashMap::new(),
            refs: RequestRefAllocator::new(nonce),
            next_client_id: 1,
            last_reserved_server_id: 0,
        }
    }

    /// Allocates the next odd client stream id and inserts an idle `Stream`
    /// for it, enforcing the concurrency cap (§4.4).
    pub fn insert_client_stream(
        &mut self,
        open_request_count: usize,
        max_concurrent_streams: u32,
        initial_send_window: u32,
        initial_recv_window: u32,
    ) -> Result<(Stream, RequestRef), Http2Error> {
        if open_request_count as u64 >= u64::from(max_concurrent_streams) {
            return Err(Http2Error::TooManyConcurrentRequests);
        }
        let id = self.next_client_id;
        self.next_client_id = self.next_client_id.saturating_add(2).min(MAX_STREAM_ID);
        let request_ref = self.refs.allocate();
        let stream = Stream::new(id, request_ref, initial_send_window, initial_recv_window);
        self.by_ref.insert(request_ref, id);
        self.streams.insert(id, stream.clone());
        Ok((stream, request_ref))
    }

    /// Validates and reserves an even, strictly-increasing server-initiated
    /// stream id for an incoming PUSH_PROMISE (§4.4).
    pub fn reserve_server_stream(
        &mut self,
        id: StreamId,
        initial_send_window: u32,
        initial_recv_window: u32,
    ) -> Result<RequestRef, Http2Error> {
        if id % 2 != 0 || id <= self.last_reserved_server_id || self.streams.contains_key(&id) {
            return Err(Http2Error::ProtocolError(format!(
                "invalid or reused server push stream id {id}"
            )));
        }
        self.last_reserved_server_id = id;
        let request_ref = self.refs.allocate();
        let stream = Stream::new_reserved_remote(id, request_ref, initial_send_window, initial_recv_window);
        self.by_ref.insert(request_ref, id);
        self.streams.insert(id, stream);
        Ok(request_ref)
    }

    #[must_use]
    pub fn find_by_id(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn find_by_id_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    #[must_use]
    pub fn find_by_ref(&self, request_ref: RequestRef) -> Option<&Stream> {
        self.by_ref.get(&request_ref).and_then(|id| self.streams.get(id))
    }

    pub fn find_by_ref_mut(&mut self, request_ref: RequestRef) -> Option<&mut Stream> {
        let id = *self.by_ref.get(&request_ref)?;
        self.streams.get_mut(&id)
    }

    pub fn id_for_ref(&self, request_ref: RequestRef) -> Option<StreamId> {
        self.by_ref.get(&request_ref).copied()
    }

    /// Removes a closed stream's bookkeeping once every queued response for
    /// it has been emitted.
    pub fn close_and_drain(&mut self, id: StreamId) {
        if let Some(stream) = self.streams.remove(&id) {
            self.by_ref.remove(&stream.request_ref);
        }
    }

    /// The highest client-initiated stream id ever allocated, used as the
    /// `last_stream_id` field of an outgoing GOAWAY (§4.6). `0` if no
    /// request has been sent yet.
    #[must_use]
    pub fn highest_client_id(&self) -> StreamId {
        self.next_client_id.saturating_sub(2)
    }

    #[must_use]
    pub fn last_reserved_server_id(&self) -> StreamId {
        self.last_reserved_server_id
    }

    #[must_use]
    pub fn open_request_count(&self) -> usize {
        self.streams.values().filter(|s| s.is_open_facing_caller()).count()
    }

    /// Every stream occupying a table slot, including `reserved_remote`
    /// pushes the caller hasn't received a response on yet (§4.4's
    /// symmetric push concurrency cap).
    #[must_use]
    pub fn live_stream_count(&self) -> usize {
        self.streams.values().filter(|s| s.is_live()).count()
    }

    /// Every client-initiated id strictly greater than `last_stream_id`,
    /// used to mark GOAWAY'd streams `unprocessed` (§4.6).
    pub fn client_ids_above(&self, last_stream_id: StreamId) -> Vec<StreamId> {
        self.streams
            .keys()
            .copied()
            .filter(|&id| id % 2 == 1 && id > last_stream_id)
            .collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Stream> {
        self.streams.values_mut()
    }
}
