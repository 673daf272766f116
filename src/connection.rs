//! The connection state machine (§3, §4.6, §4.7): the public façade this
//! crate exposes. Grounded on the teacher's `src/connection.rs` (which
//! spawned sender/receiver threads around a socket) and its
//! `spawn_response_receiver`'s per-frame-type dispatch `match`, which is
//! kept here as the shape of [`Connection::stream`]'s frame loop — but
//! de-threaded into a single synchronous call, since this core owns no
//! socket and spawns nothing (§5: single-threaded cooperative, re-entrant
//! free).

use crate::error::{Http2Error, TransportError, WindowScope};
use crate::event::{join_cookies, strip_pseudo_headers, ResponseEvent};
use crate::flow::{FlowWindow, InboundFlow};
use crate::frame::{self, Frame};
use crate::hpack;
use crate::request::{build_authority, build_request_headers, validate_trailers, Method, RequestBody};
use crate::settings::{Settings, SettingsUpdate};
use crate::stream::{StatusClass, Stream};
use crate::stream_table::StreamTable;
use crate::transport::{Transport, TransportConnector, TransportOpts};
use crate::types::{ErrorCode, Headers, RequestRef, StreamId, PSEUDO_STATUS};
use bytes::{Bytes, BytesMut};
use derivative::Derivative;
use log::{error, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static CONNECTION_NONCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Active,
    Passive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Handshaking,
    Open,
    Closed,
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub transport_opts: TransportOpts,
    pub client_settings: SettingsUpdate,
    pub mode: Mode,
    pub enable_async_settings: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            transport_opts: TransportOpts::default(),
            client_settings: SettingsUpdate::new(),
            mode: Mode::Active,
            enable_async_settings: false,
        }
    }
}

/// What `stream` is fed (§4.7, §6): the shapes a transport can hand back.
#[derive(Debug, Clone)]
pub enum TransportMessage {
    Bytes(Bytes),
    Closed,
    Error(TransportError),
}

/// The three-way outcome `stream`/`recv` can produce (§4.7).
#[derive(Debug)]
pub enum StreamOutcome {
    Ok(Vec<ResponseEvent>),
    ProtocolFatal(Http2Error, Vec<ResponseEvent>),
    TransportFailed(TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderKind {
    Headers,
    PushPromise,
}

#[derive(Debug)]
struct PendingHeaderBlock {
    stream_id: StreamId,
    kind: HeaderKind,
    buffer: BytesMut,
    end_stream: bool,
    promised_stream_id: StreamId,
}

/// The connection-level state (§3). Owns the stream table, both HPACK
/// directions, both flow windows, local/remote `Settings`, and the
/// transport handle — nothing else.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Connection {
    #[derivative(Debug = "ignore")]
    transport: Box<dyn Transport>,
    scheme: String,
    host: String,
    port: u16,
    authority: String,
    mode: Mode,
    lifecycle: Lifecycle,
    enable_async_settings: bool,
    controlling_owner: Option<String>,

    local_settings: Settings,
    remote_settings: Settings,
    local_settings_acked: bool,
    remote_settings_received: bool,

    send_window: FlowWindow,
    recv_window: InboundFlow,

    encoder: hpack::Encoder,
    decoder: hpack::Decoder,

    streams: StreamTable,
    pending_header_block: Option<PendingHeaderBlock>,

    ping_queue: std::collections::VecDeque<(u64, [u8; 8])>,
    ping_counter: u64,

    goaway_sent: bool,
    goaway_received: bool,
    connection_error: Option<Http2Error>,

    private: std::collections::HashMap<String, Vec<u8>>,
}

impl Connection {
    /// Opens the transport and begins the handshake (§4.6): emits the
    /// client preface followed by a SETTINGS frame carrying the local
    /// overrides. Unlike the teacher's `Connection::connect`, this does not
    /// spawn a reader: the first inbound SETTINGS is processed the same way
    /// as any other frame, the first time the caller drives `stream`/`recv`
    /// (see DESIGN.md's open-question resolution).
    pub fn connect(
        connector: &dyn TransportConnector,
        scheme: &str,
        host: &str,
        port: u16,
        opts: ConnectOptions,
    ) -> Result<Self, TransportError> {
        let transport = connector.connect(scheme, host, port, &opts.transport_opts)?;
        let mut local_settings = Settings::default();
        opts.client_settings.apply_to(&mut local_settings);

        let mut conn = Self {
            transport,
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            authority: build_authority(host, port, scheme),
            mode: opts.mode,
            lifecycle: Lifecycle::Handshaking,
            enable_async_settings: opts.enable_async_settings,
            controlling_owner: None,
            local_settings,
            remote_settings: Settings::default(),
            local_settings_acked: false,
            remote_settings_received: false,
            send_window: FlowWindow::new(Settings::default().initial_window_size),
            recv_window: InboundFlow::new(local_settings.initial_window_size),
            encoder: hpack::Encoder::with_dynamic_table_size(4096),
            decoder: hpack::Decoder::with_dynamic_table_size(local_settings.header_table_size),
            streams: StreamTable::new(CONNECTION_NONCE.fetch_add(1, Ordering::Relaxed)),
            pending_header_block: None,
            ping_queue: std::collections::VecDeque::new(),
            ping_counter: 0,
            goaway_sent: false,
            goaway_received: false,
            connection_error: None,
            private: std::collections::HashMap::new(),
        };

        conn.transport.send(frame::PREFACE)?;
        let settings_frame = frame::encode_settings(false, &conn.local_settings.as_pairs());
        conn.transport.send(&settings_frame)?;
        Ok(conn)
    }

    fn send_frame(&mut self, bytes: Bytes) -> Result<(), TransportError> {
        self.transport.send(&bytes)
    }

    fn maybe_complete_handshake(&mut self) {
        if self.lifecycle == Lifecycle::Handshaking && self.local_settings_acked && self.remote_settings_received {
            self.lifecycle = Lifecycle::Open;
        }
    }

    // ---- public façade (§4.7) -------------------------------------------------

    #[must_use]
    pub fn open(&self) -> bool {
        self.lifecycle != Lifecycle::Closed
    }

    #[must_use]
    pub fn open_dir(&self, dir: Direction) -> bool {
        match dir {
            Direction::Read => self.lifecycle != Lifecycle::Closed,
            Direction::Write => self.lifecycle != Lifecycle::Closed && !self.goaway_received,
        }
    }

    #[must_use]
    pub fn open_request_count(&self) -> usize {
        self.streams.open_request_count()
    }

    #[must_use]
    pub fn connection_error(&self) -> Option<&Http2Error> {
        self.connection_error.as_ref()
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn controlling_process(&mut self, owner: impl Into<String>) {
        self.controlling_owner = Some(owner.into());
    }

    pub fn put_private(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.private.insert(key.into(), value);
    }

    #[must_use]
    pub fn get_private(&self, key: &str) -> Option<&[u8]> {
        self.private.get(key).map(Vec::as_slice)
    }

    #[must_use]
    pub fn get_socket(&self) -> Option<String> {
        self.transport.peer_addr()
    }

    pub fn get_server_setting(&self, name: &str) -> Result<u32, crate::error::ArgumentError> {
        let param = crate::settings::parameter_by_name(name)
            .ok_or_else(|| crate::error::ArgumentError::UnknownSetting(name.to_string()))?;
        Ok(self.remote_settings.get(param))
    }

    pub fn put_settings(&mut self, update: &SettingsUpdate) -> Result<(), TransportError> {
        let pairs: Vec<_> = update.iter().collect();
        update.apply_to(&mut self.local_settings);
        self.decoder.resize(self.local_settings.header_table_size);
        self.send_frame(frame::encode_settings(false, &pairs))
    }

    pub fn get_window_size(&self, scope: WindowScope, request_ref: Option<RequestRef>) -> Result<i64, crate::error::ArgumentError> {
        match scope {
            WindowScope::Connection => Ok(self.send_window.available()),
            WindowScope::Request => {
                let request_ref = request_ref.ok_or(crate::error::ArgumentError::UnknownRequest)?;
                self.streams
                    .find_by_ref(request_ref)
                    .map(|s| s.send_window.available())
                    .ok_or(crate::error::ArgumentError::UnknownRequest)
            }
        }
    }

    /// Enqueues an outbound PING, returning a caller-held handle (§4.6).
    pub fn ping(&mut self, opaque: Option<[u8; 8]>) -> Result<u64, TransportError> {
        self.ping_counter += 1;
        let handle = self.ping_counter;
        let data = opaque.unwrap_or_else(|| {
            let mut bytes = [0u8; 8];
            bytes[..8].copy_from_slice(&handle.to_be_bytes());
            bytes
        });
        self.ping_queue.push_back((handle, data));
        self.send_frame(frame::encode_ping(false, data))?;
        Ok(handle)
    }

    /// Sends a new request (§4.7).
    pub fn request(
        &mut self,
        method: Method,
        path: &str,
        headers: Headers,
        body: RequestBody,
    ) -> Result<RequestRef, Http2Error> {
        if self.lifecycle == Lifecycle::Closed {
            return Err(Http2Error::Closed);
        }
        if self.goaway_received {
            return Err(Http2Error::ClosedForWriting);
        }

        let full_headers = build_request_headers(&method, &self.authority, &self.scheme, path, &headers, &body);
        let approx_size: usize = full_headers.iter().map(|(k, v)| k.len() + v.len() + 32).sum();
        if approx_size as u32 > self.remote_settings.max_header_list_size {
            return Err(Http2Error::MaxHeaderListSizeExceeded {
                size: approx_size,
                limit: self.remote_settings.max_header_list_size,
            });
        }

        let (mut stream, request_ref) = self.streams.insert_client_stream(
            self.streams.open_request_count(),
            self.remote_settings.max_concurrent_streams,
            self.remote_settings.initial_window_size,
            self.local_settings.initial_window_size,
        )?;

        let fixed_body: Option<Bytes> = match &body {
            RequestBody::Fixed(bytes) if !bytes.is_empty() => Some(bytes.clone()),
            _ => None,
        };
        let end_stream_on_headers = fixed_body.is_none() && !matches!(body, RequestBody::Streaming);

        if let Some(bytes) = &fixed_body {
            let available = self.send_window.available().min(stream.send_window.available());
            if bytes.len() as i64 > available {
                let scope = if self.send_window.available() < stream.send_window.available() {
                    WindowScope::Connection
                } else {
                    WindowScope::Request
                };
                self.streams.close_and_drain(stream.id);
                return Err(Http2Error::ExceedsWindowSize { scope, window: available });
            }
        }

        let header_block = self.encoder.encode(&full_headers);
        let frames = frame::encode_headers_split(stream.id, end_stream_on_headers, &header_block, self.remote_settings.max_frame_size);
        for f in frames {
            self.send_frame(f).map_err(|e| Http2Error::ProtocolError(format!("transport error sending headers: {e}")))?;
        }
        stream.on_client_headers_sent(end_stream_on_headers);

        if let Some(bytes) = fixed_body {
            self.send_window.consume(bytes.len() as u32, WindowScope::Connection)?;
            stream.consume_send_window(bytes.len() as u32)?;
            let data_frames = frame::encode_data_split(stream.id, &bytes, true, self.remote_settings.max_frame_size);
            for f in data_frames {
                self.send_frame(f).map_err(|e| Http2Error::ProtocolError(format!("transport error sending data: {e}")))?;
            }
            stream.on_client_end_stream();
        } else if matches!(body, RequestBody::Streaming) {
            stream.request_streaming = true;
        }

        *self.streams.find_by_id_mut(stream.id).expect("just inserted") = stream;
        Ok(request_ref)
    }

    /// Feeds the next chunk of a streaming request body (§4.7).
    pub fn stream_request_body(&mut self, request_ref: RequestRef, chunk: StreamChunk) -> Result<(), Http2Error> {
        if self.lifecycle == Lifecycle::Closed {
            return Err(Http2Error::Closed);
        }
        if self.goaway_received {
            return Err(Http2Error::ClosedForWriting);
        }
        let id = self.streams.id_for_ref(request_ref).ok_or(Http2Error::UnknownRequestToStream)?;
        let max_frame_size = self.remote_settings.max_frame_size;

        match chunk {
            StreamChunk::Data(bytes) => {
                let stream = self.streams.find_by_id_mut(id).ok_or(Http2Error::UnknownRequestToStream)?;
                if !stream.request_streaming {
                    return Err(Http2Error::RequestIsNotStreaming);
                }
                let available = self.send_window.available().min(stream.send_window.available());
                if bytes.len() as i64 > available {
                    let scope = if self.send_window.available() < stream.send_window.available() {
                        WindowScope::Connection
                    } else {
                        WindowScope::Request
                    };
                    return Err(Http2Error::ExceedsWindowSize { scope, window: available });
                }
                self.send_window.consume(bytes.len() as u32, WindowScope::Connection)?;
                let stream = self.streams.find_by_id_mut(id).expect("looked up above");
                stream.consume_send_window(bytes.len() as u32)?;
                let frames = frame::encode_data_split(id, &bytes, false, max_frame_size);
                for f in frames {
                    self.send_frame(f).map_err(|e| Http2Error::ProtocolError(format!("transport error: {e}")))?;
                }
                Ok(())
            }
            StreamChunk::Eof => {
                let stream = self.streams.find_by_id_mut(id).ok_or(Http2Error::UnknownRequestToStream)?;
                if !stream.request_streaming {
                    return Err(Http2Error::RequestIsNotStreaming);
                }
                self.send_frame(frame::encode_data(id, true, &[])).map_err(|e| Http2Error::ProtocolError(format!("transport error: {e}")))?;
                self.streams.find_by_id_mut(id).expect("looked up above").on_client_end_stream();
                Ok(())
            }
            StreamChunk::EofWithTrailers(trailers) => {
                {
                    let stream = self.streams.find_by_id_mut(id).ok_or(Http2Error::UnknownRequestToStream)?;
                    if !stream.request_streaming {
                        return Err(Http2Error::RequestIsNotStreaming);
                    }
                }
                let validated = validate_trailers(&trailers)?;
                let block = self.encoder.encode(&validated);
                let frames = frame::encode_headers_split(id, true, &block, max_frame_size);
                for f in frames {
                    self.send_frame(f).map_err(|e| Http2Error::ProtocolError(format!("transport error: {e}")))?;
                }
                self.streams.find_by_id_mut(id).expect("looked up above").on_client_end_stream();
                Ok(())
            }
        }
    }

    /// Cancels a live request (§4.7). A no-op if the request is already
    /// unknown or closed — idempotent per §8.
    pub fn cancel_request(&mut self, request_ref: RequestRef) {
        let Some(id) = self.streams.id_for_ref(request_ref) else { return };
        let Some(stream) = self.streams.find_by_id_mut(id) else { return };
        if stream.is_closed() {
            return;
        }
        stream.cancel();
        let _ = self.send_frame(frame::encode_reset_stream(id, ErrorCode::Cancel));
        self.streams.close_and_drain(id);
    }

    /// Sends GOAWAY(no_error) and closes the transport (§4.6). Idempotent.
    pub fn close(&mut self) {
        if self.lifecycle == Lifecycle::Closed {
            let _ = self.transport.close();
            return;
        }
        if !self.goaway_sent {
            let last = self.streams.highest_client_id();
            let _ = self.send_frame(frame::encode_goaway(last, ErrorCode::NoError, &[]));
            self.goaway_sent = true;
        }
        let _ = self.transport.close();
        self.lifecycle = Lifecycle::Closed;
    }

    /// Only legal in `Mode::Passive` (§4.7).
    pub fn recv(&mut self, min_bytes: usize, timeout: Duration) -> Result<StreamOutcome, crate::error::ArgumentError> {
        if self.mode != Mode::Passive {
            return Err(crate::error::ArgumentError::RecvNotInPassiveMode);
        }
        let msg = match self.transport.recv(min_bytes, timeout) {
            Ok(bytes) => TransportMessage::Bytes(bytes),
            Err(e) => TransportMessage::Error(e),
        };
        Ok(self.stream(msg))
    }

    /// Processes one transport-delivered message (§4.7).
    pub fn stream(&mut self, msg: TransportMessage) -> StreamOutcome {
        match msg {
            TransportMessage::Closed => StreamOutcome::TransportFailed(TransportError::Closed),
            TransportMessage::Error(e) => StreamOutcome::TransportFailed(e),
            TransportMessage::Bytes(bytes) => self.ingest(&bytes),
        }
    }

    fn ingest(&mut self, bytes: &[u8]) -> StreamOutcome {
        let mut buf = BytesMut::from(bytes);
        let mut events = Vec::new();
        loop {
            let decoded = frame::decode_frame(&mut buf, self.local_settings.max_frame_size);
            let frame = match decoded {
                Ok(Some(f)) => f,
                Ok(None) => break,
                Err(e) => return self.fail_connection(e, events),
            };
            if let Err(e) = self.dispatch(frame, &mut events) {
                match e {
                    DispatchError::Fatal(err) => return self.fail_connection(err, events),
                    DispatchError::Transport(err) => return StreamOutcome::TransportFailed(err),
                }
            }
        }
        StreamOutcome::Ok(events)
    }

    fn fail_connection(&mut self, err: Http2Error, events: Vec<ResponseEvent>) -> StreamOutcome {
        error!("connection-fatal error, sending GOAWAY: {err}");
        let code = match &err {
            Http2Error::CompressionError(_) => ErrorCode::CompressionError,
            Http2Error::FrameSizeError(_) => ErrorCode::FrameSizeError,
            Http2Error::FlowControlError(_) => ErrorCode::FlowControlError,
            _ => ErrorCode::ProtocolError,
        };
        let last = self.streams.highest_client_id();
        let _ = self.send_frame(frame::encode_goaway(last, code, err.to_string().as_bytes()));
        let _ = self.transport.close();
        self.lifecycle = Lifecycle::Closed;
        StreamOutcome::ProtocolFatal(err, events)
    }

    fn unknown_stream_is_fatal(&self, stream_id: StreamId) -> bool {
        if stream_id % 2 == 0 {
            stream_id > self.streams.last_reserved_server_id()
        } else {
            stream_id > self.streams.highest_client_id()
        }
    }

    #[allow(clippy::too_many_lines)]
    fn dispatch(&mut self, f: Frame, events: &mut Vec<ResponseEvent>) -> Result<(), DispatchError> {
        if let Some(pending) = &self.pending_header_block {
            let ok = matches!(&f, Frame::Continuation { stream_id, .. } if *stream_id == pending.stream_id);
            if !ok {
                return Err(DispatchError::Fatal(Http2Error::ProtocolError(
                    "headers are streaming but got a different frame".into(),
                )));
            }
        }

        match f {
            Frame::Settings { ack, params } => self.on_settings(ack, params, events),
            Frame::Ping { ack, data } => self.on_ping(ack, data, events),
            Frame::GoAway { last_stream_id, error_code, debug_data } => {
                self.on_goaway(last_stream_id, error_code, debug_data, events);
                Ok(())
            }
            Frame::WindowUpdate { stream_id, increment } => self.on_window_update(stream_id, increment, events),
            Frame::ResetStream { stream_id, error_code } => self.on_reset_stream(stream_id, error_code, events),
            Frame::Priority { .. } => Ok(()),
            Frame::Data { stream_id, end_stream, data } => self.on_data(stream_id, end_stream, data, events),
            Frame::Headers { stream_id, end_stream, end_headers, fragment } => {
                self.on_headers(stream_id, end_stream, end_headers, fragment, events)
            }
            Frame::PushPromise { stream_id, end_headers, promised_stream_id, fragment } => {
                self.on_push_promise(stream_id, end_headers, promised_stream_id, fragment, events)
            }
            Frame::Continuation { stream_id: _, end_headers, fragment } => self.on_continuation(end_headers, fragment, events),
            Frame::Unknown { .. } => Ok(()),
        }
    }

    fn on_settings(&mut self, ack: bool, params: Vec<(crate::settings::SettingsParameter, u32)>, events: &mut Vec<ResponseEvent>) -> Result<(), DispatchError> {
        if ack {
            let first_time = self.lifecycle == Lifecycle::Handshaking;
            self.local_settings_acked = true;
            self.maybe_complete_handshake();
            if !first_time || self.enable_async_settings {
                events.push(ResponseEvent::SettingsAck);
            }
            return Ok(());
        }

        let mut candidate = self.remote_settings;
        for (param, value) in &params {
            candidate
                .apply(*param, *value)
                .map_err(|msg| DispatchError::Fatal(Http2Error::ProtocolError(msg)))?;
        }

        let previous_initial_window = self.remote_settings.initial_window_size;
        self.remote_settings = candidate;
        let delta = i64::from(self.remote_settings.initial_window_size) - i64::from(previous_initial_window);
        if delta != 0 {
            for stream in self.streams.iter_mut() {
                stream.adjust_send_window_by_delta(delta);
            }
        }
        self.encoder.resize(self.remote_settings.header_table_size);

        let first_time = self.lifecycle == Lifecycle::Handshaking;
        self.remote_settings_received = true;
        self.maybe_complete_handshake();

        self.send_frame(frame::encode_settings(true, &[]))
            .map_err(DispatchError::Transport)?;

        if !first_time || self.enable_async_settings {
            events.push(ResponseEvent::Settings);
        }
        Ok(())
    }

    fn on_ping(&mut self, ack: bool, data: [u8; 8], events: &mut Vec<ResponseEvent>) -> Result<(), DispatchError> {
        if ack {
            match self.ping_queue.front() {
                Some((_, front_data)) if *front_data == data => {
                    let (handle, _) = self.ping_queue.pop_front().unwrap();
                    events.push(ResponseEvent::Pong { ping_ref: handle });
                }
                Some(_) => warn!("PING ack data did not match the head of the queue"),
                None => warn!("unsolicited PING ack received"),
            }
            Ok(())
        } else {
            self.send_frame(frame::encode_ping(true, data)).map_err(DispatchError::Transport)
        }
    }

    fn on_goaway(&mut self, last_stream_id: StreamId, error_code: ErrorCode, debug_data: Bytes, events: &mut Vec<ResponseEvent>) {
        self.goaway_received = true;
        for id in self.streams.client_ids_above(last_stream_id) {
            if let Some(stream) = self.streams.find_by_id(id) {
                events.push(ResponseEvent::Error { request_ref: stream.request_ref, error: Http2Error::Unprocessed });
            }
            self.streams.close_and_drain(id);
        }
        if error_code != ErrorCode::NoError {
            let debug = String::from_utf8_lossy(&debug_data).to_string();
            error!("received GOAWAY({error_code:?}): {debug}");
            self.connection_error = Some(Http2Error::ServerClosedConnection { code: error_code, debug });
        }
    }

    fn on_window_update(&mut self, stream_id: StreamId, increment: u32, events: &mut Vec<ResponseEvent>) -> Result<(), DispatchError> {
        if stream_id == 0 {
            return self
                .send_window
                .increment(increment, WindowScope::Connection)
                .map_err(DispatchError::Fatal);
        }
        let Some(stream) = self.streams.find_by_id_mut(stream_id) else {
            if self.unknown_stream_is_fatal(stream_id) {
                return Err(DispatchError::Fatal(Http2Error::ProtocolError(format!(
                    "frame with stream ID {stream_id} has not been opened yet"
                ))));
            }
            return Ok(());
        };
        if stream.increment_send_window(increment).is_err() {
            let request_ref = stream.request_ref;
            events.push(ResponseEvent::Error { request_ref, error: Http2Error::FlowControlError(format!("stream {stream_id} window overflow")) });
            let _ = self.send_frame(frame::encode_reset_stream(stream_id, ErrorCode::FlowControlError));
            self.streams.close_and_drain(stream_id);
        }
        Ok(())
    }

    fn on_reset_stream(&mut self, stream_id: StreamId, error_code: ErrorCode, events: &mut Vec<ResponseEvent>) -> Result<(), DispatchError> {
        let Some(stream) = self.streams.find_by_id_mut(stream_id) else {
            if self.unknown_stream_is_fatal(stream_id) {
                return Err(DispatchError::Fatal(Http2Error::ProtocolError(format!(
                    "frame with stream ID {stream_id} has not been opened yet"
                ))));
            }
            return Ok(());
        };
        if stream.is_closed() {
            return Ok(());
        }
        let request_ref = stream.request_ref;
        stream.apply_rst_received();
        events.push(ResponseEvent::Error { request_ref, error: Http2Error::ServerClosedRequest(error_code) });
        self.streams.close_and_drain(stream_id);
        Ok(())
    }

    fn on_data(&mut self, stream_id: StreamId, end_stream: bool, data: Bytes, events: &mut Vec<ResponseEvent>) -> Result<(), DispatchError> {
        let Some(stream) = self.streams.find_by_id_mut(stream_id) else {
            if self.unknown_stream_is_fatal(stream_id) {
                return Err(DispatchError::Fatal(Http2Error::ProtocolError(format!(
                    "frame with stream ID {stream_id} has not been opened yet"
                ))));
            }
            return Ok(());
        };
        if stream.is_closed() {
            return Ok(());
        }

        let conn_update = self
            .recv_window
            .on_received(data.len() as u32, WindowScope::Connection)
            .map_err(DispatchError::Fatal)?;
        let stream = self.streams.find_by_id_mut(stream_id).expect("looked up above");
        let stream_update = stream
            .recv_window
            .on_received(data.len() as u32, WindowScope::Request)
            .map_err(DispatchError::Fatal)?;
        let request_ref = stream.request_ref;

        if !self.goaway_sent {
            if let Some(increment) = conn_update {
                self.send_frame(frame::encode_window_update(0, increment)).map_err(DispatchError::Transport)?;
            }
            if let Some(increment) = stream_update {
                self.send_frame(frame::encode_window_update(stream_id, increment)).map_err(DispatchError::Transport)?;
            }
        }

        events.push(ResponseEvent::Data { request_ref, chunk: data });

        if end_stream {
            let stream = self.streams.find_by_id_mut(stream_id).expect("looked up above");
            stream.apply_recv_end_stream();
            let closed = stream.is_closed();
            events.push(ResponseEvent::Done { request_ref });
            if closed {
                self.streams.close_and_drain(stream_id);
            }
        }
        Ok(())
    }

    fn on_headers(
        &mut self,
        stream_id: StreamId,
        end_stream: bool,
        end_headers: bool,
        fragment: Bytes,
        events: &mut Vec<ResponseEvent>,
    ) -> Result<(), DispatchError> {
        if self.streams.find_by_id(stream_id).is_none() && self.unknown_stream_is_fatal(stream_id) {
            return Err(DispatchError::Fatal(Http2Error::ProtocolError(format!(
                "frame with stream ID {stream_id} has not been opened yet"
            ))));
        }
        if self.streams.find_by_id(stream_id).map(Stream::is_closed).unwrap_or(true) {
            return Ok(());
        }

        if !end_headers {
            self.pending_header_block = Some(PendingHeaderBlock {
                stream_id,
                kind: HeaderKind::Headers,
                buffer: BytesMut::from(&fragment[..]),
                end_stream,
                promised_stream_id: 0,
            });
            return Ok(());
        }

        let headers = self.decoder.decode(&fragment).map_err(DispatchError::Fatal)?;
        self.finish_headers(stream_id, headers, end_stream, events)
    }

    fn on_push_promise(
        &mut self,
        stream_id: StreamId,
        end_headers: bool,
        promised_stream_id: StreamId,
        fragment: Bytes,
        events: &mut Vec<ResponseEvent>,
    ) -> Result<(), DispatchError> {
        if !end_headers {
            self.pending_header_block = Some(PendingHeaderBlock {
                stream_id,
                kind: HeaderKind::PushPromise,
                buffer: BytesMut::from(&fragment[..]),
                end_stream: false,
                promised_stream_id,
            });
            return Ok(());
        }
        let headers = self.decoder.decode(&fragment).map_err(DispatchError::Fatal)?;
        self.finish_push_promise(stream_id, promised_stream_id, headers, events)
    }

    fn on_continuation(&mut self, end_headers: bool, fragment: Bytes, events: &mut Vec<ResponseEvent>) -> Result<(), DispatchError> {
        let Some(pending) = &mut self.pending_header_block else {
            return Err(DispatchError::Fatal(Http2Error::ProtocolError(
                "CONTINUATION received outside of headers streaming".into(),
            )));
        };
        pending.buffer.extend_from_slice(&fragment);
        if !end_headers {
            return Ok(());
        }
        let pending = self.pending_header_block.take().unwrap();
        let headers = self.decoder.decode(&pending.buffer).map_err(DispatchError::Fatal)?;
        match pending.kind {
            HeaderKind::Headers => self.finish_headers(pending.stream_id, headers, pending.end_stream, events),
            HeaderKind::PushPromise => self.finish_push_promise(pending.stream_id, pending.promised_stream_id, headers, events),
        }
    }

    fn finish_headers(&mut self, stream_id: StreamId, headers: Headers, end_stream: bool, events: &mut Vec<ResponseEvent>) -> Result<(), DispatchError> {
        let Some(stream) = self.streams.find_by_id_mut(stream_id) else { return Ok(()) };
        let request_ref = stream.request_ref;
        let is_trailers = stream.has_received_final_status();

        if is_trailers {
            if !end_stream {
                self.fail_stream(stream_id, events, Http2Error::ProtocolError("trailing headers didn't set END_STREAM".into()));
                return Ok(());
            }
            events.push(ResponseEvent::Headers { request_ref, headers: join_cookies(&strip_pseudo_headers(headers)) });
            self.finish_end_stream(stream_id, events);
            return Ok(());
        }

        let status_value = headers.iter().find(|(k, _)| k == PSEUDO_STATUS).map(|(_, v)| v.clone());
        let Some(status_value) = status_value else {
            self.fail_stream(stream_id, events, Http2Error::MissingStatusHeader);
            return Ok(());
        };
        let Ok(code) = status_value.parse::<u16>() else {
            self.fail_stream(stream_id, events, Http2Error::MissingStatusHeader);
            return Ok(());
        };
        let class = if (100..200).contains(&code) { StatusClass::Informational } else { StatusClass::Final };

        if class == StatusClass::Informational && end_stream {
            self.fail_stream(stream_id, events, Http2Error::ProtocolError("1xx must not set END_STREAM".into()));
            return Ok(());
        }

        let stream = self.streams.find_by_id_mut(stream_id).expect("looked up above");
        if let Err(e) = stream.note_status(class) {
            self.fail_stream(stream_id, events, e);
            return Ok(());
        }

        events.push(ResponseEvent::Status { request_ref, code });
        events.push(ResponseEvent::Headers { request_ref, headers: join_cookies(&strip_pseudo_headers(headers)) });

        if end_stream {
            self.finish_end_stream(stream_id, events);
        }
        Ok(())
    }

    fn finish_end_stream(&mut self, stream_id: StreamId, events: &mut Vec<ResponseEvent>) {
        let Some(stream) = self.streams.find_by_id_mut(stream_id) else { return };
        let request_ref = stream.request_ref;
        stream.apply_recv_end_stream();
        let closed = stream.is_closed();
        events.push(ResponseEvent::Done { request_ref });
        if closed {
            self.streams.close_and_drain(stream_id);
        }
    }

    fn finish_push_promise(&mut self, parent_stream_id: StreamId, promised_stream_id: StreamId, headers: Headers, events: &mut Vec<ResponseEvent>) -> Result<(), DispatchError> {
        let Some(parent) = self.streams.find_by_id(parent_stream_id) else { return Ok(()) };
        let parent_ref = parent.request_ref;

        let new_ref = self
            .streams
            .reserve_server_stream(promised_stream_id, self.remote_settings.initial_window_size, self.local_settings.initial_window_size)
            .map_err(DispatchError::Fatal)?;

        events.push(ResponseEvent::PushPromise {
            parent_ref,
            new_ref,
            headers: strip_pseudo_headers(headers),
        });

        if self.streams.live_stream_count() as u64 > u64::from(self.local_settings.max_concurrent_streams) {
            let _ = self.send_frame(frame::encode_reset_stream(promised_stream_id, ErrorCode::RefusedStream));
            self.streams.close_and_drain(promised_stream_id);
        }
        Ok(())
    }

    fn fail_stream(&mut self, stream_id: StreamId, events: &mut Vec<ResponseEvent>, error: Http2Error) {
        let Some(stream) = self.streams.find_by_id_mut(stream_id) else { return };
        let request_ref = stream.request_ref;
        events.push(ResponseEvent::Error { request_ref, error });
        let _ = self.send_frame(frame::encode_reset_stream(stream_id, ErrorCode::ProtocolError));
        self.streams.close_and_drain(stream_id);
    }
}

enum DispatchError {
    Fatal(Http2Error),
    Transport(TransportError),
}

/// What `stream_request_body` accepts (§4.7).
#[derive(Debug, Clone)]
pub enum StreamChunk {
    Data(Bytes),
    Eof,
    EofWithTrailers(Headers),
}
