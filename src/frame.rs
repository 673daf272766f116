//! The frame codec (§4.1): length-prefixed framing, flag decoding,
//! frame-size/reserved-bit validation, and HEADERS/CONTINUATION/DATA
//! splitting. Grounded on the teacher's `src/frame.rs` (9-byte header
//! layout, `FrameType` via `num-traits`), generalized to the full
//! validation and splitting rules the teacher never implemented.

use crate::error::Http2Error;
use crate::flags::*;
use crate::settings::SettingsParameter;
use crate::types::{ErrorCode, StreamId, MAX_STREAM_ID};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_derive::{FromPrimitive, ToPrimitive};

/// The 24-byte client connection preface (§6), sent before any frame.
pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub const FRAME_HEADER_LEN: usize = 9;

/// https://httpwg.org/specs/rfc7540.html#FrameTypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    ResetStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    GoAway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

impl FrameType {
    #[must_use]
    pub fn from_wire(value: u8) -> Option<Self> {
        num_traits::FromPrimitive::from_u8(value)
    }

    #[must_use]
    pub fn to_wire(self) -> u8 {
        num_traits::ToPrimitive::to_u8(&self).expect("FrameType is repr(u8)")
    }
}

/// A decoded frame. `Unknown` is the passthrough the RFC's extension rule
/// requires (§4.1): any frame type this codec doesn't recognize (e.g. an
/// ORIGIN frame, type 12) must be ignored rather than rejected.
#[derive(Debug, Clone)]
pub enum Frame {
    Data {
        stream_id: StreamId,
        end_stream: bool,
        data: Bytes,
    },
    Headers {
        stream_id: StreamId,
        end_stream: bool,
        end_headers: bool,
        fragment: Bytes,
    },
    Priority {
        stream_id: StreamId,
        exclusive: bool,
        dependency: StreamId,
        weight: u8,
    },
    ResetStream {
        stream_id: StreamId,
        error_code: ErrorCode,
    },
    Settings {
        ack: bool,
        params: Vec<(SettingsParameter, u32)>,
    },
    PushPromise {
        stream_id: StreamId,
        end_headers: bool,
        promised_stream_id: StreamId,
        fragment: Bytes,
    },
    Ping {
        ack: bool,
        data: [u8; 8],
    },
    GoAway {
        last_stream_id: StreamId,
        error_code: ErrorCode,
        debug_data: Bytes,
    },
    WindowUpdate {
        stream_id: StreamId,
        increment: u32,
    },
    Continuation {
        stream_id: StreamId,
        end_headers: bool,
        fragment: Bytes,
    },
    Unknown {
        frame_type: u8,
        stream_id: StreamId,
    },
}

impl Frame {
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        match self {
            Frame::Data { stream_id, .. }
            | Frame::Headers { stream_id, .. }
            | Frame::Priority { stream_id, .. }
            | Frame::ResetStream { stream_id, .. }
            | Frame::PushPromise { stream_id, .. }
            | Frame::WindowUpdate { stream_id, .. }
            | Frame::Continuation { stream_id, .. }
            | Frame::Unknown { stream_id, .. } => *stream_id,
            Frame::Settings { .. } | Frame::Ping { .. } | Frame::GoAway { .. } => 0,
        }
    }
}

/// Attempts to decode one frame from the front of `buf`. Returns `Ok(None)`
/// when `buf` does not yet hold a complete frame (the caller should wait for
/// more transport bytes); this is what makes frame decoding insensitive to
/// how the transport happened to fragment its `recv` calls (§8, property 1).
pub fn decode_frame(buf: &mut BytesMut, local_max_frame_size: u32) -> Result<Option<Frame>, Http2Error> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let length = u32::from_be_bytes([0, buf[0], buf[1], buf[2]]) as usize;
    if length as u32 > local_max_frame_size {
        return Err(Http2Error::FrameSizeError(format!(
            "frame length {length} exceeds local SETTINGS_MAX_FRAME_SIZE {local_max_frame_size}"
        )));
    }
    if buf.len() < FRAME_HEADER_LEN + length {
        return Ok(None);
    }

    let raw_type = buf[3];
    let flags = buf[4];
    let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & MAX_STREAM_ID;
    buf.advance(FRAME_HEADER_LEN);
    let payload = buf.split_to(length).freeze();

    decode_payload(raw_type, flags, stream_id, payload)
}

fn conn_level_only(raw_type: &str, stream_id: StreamId) -> Result<(), Http2Error> {
    if stream_id != 0 {
        return Err(Http2Error::ProtocolError(format!(
            "frame {raw_type} only allowed at the connection level"
        )));
    }
    Ok(())
}

fn stream_level_only(raw_type: &str, stream_id: StreamId) -> Result<(), Http2Error> {
    if stream_id == 0 {
        return Err(Http2Error::ProtocolError(format!(
            "frame {raw_type} must be associated with a stream"
        )));
    }
    Ok(())
}

#[allow(clippy::too_many_lines)]
fn decode_payload(
    raw_type: u8,
    flags: u8,
    stream_id: StreamId,
    payload: Bytes,
) -> Result<Option<Frame>, Http2Error> {
    let Some(frame_type) = FrameType::from_wire(raw_type) else {
        return Ok(Some(Frame::Unknown {
            frame_type: raw_type,
            stream_id,
        }));
    };

    let frame = match frame_type {
        FrameType::Data => {
            stream_level_only("DATA", stream_id)?;
            let data_flags = DataFlags::from_bits_truncate(flags);
            let data = strip_padding(payload, data_flags.contains(DataFlags::PADDED))?;
            Frame::Data {
                stream_id,
                end_stream: data_flags.contains(DataFlags::END_STREAM),
                data,
            }
        }
        FrameType::Headers => {
            stream_level_only("HEADERS", stream_id)?;
            let hf = HeadersFlags::from_bits_truncate(flags);
            let mut body = strip_padding(payload, hf.contains(HeadersFlags::PADDED))?;
            if hf.contains(HeadersFlags::PRIORITY) {
                if body.len() < 5 {
                    return Err(Http2Error::FrameSizeError(
                        "HEADERS with PRIORITY shorter than 5 bytes".into(),
                    ));
                }
                body = body.split_off(5);
            }
            Frame::Headers {
                stream_id,
                end_stream: hf.contains(HeadersFlags::END_STREAM),
                end_headers: hf.contains(HeadersFlags::END_HEADERS),
                fragment: body,
            }
        }
        FrameType::Priority => {
            stream_level_only("PRIORITY", stream_id)?;
            if payload.len() != 5 {
                return Err(Http2Error::FrameSizeError(format!(
                    "PRIORITY payload must be 5 bytes, got {}",
                    payload.len()
                )));
            }
            let raw = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
            Frame::Priority {
                stream_id,
                exclusive: raw & 0x8000_0000 != 0,
                dependency: raw & MAX_STREAM_ID,
                weight: payload[4],
            }
        }
        FrameType::ResetStream => {
            stream_level_only("RST_STREAM", stream_id)?;
            if payload.len() != 4 {
                return Err(Http2Error::FrameSizeError(format!(
                    "RST_STREAM payload must be 4 bytes, got {}",
                    payload.len()
                )));
            }
            let code = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
            Frame::ResetStream {
                stream_id,
                error_code: ErrorCode::from_wire(code),
            }
        }
        FrameType::Settings => {
            conn_level_only("SETTINGS", stream_id)?;
            let ack = SettingsFlags::from_bits_truncate(flags).contains(SettingsFlags::ACK);
            if ack && !payload.is_empty() {
                return Err(Http2Error::FrameSizeError(
                    "SETTINGS ACK must have an empty payload".into(),
                ));
            }
            if payload.len() % 6 != 0 {
                return Err(Http2Error::FrameSizeError(format!(
                    "SETTINGS payload length {} is not a multiple of 6",
                    payload.len()
                )));
            }
            let mut params = Vec::with_capacity(payload.len() / 6);
            for chunk in payload.chunks(6) {
                let id = u16::from_be_bytes([chunk[0], chunk[1]]);
                let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
                // unknown settings identifiers MUST be ignored (RFC 7540 §6.5.2).
                if let Some(param) = SettingsParameter::from_wire(id) {
                    params.push((param, value));
                }
            }
            Frame::Settings { ack, params }
        }
        FrameType::PushPromise => {
            stream_level_only("PUSH_PROMISE", stream_id)?;
            let pf = PushPromiseFlags::from_bits_truncate(flags);
            let body = strip_padding(payload, pf.contains(PushPromiseFlags::PADDED))?;
            if body.len() < 4 {
                return Err(Http2Error::FrameSizeError(
                    "PUSH_PROMISE shorter than 4 bytes".into(),
                ));
            }
            let promised_stream_id =
                u32::from_be_bytes([body[0], body[1], body[2], body[3]]) & MAX_STREAM_ID;
            Frame::PushPromise {
                stream_id,
                end_headers: pf.contains(PushPromiseFlags::END_HEADERS),
                promised_stream_id,
                fragment: body.slice(4..),
            }
        }
        FrameType::Ping => {
            conn_level_only("PING", stream_id)?;
            if payload.len() != 8 {
                return Err(Http2Error::FrameSizeError(format!(
                    "PING payload must be 8 bytes, got {}",
                    payload.len()
                )));
            }
            let mut data = [0u8; 8];
            data.copy_from_slice(&payload);
            Frame::Ping {
                ack: PingFlags::from_bits_truncate(flags).contains(PingFlags::ACK),
                data,
            }
        }
        FrameType::GoAway => {
            conn_level_only("GOAWAY", stream_id)?;
            if payload.len() < 8 {
                return Err(Http2Error::FrameSizeError(
                    "GOAWAY shorter than 8 bytes".into(),
                ));
            }
            let last_stream_id =
                u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & MAX_STREAM_ID;
            let code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
            Frame::GoAway {
                last_stream_id,
                error_code: ErrorCode::from_wire(code),
                debug_data: payload.slice(8..),
            }
        }
        FrameType::WindowUpdate => {
            if payload.len() != 4 {
                return Err(Http2Error::FrameSizeError(format!(
                    "WINDOW_UPDATE payload must be 4 bytes, got {}",
                    payload.len()
                )));
            }
            let increment =
                u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & MAX_STREAM_ID;
            if increment == 0 {
                return Err(Http2Error::ProtocolError(
                    "WINDOW_UPDATE increment must not be zero".into(),
                ));
            }
            Frame::WindowUpdate {
                stream_id,
                increment,
            }
        }
        FrameType::Continuation => {
            stream_level_only("CONTINUATION", stream_id)?;
            Frame::Continuation {
                stream_id,
                end_headers: ContinuationFlags::from_bits_truncate(flags)
                    .contains(ContinuationFlags::END_HEADERS),
                fragment: payload,
            }
        }
    };
    Ok(Some(frame))
}

fn strip_padding(payload: Bytes, padded: bool) -> Result<Bytes, Http2Error> {
    if !padded {
        return Ok(payload);
    }
    if payload.is_empty() {
        return Err(Http2Error::FrameSizeError(
            "PADDED frame has no Pad Length byte".into(),
        ));
    }
    let pad_len = payload[0] as usize;
    let payload = payload.slice(1..);
    if pad_len > payload.len() {
        return Err(Http2Error::ProtocolError(
            "padding length exceeds frame payload".into(),
        ));
    }
    let keep = payload.len() - pad_len;
    Ok(payload.slice(0..keep))
}

const MAX_MAX_FRAME_SIZE_USIZE: usize = (1 << 24) - 1;

fn write_frame_header(out: &mut BytesMut, length: usize, frame_type: u8, flags: u8, stream_id: StreamId) {
    debug_assert!(length <= MAX_MAX_FRAME_SIZE_USIZE);
    out.put_u8((length >> 16) as u8);
    out.put_u8((length >> 8) as u8);
    out.put_u8(length as u8);
    out.put_u8(frame_type);
    out.put_u8(flags);
    out.put_u32(stream_id & MAX_STREAM_ID);
}

/// Encodes a DATA frame with no padding.
#[must_use]
pub fn encode_data(stream_id: StreamId, end_stream: bool, data: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + data.len());
    let flags = if end_stream { DataFlags::END_STREAM.bits() } else { 0 };
    write_frame_header(&mut out, data.len(), FrameType::Data.to_wire(), flags, stream_id);
    out.put_slice(data);
    out.freeze()
}

/// Splits a body into one or more DATA frames so that no single frame
/// exceeds `max_frame_size` (§4.1). END_STREAM is carried only by the last
/// fragment. An empty body with `end_stream` still produces exactly one
/// (empty) DATA frame.
#[must_use]
pub fn encode_data_split(stream_id: StreamId, data: &[u8], end_stream: bool, max_frame_size: u32) -> Vec<Bytes> {
    if data.is_empty() {
        return vec![encode_data(stream_id, end_stream, &[])];
    }
    let max = (max_frame_size as usize).max(1);
    let mut out = Vec::with_capacity(data.len() / max + 1);
    let mut chunks = data.chunks(max).peekable();
    while let Some(chunk) = chunks.next() {
        let is_last = chunks.peek().is_none();
        out.push(encode_data(stream_id, end_stream && is_last, chunk));
    }
    out
}

/// Encodes a HEADERS frame (with, possibly, trailing CONTINUATION frames)
/// from an already-HPACK-encoded header block. END_STREAM (if any) is
/// carried by the leading HEADERS frame; END_HEADERS by the final frame in
/// the sequence (§4.1).
#[must_use]
pub fn encode_headers_split(
    stream_id: StreamId,
    end_stream: bool,
    header_block: &[u8],
    max_frame_size: u32,
) -> Vec<Bytes> {
    encode_header_block_split(stream_id, end_stream, header_block, max_frame_size, true, None)
}

/// As [`encode_headers_split`] but for PUSH_PROMISE, which carries the
/// 4-byte promised stream id ahead of the header block in its first frame
/// only.
#[must_use]
pub fn encode_push_promise_split(
    stream_id: StreamId,
    promised_stream_id: StreamId,
    header_block: &[u8],
    max_frame_size: u32,
) -> Vec<Bytes> {
    encode_header_block_split(
        stream_id,
        false,
        header_block,
        max_frame_size,
        false,
        Some(promised_stream_id),
    )
}

fn encode_header_block_split(
    stream_id: StreamId,
    end_stream: bool,
    header_block: &[u8],
    max_frame_size: u32,
    is_headers: bool,
    promised_stream_id: Option<StreamId>,
) -> Vec<Bytes> {
    let max = (max_frame_size as usize).max(1);
    let prefix_len = if promised_stream_id.is_some() { 4 } else { 0 };
    let first_budget = max.saturating_sub(prefix_len).max(1);

    let (first, rest) = if header_block.len() <= first_budget {
        (header_block, &[][..])
    } else {
        header_block.split_at(first_budget)
    };

    let end_headers_on_first = rest.is_empty();
    let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + prefix_len + first.len());
    let (frame_type, flags) = if is_headers {
        let mut f = HeadersFlags::empty();
        if end_stream {
            f |= HeadersFlags::END_STREAM;
        }
        if end_headers_on_first {
            f |= HeadersFlags::END_HEADERS;
        }
        (FrameType::Headers, f.bits())
    } else {
        let mut f = PushPromiseFlags::empty();
        if end_headers_on_first {
            f |= PushPromiseFlags::END_HEADERS;
        }
        (FrameType::PushPromise, f.bits())
    };
    write_frame_header(&mut out, prefix_len + first.len(), frame_type.to_wire(), flags, stream_id);
    if let Some(promised) = promised_stream_id {
        out.put_u32(promised & MAX_STREAM_ID);
    }
    out.put_slice(first);

    let mut frames = vec![out.freeze()];
    let mut remaining = rest;
    while !remaining.is_empty() {
        let (chunk, tail) = if remaining.len() <= max {
            (remaining, &[][..])
        } else {
            remaining.split_at(max)
        };
        let is_last = tail.is_empty();
        let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + chunk.len());
        let flags = if is_last { ContinuationFlags::END_HEADERS.bits() } else { 0 };
        write_frame_header(&mut out, chunk.len(), FrameType::Continuation.to_wire(), flags, stream_id);
        out.put_slice(chunk);
        frames.push(out.freeze());
        remaining = tail;
    }

    frames
}

#[must_use]
pub fn encode_priority(stream_id: StreamId, exclusive: bool, dependency: StreamId, weight: u8) -> Bytes {
    let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + 5);
    write_frame_header(&mut out, 5, FrameType::Priority.to_wire(), 0, stream_id);
    let raw = (dependency & MAX_STREAM_ID) | if exclusive { 0x8000_0000 } else { 0 };
    out.put_u32(raw);
    out.put_u8(weight);
    out.freeze()
}

#[must_use]
pub fn encode_reset_stream(stream_id: StreamId, error_code: ErrorCode) -> Bytes {
    let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + 4);
    write_frame_header(&mut out, 4, FrameType::ResetStream.to_wire(), 0, stream_id);
    out.put_u32(error_code.to_wire());
    out.freeze()
}

#[must_use]
pub fn encode_settings(ack: bool, params: &[(SettingsParameter, u32)]) -> Bytes {
    let len = if ack { 0 } else { params.len() * 6 };
    let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + len);
    let flags = if ack { SettingsFlags::ACK.bits() } else { 0 };
    write_frame_header(&mut out, len, FrameType::Settings.to_wire(), flags, 0);
    if !ack {
        for (param, value) in params {
            out.put_u16(param.to_wire());
            out.put_u32(*value);
        }
    }
    out.freeze()
}

#[must_use]
pub fn encode_ping(ack: bool, data: [u8; 8]) -> Bytes {
    let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + 8);
    let flags = if ack { PingFlags::ACK.bits() } else { 0 };
    write_frame_header(&mut out, 8, FrameType::Ping.to_wire(), flags, 0);
    out.put_slice(&data);
    out.freeze()
}

#[must_use]
pub fn encode_goaway(last_stream_id: StreamId, error_code: ErrorCode, debug_data: &[u8]) -> Bytes {
    let len = 8 + debug_data.len();
    let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + len);
    write_frame_header(&mut out, len, FrameType::GoAway.to_wire(), 0, 0);
    out.put_u32(last_stream_id & MAX_STREAM_ID);
    out.put_u32(error_code.to_wire());
    out.put_slice(debug_data);
    out.freeze()
}

#[must_use]
pub fn encode_window_update(stream_id: StreamId, increment: u32) -> Bytes {
    let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + 4);
    write_frame_header(&mut out, 4, FrameType::WindowUpdate.to_wire(), 0, stream_id);
    out.put_u32(increment & MAX_STREAM_ID);
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(mut bytes: BytesMut, max_frame: u32) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Some(frame) = decode_frame(&mut bytes, max_frame).unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn round_trips_ping() {
        let encoded = encode_ping(false, [1, 2, 3, 4, 5, 6, 7, 8]);
        let frames = decode_all(BytesMut::from(&encoded[..]), 16_384);
        assert!(matches!(frames[0], Frame::Ping { ack: false, data } if data == [1, 2, 3, 4, 5, 6, 7, 8]));
    }

    #[test]
    fn ping_on_a_stream_is_a_protocol_error() {
        let mut out = BytesMut::new();
        write_frame_header(&mut out, 8, FrameType::Ping.to_wire(), 0, 1);
        out.put_slice(&[0u8; 8]);
        let err = decode_frame(&mut out, 16_384).unwrap_err();
        assert!(matches!(err, Http2Error::ProtocolError(m) if m.contains("connection level")));
    }

    #[test]
    fn ping_wrong_size_is_frame_size_error() {
        let mut out = BytesMut::new();
        write_frame_header(&mut out, 4, FrameType::Ping.to_wire(), 0, 0);
        out.put_slice(&[0u8; 4]);
        assert!(matches!(
            decode_frame(&mut out, 16_384).unwrap_err(),
            Http2Error::FrameSizeError(_)
        ));
    }

    #[test]
    fn unknown_frame_type_is_ignored() {
        let mut out = BytesMut::new();
        write_frame_header(&mut out, 3, 12, 0, 0);
        out.put_slice(b"abc");
        let frame = decode_frame(&mut out, 16_384).unwrap().unwrap();
        assert!(matches!(frame, Frame::Unknown { frame_type: 12, .. }));
    }

    #[test]
    fn byte_splitting_does_not_change_decoded_frames() {
        let encoded = encode_settings(false, &[(SettingsParameter::MaxConcurrentStreams, 100)]);
        let whole = decode_all(BytesMut::from(&encoded[..]), 16_384);

        let mut buf = BytesMut::new();
        let mut split = Vec::new();
        for byte in &encoded {
            buf.extend_from_slice(&[*byte]);
            while let Some(frame) = decode_frame(&mut buf, 16_384).unwrap() {
                split.push(frame);
            }
        }
        assert_eq!(whole.len(), split.len());
    }

    #[test]
    fn data_split_sets_end_stream_only_on_last_fragment() {
        let body = vec![7u8; 100];
        let frames = encode_data_split(1, &body, true, 30);
        let decoded: Vec<_> = frames
            .into_iter()
            .map(|b| decode_frame(&mut BytesMut::from(&b[..]), 16_384).unwrap().unwrap())
            .collect();
        assert_eq!(decoded.len(), 4);
        for (i, frame) in decoded.iter().enumerate() {
            if let Frame::Data { end_stream, .. } = frame {
                assert_eq!(*end_stream, i == decoded.len() - 1);
            } else {
                panic!("expected Data frame");
            }
        }
        let mut reassembled = Vec::new();
        for frame in &decoded {
            if let Frame::Data { data, .. } = frame {
                reassembled.extend_from_slice(data);
            }
        }
        assert_eq!(reassembled, body);
    }

    #[test]
    fn headers_split_end_headers_on_final_continuation_only() {
        let block = vec![9u8; 50];
        let frames = encode_headers_split(1, true, &block, 20);
        assert!(frames.len() >= 2);
        let decoded: Vec<_> = frames
            .into_iter()
            .map(|b| decode_frame(&mut BytesMut::from(&b[..]), 16_384).unwrap().unwrap())
            .collect();
        match &decoded[0] {
            Frame::Headers { end_stream, end_headers, .. } => {
                assert!(*end_stream);
                assert!(!*end_headers);
            }
            _ => panic!("expected Headers frame first"),
        }
        for frame in &decoded[1..decoded.len() - 1] {
            assert!(matches!(frame, Frame::Continuation { end_headers: false, .. }));
        }
        assert!(matches!(decoded.last().unwrap(), Frame::Continuation { end_headers: true, .. }));
    }
}
