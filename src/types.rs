//! Wire-level types shared across the codec, stream, and connection layers.

use num_derive::{FromPrimitive, ToPrimitive};
use std::fmt;

/// A stream identifier. Client-initiated ids are odd, server-initiated
/// (pushed) ids are even; both are strictly increasing within a connection
/// (§3 invariants).
pub type StreamId = u32;

/// The largest stream id a 31-bit field can carry.
pub const MAX_STREAM_ID: StreamId = u32::MAX >> 1;

/// https://httpwg.org/specs/rfc7540.html#ErrorCodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl ErrorCode {
    #[must_use]
    pub fn from_wire(value: u32) -> Self {
        num_traits::FromPrimitive::from_u32(value).unwrap_or(ErrorCode::InternalError)
    }

    #[must_use]
    pub fn to_wire(self) -> u32 {
        num_traits::ToPrimitive::to_u32(&self).expect("ErrorCode is repr(u32)")
    }
}

/// An ordered list of header name/value pairs. Order matters: response
/// headers are surfaced in server order (§4.8), and request pseudo-headers
/// must precede regular headers in a fixed sequence (§4.7).
pub type Headers = Vec<(String, String)>;

pub const PSEUDO_METHOD: &str = ":method";
pub const PSEUDO_SCHEME: &str = ":scheme";
pub const PSEUDO_AUTHORITY: &str = ":authority";
pub const PSEUDO_PATH: &str = ":path";
pub const PSEUDO_STATUS: &str = ":status";
pub const PSEUDO_PROTOCOL: &str = ":protocol";

#[must_use]
pub fn is_pseudo_header(name: &str) -> bool {
    name.starts_with(':')
}

/// Headers that MUST NOT appear in an HTTP/2 header block (hop-by-hop
/// connection-specific fields from HTTP/1.1, RFC 7540 §8.1.2.2).
pub const CONNECTION_SPECIFIC_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

/// A caller-facing, opaque handle to a request. Stable for the lifetime of
/// the stream it names; looked up internally through
/// [`crate::stream_table::StreamTable`]'s bidirectional map. Never reused
/// within one connection (DESIGN §9: 64-bit counter + connection nonce).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestRef {
    nonce: u64,
    id: u64,
}

impl fmt::Display for RequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}:{}", self.nonce, self.id)
    }
}

/// Allocates [`RequestRef`]s unique within one connection's lifetime.
#[derive(Debug)]
pub struct RequestRefAllocator {
    nonce: u64,
    next: u64,
}

impl RequestRefAllocator {
    #[must_use]
    pub fn new(nonce: u64) -> Self {
        Self { nonce, next: 0 }
    }

    pub fn allocate(&mut self) -> RequestRef {
        let id = self.next;
        self.next += 1;
        RequestRef {
            nonce: self.nonce,
            id,
        }
    }
}
