//! Error taxonomy (SPEC_FULL §7): protocol-level faults, transport I/O
//! faults, and programmer-misuse faults are distinct kinds that are never
//! collapsed into one another.

use crate::types::ErrorCode;

/// A fault in the HTTP/2 protocol, classified into connection-scope and
/// stream-scope reasons. Stream-scope reasons are delivered as
/// `{:error, ref, reason}` response events without closing the connection;
/// connection-scope reasons additionally drive a GOAWAY and a transition to
/// `closed` (see [`crate::connection::Connection`]).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Http2Error {
    #[error("the connection is closed")]
    Closed,

    #[error("the connection is closed for writing")]
    ClosedForWriting,

    #[error("request was not processed by the server and can be retried on a new connection")]
    Unprocessed,

    #[error("too many concurrent requests")]
    TooManyConcurrentRequests,

    #[error("the server closed the request with error code {0:?}")]
    ServerClosedRequest(ErrorCode),

    #[error("the server closed the connection with error code {code:?}: {debug}")]
    ServerClosedConnection { code: ErrorCode, debug: String },

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("compression error: {0}")]
    CompressionError(String),

    #[error("frame size error: {0}")]
    FrameSizeError(String),

    #[error("flow control error: {0}")]
    FlowControlError(String),

    #[error("max header list size exceeded: {size} > {limit}")]
    MaxHeaderListSizeExceeded { size: usize, limit: u32 },

    #[error("request body exceeds the {scope:?} flow control window ({window})")]
    ExceedsWindowSize { scope: WindowScope, window: i64 },

    #[error("final response headers are missing :status")]
    MissingStatusHeader,

    #[error("request is not streaming")]
    RequestIsNotStreaming,

    #[error("unknown request reference")]
    UnknownRequestToStream,

    #[error("trailing header {name} is not allowed: {value}")]
    UnallowedTrailingHeader { name: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowScope {
    Connection,
    Request,
}

/// I/O faults reported by the owner-supplied [`crate::transport::Transport`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("transport operation timed out")]
    Timeout,
    #[error("connect timed out")]
    ETimeout,
    #[error("name resolution failed")]
    NxDomain,
    #[error("connection refused")]
    EConnRefused,
    #[error("tls error: {0}")]
    SslError(String),
    #[error("{0}")]
    Other(String),
}

/// Programmer misuse of the façade. Never placed into a response list;
/// always returned (or, for `recv` in the wrong mode, returned as a
/// `Result::Err`) synchronously at the call site that misused the API.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("unknown setting: {0}")]
    UnknownSetting(String),

    #[error("setting {setting} must be an integer in range {low}..={high}, got {value}")]
    InvalidSettingValue {
        setting: String,
        value: u32,
        low: u32,
        high: u32,
    },

    #[error("can't use recv/3 on an active-mode connection")]
    RecvNotInPassiveMode,

    #[error("unknown request reference")]
    UnknownRequest,
}
