//! The response event stream (§4.8, DESIGN NOTES "Response events"):
//! replaces the teacher's buffered `Response` struct (`src/response.rs`,
//! which accumulated one full `{headers, body}` behind a `oneshot`) with an
//! ordered tagged-sum-type sequence, since this core streams events as
//! frames arrive instead of resolving a single future per request.

use crate::error::Http2Error;
use crate::types::{Headers, RequestRef};
use bytes::Bytes;

/// One event surfaced to the caller from [`crate::connection::Connection::stream`]
/// or [`crate::connection::Connection::recv`]. Per-stream ordering (§4.8):
/// one status (or a 1xx chain followed by a final), then headers, then
/// interleaved data/trailer-headers, then exactly one terminal event.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    Status { request_ref: RequestRef, code: u16 },
    Headers { request_ref: RequestRef, headers: Headers },
    Data { request_ref: RequestRef, chunk: Bytes },
    Done { request_ref: RequestRef },
    Error { request_ref: RequestRef, error: Http2Error },
    PushPromise {
        parent_ref: RequestRef,
        new_ref: RequestRef,
        headers: Headers,
    },
    Settings,
    SettingsAck,
    Pong { ping_ref: u64 },
}

/// Joins repeated `Cookie` request-header values with `"; "` (§4.8),
/// preserving the order the caller supplied them in.
#[must_use]
pub fn join_cookies(headers: &Headers) -> Headers {
    let mut out = Headers::new();
    let mut cookie_parts: Vec<&str> = Vec::new();
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("cookie") {
            cookie_parts.push(value);
        } else {
            out.push((name.clone(), value.clone()));
        }
    }
    if !cookie_parts.is_empty() {
        out.push(("cookie".to_string(), cookie_parts.join("; ")));
    }
    out
}

/// Strips pseudo-headers from a decoded header block before it is
/// delivered to the caller (§4.8).
#[must_use]
pub fn strip_pseudo_headers(headers: Headers) -> Headers {
    headers
        .into_iter()
        .filter(|(name, _)| !crate::types::is_pseudo_header(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_multiple_cookies_in_order() {
        let headers: Headers = vec![
            ("cookie".into(), "a=1".into()),
            ("accept".into(), "*/*".into()),
            ("cookie".into(), "b=2".into()),
        ];
        let joined = join_cookies(&headers);
        assert_eq!(joined, vec![("accept".to_string(), "*/*".to_string()), ("cookie".to_string(), "a=1; b=2".to_string())]);
    }

    #[test]
    fn strips_pseudo_headers() {
        let headers: Headers = vec![(":status".into(), "200".into()), ("x-a".into(), "1".into())];
        assert_eq!(strip_pseudo_headers(headers), vec![("x-a".to_string(), "1".to_string())]);
    }
}
