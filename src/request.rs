//! Request assembly (§4.7): pseudo-header ordering, auto content-length,
//! and the trailer allow-list. Grounded on the teacher's `src/request.rs`
//! (`Method` via `derive_more::Display`, `Request::new`'s pseudo-header
//! list), generalized to the CONNECT special case and the streaming/no-body
//! cases the teacher's `Url`-based constructor never had to consider.

use crate::error::Http2Error;
use crate::event::join_cookies;
use crate::types::{is_pseudo_header, Headers, CONNECTION_SPECIFIC_HEADERS, PSEUDO_AUTHORITY, PSEUDO_METHOD, PSEUDO_PATH, PSEUDO_SCHEME};
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum Method {
    #[display(fmt = "GET")]
    Get,
    #[display(fmt = "POST")]
    Post,
    #[display(fmt = "PUT")]
    Put,
    #[display(fmt = "DELETE")]
    Delete,
    #[display(fmt = "HEAD")]
    Head,
    #[display(fmt = "PATCH")]
    Patch,
    #[display(fmt = "OPTIONS")]
    Options,
    #[display(fmt = "CONNECT")]
    Connect,
    #[display(fmt = "{}", _0)]
    Other(String),
}

/// The three shapes a request body can take (§4.7): a complete byte string
/// known up front, a body the caller will hand over incrementally via
/// `stream_request_body`, or no body at all.
#[derive(Debug, Clone)]
pub enum RequestBody {
    None,
    Fixed(Bytes),
    Streaming,
}

/// Assembles the full outgoing header list for a new request: `:method`,
/// `:authority`, then (for non-CONNECT methods) `:scheme`/`:path`, then any
/// further pseudo-headers the caller supplied explicitly (e.g. `:protocol`
/// for extended CONNECT, RFC 8441), then the caller's regular headers in
/// order, with `content-length` appended automatically for a fixed body
/// that didn't already specify one.
#[must_use]
pub fn build_request_headers(
    method: &Method,
    authority: &str,
    scheme: &str,
    path: &str,
    caller_headers: &Headers,
    body: &RequestBody,
) -> Headers {
    let mut out = Headers::new();
    out.push((PSEUDO_METHOD.to_string(), method.to_string()));
    out.push((PSEUDO_AUTHORITY.to_string(), authority.to_string()));

    if !matches!(method, Method::Connect) {
        out.push((PSEUDO_SCHEME.to_string(), scheme.to_string()));
        out.push((PSEUDO_PATH.to_string(), path.to_string()));
    }

    let caller_headers = join_cookies(caller_headers);
    let mut has_content_length = false;
    for (name, value) in &caller_headers {
        if is_pseudo_header(name) {
            out.push((name.clone(), value.clone()));
        } else {
            if name.eq_ignore_ascii_case("content-length") {
                has_content_length = true;
            }
            out.push((name.clone(), value.clone()));
        }
    }

    if let RequestBody::Fixed(bytes) = body {
        if !has_content_length {
            out.push(("content-length".to_string(), bytes.len().to_string()));
        }
    }

    out
}

/// The `:authority` pseudo-header value: includes the port unless it
/// matches the scheme's default (§4.7).
#[must_use]
pub fn build_authority(host: &str, port: u16, scheme: &str) -> String {
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return format!("{host}:{port}"),
    };
    if port == default_port {
        host.to_string()
    } else {
        format!("{host}:{port}")
    }
}

/// Validates one trailer name/value pair against the same allow-list
/// applied to request headers: no pseudo-headers, no connection-specific
/// headers (§4.7).
pub fn validate_trailer(name: &str, value: &str) -> Result<(String, String), Http2Error> {
    let lower = name.to_ascii_lowercase();
    if is_pseudo_header(&lower) || CONNECTION_SPECIFIC_HEADERS.contains(&lower.as_str()) {
        return Err(Http2Error::UnallowedTrailingHeader {
            name: name.to_string(),
            value: value.to_string(),
        });
    }
    Ok((lower, value.to_string()))
}

#[must_use]
pub fn validate_trailers(trailers: &Headers) -> Result<Headers, Http2Error> {
    trailers
        .iter()
        .map(|(name, value)| validate_trailer(name, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_omits_scheme_and_path() {
        let headers = build_request_headers(&Method::Connect, "example.com:443", "https", "/", &[], &RequestBody::None);
        assert!(!headers.iter().any(|(k, _)| k == PSEUDO_SCHEME));
        assert!(!headers.iter().any(|(k, _)| k == PSEUDO_PATH));
    }

    #[test]
    fn extended_connect_keeps_explicit_protocol_pseudo_header() {
        let caller: Headers = vec![(":protocol".into(), "websocket".into())];
        let headers = build_request_headers(&Method::Connect, "example.com:443", "https", "/", &caller, &RequestBody::None);
        assert_eq!(headers[2], (":protocol".to_string(), "websocket".to_string()));
    }

    #[test]
    fn content_length_added_only_for_fixed_body_without_one() {
        let headers = build_request_headers(&Method::Post, "a", "https", "/", &[], &RequestBody::Fixed(Bytes::from_static(b"abc")));
        assert!(headers.iter().any(|(k, v)| k == "content-length" && v == "3"));

        let headers = build_request_headers(&Method::Post, "a", "https", "/", &[], &RequestBody::Streaming);
        assert!(!headers.iter().any(|(k, _)| k == "content-length"));
    }

    #[test]
    fn authority_omits_default_port() {
        assert_eq!(build_authority("example.com", 443, "https"), "example.com");
        assert_eq!(build_authority("example.com", 8443, "https"), "example.com:8443");
    }

    #[test]
    fn duplicate_cookie_headers_are_joined_on_the_wire() {
        let caller: Headers = vec![
            ("cookie".into(), "a=1".into()),
            ("accept".into(), "*/*".into()),
            ("cookie".into(), "b=2".into()),
        ];
        let headers = build_request_headers(&Method::Get, "a", "https", "/", &caller, &RequestBody::None);
        assert_eq!(headers.iter().filter(|(k, _)| k == "cookie").count(), 1);
        assert!(headers.iter().any(|(k, v)| k == "cookie" && v == "a=1; b=2"));
    }

    #[test]
    fn trailers_reject_connection_specific_and_pseudo_headers() {
        assert!(validate_trailer("connection", "close").is_err());
        assert!(validate_trailer(":status", "200").is_err());
        assert!(validate_trailer("x-checksum", "abc").is_ok());
    }
}
