//! Structured request model produced by the request decoder.

use crate::protocol::Headers;
use bytes::Bytes;

/// The parsed request line: `METHOD SP TARGET SP "HTTP/1.1"`.
///
/// `version` holds only the numeric part, so a parsed request line always
/// carries `"1.1"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
    pub version: String,
}

/// A complete request: request line, header table and body.
///
/// Instances are only created by the decoder once parsing is done, so the
/// body always has exactly the declared `Content-Length` (or is empty when
/// none was declared).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub request_line: RequestLine,
    pub headers: Headers,
    pub body: Bytes,
}

impl Request {
    #[inline]
    pub fn method(&self) -> &str {
        &self.request_line.method
    }

    #[inline]
    pub fn target(&self) -> &str {
        &self.request_line.target
    }
}
