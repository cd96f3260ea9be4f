//! Streaming request decoder.
//!
//! This module turns an arbitrarily fragmented byte stream into a structured
//! [`Request`] through an explicit state machine. Each call to
//! [`RequestDecoder::decode`] makes as much progress as the buffered bytes
//! allow and consumes exactly the bytes it parsed, so the caller's read
//! buffer compacts naturally between network reads.
//!
//! # States
//!
//! - `Initialized`: waiting for the complete request line
//! - `ParsingHeaders`: consuming one header line per step
//! - `ParsingBody`: accumulating the declared `Content-Length` bytes
//! - `Done`: a request has been produced, feeding more bytes is a misuse
//!
//! # Example
//!
//! ```
//! use raw_http::codec::RequestDecoder;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n"[..]);
//! let request = decoder.decode(&mut buffer).expect("valid request").expect("complete request");
//! assert_eq!(request.method(), "GET");
//! ```

use crate::protocol::headers::CONTENT_LENGTH;
use crate::protocol::{HeaderParse, Headers, ParseError, Request, RequestLine};
use crate::utils::{ensure, find_crlf};
use bytes::{Buf, BytesMut};
use std::mem;
use tokio_util::codec::Decoder;
use tracing::trace;

/// Upper bound on unconsumed bytes while a request line or header line is
/// still incomplete.
pub(crate) const MAX_HEAD_BYTES: usize = 8 * 1024;

/// Upper bound on the number of header fields in one request.
pub(crate) const MAX_HEADER_COUNT: usize = 64;

/// Upper bound on a declared `Content-Length`.
pub(crate) const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Phase of an in-progress request parse.
///
/// Carried inside [`ParseError::IncompleteRequest`] so premature
/// end-of-stream reports how far the parse got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Initialized,
    ParsingHeaders,
    ParsingBody,
    Done,
}

/// A decoder that assembles one [`Request`] from a byte stream.
///
/// Designed to be driven by `FramedRead`, but works against any `BytesMut`
/// the caller refills: `Ok(None)` always means "need more input".
#[derive(Debug)]
pub struct RequestDecoder {
    state: ParseState,
    request_line: Option<RequestLine>,
    headers: Headers,
    body: BytesMut,
}

impl RequestDecoder {
    /// Creates a new `RequestDecoder` instance
    pub fn new() -> Self {
        Default::default()
    }

    /// The current parse phase.
    #[inline]
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Consumes the request line if it is fully buffered.
    ///
    /// Returns `Ok(false)` when more input is needed.
    fn parse_request_line(&mut self, src: &mut BytesMut) -> Result<bool, ParseError> {
        let Some(index) = find_crlf(src) else {
            ensure!(
                src.len() <= MAX_HEAD_BYTES,
                ParseError::limit_exceeded("request line bytes", src.len(), MAX_HEAD_BYTES)
            );
            return Ok(false);
        };

        let line = std::str::from_utf8(&src[..index])
            .map_err(|_e| ParseError::invalid_request_line(String::from_utf8_lossy(&src[..index])))?;
        let request_line = parse_request_line_text(line)?;

        trace!(method = %request_line.method, target = %request_line.target, "parsed request line");
        self.request_line = Some(request_line);
        src.advance(index + 2);
        self.state = ParseState::ParsingHeaders;
        Ok(true)
    }

    /// Accumulates body bytes against the declared `Content-Length`.
    ///
    /// Returns `Ok(true)` once the body is complete. Without a
    /// `Content-Length` the body is complete and empty immediately, and any
    /// buffered surplus bytes are left untouched.
    fn parse_body(&mut self, src: &mut BytesMut) -> Result<bool, ParseError> {
        let Some(declared) = self.headers.get(CONTENT_LENGTH) else {
            return Ok(true);
        };

        let expected = declared
            .parse::<usize>()
            .map_err(|e| ParseError::invalid_content_length(format!("{declared:?}: {e}")))?;
        ensure!(
            expected <= MAX_BODY_BYTES,
            ParseError::limit_exceeded("declared body size", expected, MAX_BODY_BYTES)
        );

        let available = src.split_to(src.len());
        self.body.unsplit(available);

        ensure!(self.body.len() <= expected, ParseError::BodyOverflow { expected, actual: self.body.len() });
        Ok(self.body.len() == expected)
    }

    fn finish(&mut self) -> Request {
        // Safe: the request line is stored before headers or body can parse
        let request_line = self.request_line.take().expect("request line parsed");
        Request { request_line, headers: mem::take(&mut self.headers), body: self.body.split().freeze() }
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { state: ParseState::Initialized, request_line: None, headers: Headers::new(), body: BytesMut::new() }
    }
}

impl Decoder for RequestDecoder {
    type Item = Request;
    type Error = ParseError;

    /// Advances the parse as far as the buffered bytes allow.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(request))`: the request is complete
    /// - `Ok(None)`: need more data
    /// - `Err(_)`: the input is malformed, or bytes arrived after the
    ///   request was already complete
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ParseState::Initialized => {
                    if !self.parse_request_line(src)? {
                        return Ok(None);
                    }
                }

                ParseState::ParsingHeaders => match self.headers.parse(src)? {
                    HeaderParse::Incomplete => {
                        ensure!(
                            src.len() <= MAX_HEAD_BYTES,
                            ParseError::limit_exceeded("header bytes", src.len(), MAX_HEAD_BYTES)
                        );
                        return Ok(None);
                    }
                    HeaderParse::Field => {
                        ensure!(
                            self.headers.len() <= MAX_HEADER_COUNT,
                            ParseError::limit_exceeded("header count", self.headers.len(), MAX_HEADER_COUNT)
                        );
                    }
                    HeaderParse::End => self.state = ParseState::ParsingBody,
                },

                ParseState::ParsingBody => {
                    if self.parse_body(src)? {
                        self.state = ParseState::Done;
                        trace!("request complete");
                        return Ok(Some(self.finish()));
                    }
                    return Ok(None);
                }

                ParseState::Done => {
                    // an empty poll after completion is end of stream, not a parse attempt
                    ensure!(src.is_empty(), ParseError::Misuse);
                    return Ok(None);
                }
            }
        }
    }

    /// End-of-stream while the request is not yet complete is a hard error,
    /// reported distinctly from malformed input.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.state == ParseState::Done {
            return Ok(None);
        }

        match self.decode(src)? {
            Some(request) => Ok(Some(request)),
            None => Err(ParseError::IncompleteRequest { state: self.state }),
        }
    }
}

fn parse_request_line_text(line: &str) -> Result<RequestLine, ParseError> {
    let parts: Vec<&str> = line.split(' ').collect();
    ensure!(parts.len() == 3, ParseError::invalid_request_line(line));

    let method = parts[0];
    ensure!(is_valid_method(method), ParseError::invalid_method(method));

    let target = parts[1];
    ensure!(parts[2] == "HTTP/1.1", ParseError::invalid_version(parts[2]));

    Ok(RequestLine { method: method.to_string(), target: target.to_string(), version: "1.1".to_string() })
}

/// A method is a nonempty run of uppercase ASCII letters.
fn is_valid_method(method: &str) -> bool {
    !method.is_empty() && method.bytes().all(|b| b.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::FramedRead;

    /// Feeds `input` to a fresh decoder in `chunk_size` fragments, mirroring
    /// a peer whose writes arrive arbitrarily split.
    fn decode_in_fragments(input: &[u8], chunk_size: usize) -> Result<Option<Request>, ParseError> {
        let mut decoder = RequestDecoder::new();
        let mut buffer = BytesMut::new();
        for fragment in input.chunks(chunk_size) {
            buffer.extend_from_slice(fragment);
            if let Some(request) = decoder.decode(&mut buffer)? {
                return Ok(Some(request));
            }
        }
        decoder.decode_eof(&mut buffer)
    }

    fn decode_all(input: &[u8]) -> Result<Option<Request>, ParseError> {
        decode_in_fragments(input, input.len())
    }

    #[test]
    fn test_good_get_request() {
        let input = b"GET / HTTP/1.1\r\nHost: localhost:42069\r\nUser-Agent: curl/7.81.0\r\nAccept: */*\r\n\r\n";
        let request = decode_all(input).unwrap().unwrap();

        assert_eq!(request.request_line.method, "GET");
        assert_eq!(request.request_line.target, "/");
        assert_eq!(request.request_line.version, "1.1");
        assert_eq!(request.headers.get("host"), Some("localhost:42069"));
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_good_get_request_with_path() {
        let input = b"GET /coffee HTTP/1.1\r\nHost: localhost:42069\r\nUser-Agent: curl/7.81.0\r\nAccept: */*\r\n\r\n";
        let request = decode_all(input).unwrap().unwrap();

        assert_eq!(request.request_line.method, "GET");
        assert_eq!(request.request_line.target, "/coffee");
        assert_eq!(request.request_line.version, "1.1");
    }

    #[test]
    fn test_fragmentation_does_not_change_the_result() {
        let input = b"POST /candies HTTP/1.1\r\nHost: localhost:42069\r\nContent-Length: 5\r\n\r\nsweet";
        let whole = decode_all(input).unwrap().unwrap();

        for chunk_size in [1, 2, 3, 7, 16] {
            let fragmented = decode_in_fragments(input, chunk_size).unwrap().unwrap();
            assert_eq!(fragmented, whole, "chunk size {chunk_size} must parse identically");
        }
    }

    #[test]
    fn test_request_line_with_two_fields() {
        let input = b"/coffee HTTP/1.1\r\nHost: localhost:42069\r\n\r\n";
        // the three-field shape check fires before any field is inspected
        let err = decode_all(input).unwrap_err();
        assert!(matches!(err, ParseError::InvalidRequestLine { .. }), "got: {err}");

        let input = b"GET /coffee\r\nHost: localhost:42069\r\n\r\n";
        let err = decode_all(input).unwrap_err();
        assert!(matches!(err, ParseError::InvalidRequestLine { .. }), "got: {err}");
    }

    #[test]
    fn test_request_line_with_four_fields() {
        let input = b"GET /candies HTTP/1.1 VERYFAST\r\nHost: localhost:42069\r\n\r\n";
        let err = decode_all(input).unwrap_err();
        assert!(matches!(err, ParseError::InvalidRequestLine { .. }), "got: {err}");
    }

    #[test]
    fn test_lowercase_method_is_rejected() {
        let input = b"get / HTTP/1.1\r\nHost: localhost:42069\r\n\r\n";
        let err = decode_all(input).unwrap_err();
        assert!(matches!(err, ParseError::InvalidMethod { .. }), "got: {err}");
    }

    #[test]
    fn test_wrong_version_is_rejected() {
        let input = b"GET /candies HTTP/2.1\r\nHost: localhost:42069\r\n\r\n";
        let err = decode_all(input).unwrap_err();
        assert!(matches!(err, ParseError::InvalidVersion { .. }), "got: {err}");
    }

    #[test]
    fn test_body_assembled_across_fragments() {
        let mut decoder = RequestDecoder::new();
        let mut buffer = BytesMut::from(&b"POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nab"[..]);

        assert!(decoder.decode(&mut buffer).unwrap().is_none());
        assert_eq!(decoder.state(), ParseState::ParsingBody);

        buffer.extend_from_slice(b"cde");
        let request = decoder.decode(&mut buffer).unwrap().expect("request completes with second fragment");
        assert_eq!(request.body.as_ref(), b"abcde");
        assert_eq!(decoder.state(), ParseState::Done);
    }

    #[test]
    fn test_body_overflow() {
        let input = b"POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nabcdef";
        let err = decode_all(input).unwrap_err();
        assert!(matches!(err, ParseError::BodyOverflow { expected: 5, actual: 6 }), "got: {err}");
    }

    #[test]
    fn test_missing_content_length_means_empty_body() {
        let mut decoder = RequestDecoder::new();
        let mut buffer = BytesMut::from(&b"POST /submit HTTP/1.1\r\nHost: localhost\r\n\r\ntrailing junk"[..]);

        let request = decoder.decode(&mut buffer).unwrap().expect("request is complete without a body");
        assert!(request.body.is_empty());
        // surplus bytes are not silently swallowed into the body
        assert_eq!(&buffer[..], b"trailing junk");
    }

    #[test]
    fn test_zero_content_length() {
        let input = b"POST /submit HTTP/1.1\r\nContent-Length: 0\r\n\r\n";
        let request = decode_all(input).unwrap().unwrap();
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_invalid_content_length() {
        let input = b"POST /submit HTTP/1.1\r\nContent-Length: five\r\n\r\nabcde";
        let err = decode_all(input).unwrap_err();
        assert!(matches!(err, ParseError::InvalidContentLength { .. }), "got: {err}");
    }

    #[test]
    fn test_decode_after_done_is_misuse() {
        let mut decoder = RequestDecoder::new();
        let mut buffer = BytesMut::from(&b"GET / HTTP/1.1\r\n\r\n"[..]);

        decoder.decode(&mut buffer).unwrap().expect("first request completes");

        buffer.extend_from_slice(b"GET /again HTTP/1.1\r\n\r\n");
        let err = decoder.decode(&mut buffer).unwrap_err();
        assert!(matches!(err, ParseError::Misuse), "got: {err}");
    }

    #[test]
    fn test_empty_decode_after_done_signals_end_of_stream() {
        let mut decoder = RequestDecoder::new();
        let mut buffer = BytesMut::from(&b"GET / HTTP/1.1\r\n\r\n"[..]);

        decoder.decode(&mut buffer).unwrap().expect("request completes");

        // FramedRead polls once more after yielding a frame
        assert!(decoder.decode(&mut buffer).unwrap().is_none());
        assert!(decoder.decode_eof(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn test_eof_mid_request_is_incomplete() {
        let input = b"GET / HTTP/1.1\r\nHost: loc";
        let err = decode_all(input).unwrap_err();
        assert!(matches!(err, ParseError::IncompleteRequest { state: ParseState::ParsingHeaders }), "got: {err}");
    }

    #[test]
    fn test_eof_before_any_bytes_is_incomplete() {
        let mut decoder = RequestDecoder::new();
        let mut buffer = BytesMut::new();

        let err = decoder.decode_eof(&mut buffer).unwrap_err();
        assert!(matches!(err, ParseError::IncompleteRequest { state: ParseState::Initialized }), "got: {err}");
    }

    #[test]
    fn test_eof_mid_body_is_incomplete() {
        let input = b"POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nab";
        let err = decode_all(input).unwrap_err();
        assert!(matches!(err, ParseError::IncompleteRequest { state: ParseState::ParsingBody }), "got: {err}");
    }

    #[test]
    fn test_unterminated_request_line_hits_head_limit() {
        let mut decoder = RequestDecoder::new();
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&vec![b'a'; MAX_HEAD_BYTES + 1]);

        let err = decoder.decode(&mut buffer).unwrap_err();
        assert!(matches!(err, ParseError::LimitExceeded { .. }), "got: {err}");
    }

    #[test]
    fn test_oversized_declared_body_is_rejected() {
        let input = format!("POST /upload HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_BODY_BYTES + 1);
        let err = decode_all(input.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::LimitExceeded { .. }), "got: {err}");
    }

    #[test]
    fn test_too_many_header_fields_are_rejected() {
        let mut input = String::from("GET / HTTP/1.1\r\n");
        for i in 0..=MAX_HEADER_COUNT {
            input.push_str(&format!("X-Filler-{i}: {i}\r\n"));
        }
        input.push_str("\r\n");

        let err = decode_all(input.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::LimitExceeded { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn test_framed_read_over_fragmented_stream() {
        let (mut client, server) = tokio::io::duplex(16);
        let mut framed_read = FramedRead::with_capacity(server, RequestDecoder::new(), 64);

        let write_task = tokio::spawn(async move {
            let request = b"POST /candies HTTP/1.1\r\nHost: localhost:42069\r\nContent-Length: 5\r\n\r\nsweet";
            for fragment in request.chunks(7) {
                client.write_all(fragment).await.unwrap();
            }
            client.shutdown().await.unwrap();
        });

        let request = framed_read.next().await.expect("one request").expect("request parses");
        assert_eq!(request.method(), "POST");
        assert_eq!(request.target(), "/candies");
        assert_eq!(request.body.as_ref(), b"sweet");

        assert!(framed_read.next().await.is_none(), "stream ends cleanly after the request");
        write_task.await.unwrap();
    }
}
