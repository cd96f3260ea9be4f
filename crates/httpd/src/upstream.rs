//! Plain TCP client for the proxied upstream.
//!
//! Sends a single `Connection: close` GET request and reads the response
//! back in waves of at most [`WAVE_SIZE`] bytes, so the proxy can re-frame
//! the body downstream without buffering it whole. The three upstream body
//! framings are handled transparently: chunked, declared length, and read
//! until end-of-stream.

use bytes::{Buf, Bytes, BytesMut};
use futures::StreamExt;
use raw_http::codec::{ChunkDecoder, ChunkItem};
use raw_http::protocol::headers::{CONTENT_LENGTH, TRANSFER_ENCODING};
use raw_http::protocol::{HeaderParse, Headers, ParseError};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tracing::debug;

/// Upper bound on one body wave, matching the read granularity the proxy
/// re-chunks at.
pub const WAVE_SIZE: usize = 1024;

/// Upper bound on buffered upstream head bytes while the status line or a
/// header line is still incomplete, mirroring the inbound parser's limit.
const MAX_HEAD_BYTES: usize = 8 * 1024;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("invalid upstream head: {reason}")]
    InvalidHead { reason: String },

    #[error("upstream closed before the declared body completed")]
    UnexpectedEof,

    #[error("upstream parse error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl UpstreamError {
    pub fn invalid_head<S: ToString>(reason: S) -> Self {
        Self::InvalidHead { reason: reason.to_string() }
    }
}

/// An upstream response with its head parsed and its body still streaming.
#[derive(Debug)]
pub struct Upstream {
    status: u16,
    headers: Headers,
    body: BodyReader,
}

impl Upstream {
    #[inline]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[inline]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The next wave of body bytes, at most [`WAVE_SIZE`] long, or `None`
    /// once the body is complete.
    pub async fn next_wave(&mut self) -> Result<Option<Bytes>, UpstreamError> {
        self.body.next_wave().await
    }
}

#[derive(Debug)]
enum BodyReader {
    Chunked { framed: FramedRead<TcpStream, ChunkDecoder>, pending: Bytes },
    Length { stream: TcpStream, buffer: BytesMut, remaining: u64 },
    UntilEof { stream: TcpStream, buffer: BytesMut },
}

impl BodyReader {
    async fn next_wave(&mut self) -> Result<Option<Bytes>, UpstreamError> {
        match self {
            Self::Chunked { framed, pending } => loop {
                if !pending.is_empty() {
                    let take = std::cmp::min(WAVE_SIZE, pending.len());
                    return Ok(Some(pending.split_to(take)));
                }

                match framed.next().await {
                    Some(Ok(ChunkItem::Data(data))) => *pending = data,
                    Some(Ok(ChunkItem::End)) | None => return Ok(None),
                    Some(Err(e)) => return Err(e.into()),
                }
            },

            Self::Length { stream, buffer, remaining } => {
                if *remaining == 0 {
                    return Ok(None);
                }
                if buffer.is_empty() && stream.read_buf(buffer).await? == 0 {
                    return Err(UpstreamError::UnexpectedEof);
                }

                let cap = usize::try_from(*remaining).unwrap_or(usize::MAX);
                let take = std::cmp::min(WAVE_SIZE, std::cmp::min(buffer.len(), cap));
                *remaining -= take as u64;
                Ok(Some(buffer.split_to(take).freeze()))
            }

            Self::UntilEof { stream, buffer } => {
                if buffer.is_empty() && stream.read_buf(buffer).await? == 0 {
                    return Ok(None);
                }

                let take = std::cmp::min(WAVE_SIZE, buffer.len());
                Ok(Some(buffer.split_to(take).freeze()))
            }
        }
    }
}

/// Fetches `target` from the upstream authority over plain TCP.
///
/// The request asks the upstream to close the connection after one
/// response, which keeps end-of-stream usable as a body delimiter.
pub async fn fetch(authority: &str, target: &str) -> Result<Upstream, UpstreamError> {
    let host = authority.rsplit_once(':').map_or(authority, |(host, _port)| host);
    let mut stream = TcpStream::connect(authority).await?;
    debug!(%authority, %target, "connected to upstream");

    let request = format!("GET {target} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut buffer = BytesMut::with_capacity(MAX_HEAD_BYTES);
    let status = loop {
        if let Some(index) = find_crlf(&buffer) {
            let status = parse_status_line(&buffer[..index])?;
            buffer.advance(index + 2);
            break status;
        }
        if buffer.len() > MAX_HEAD_BYTES {
            return Err(UpstreamError::invalid_head(format!("status line exceeds {MAX_HEAD_BYTES} bytes")));
        }
        if stream.read_buf(&mut buffer).await? == 0 {
            return Err(UpstreamError::invalid_head("connection closed before the status line"));
        }
    };

    let mut headers = Headers::new();
    loop {
        match headers.parse(&mut buffer)? {
            HeaderParse::Incomplete => {
                if buffer.len() > MAX_HEAD_BYTES {
                    return Err(UpstreamError::invalid_head(format!("header section exceeds {MAX_HEAD_BYTES} bytes")));
                }
                if stream.read_buf(&mut buffer).await? == 0 {
                    return Err(UpstreamError::invalid_head("connection closed inside the header section"));
                }
            }
            HeaderParse::Field => {}
            HeaderParse::End => break,
        }
    }

    let body = if headers.get(TRANSFER_ENCODING).is_some_and(|value| value.eq_ignore_ascii_case("chunked")) {
        let mut framed = FramedRead::with_capacity(stream, ChunkDecoder::new(), 8 * 1024);
        framed.read_buffer_mut().extend_from_slice(&buffer);
        BodyReader::Chunked { framed, pending: Bytes::new() }
    } else if let Some(declared) = headers.get(CONTENT_LENGTH) {
        let remaining = declared
            .parse::<u64>()
            .map_err(|e| UpstreamError::invalid_head(format!("bad content-length {declared:?}: {e}")))?;
        BodyReader::Length { stream, buffer, remaining }
    } else {
        BodyReader::UntilEof { stream, buffer }
    };

    Ok(Upstream { status, headers, body })
}

fn parse_status_line(line: &[u8]) -> Result<u16, UpstreamError> {
    let line = std::str::from_utf8(line).map_err(|_e| UpstreamError::invalid_head("status line is not utf-8"))?;

    let mut parts = line.split(' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(UpstreamError::invalid_head(format!("unexpected version: {version:?}")));
    }

    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| UpstreamError::invalid_head(format!("unexpected status line: {line:?}")))
}

fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(2).position(|window| window == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// One-shot upstream: accepts a single connection, captures the request
    /// head, answers with the canned bytes and closes.
    async fn spawn_upstream(response: &'static [u8]) -> (SocketAddr, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let task = tokio::spawn(async move {
            let (mut stream, _addr) = listener.accept().await.unwrap();

            let mut received = Vec::new();
            let mut chunk = [0u8; 1024];
            while !received.windows(4).any(|window| window == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..n]);
            }

            stream.write_all(response).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8(received).unwrap()
        });

        (address, task)
    }

    async fn collect_body(upstream: &mut Upstream) -> Vec<u8> {
        let mut body = Vec::new();
        while let Some(wave) = upstream.next_wave().await.unwrap() {
            assert!(wave.len() <= WAVE_SIZE, "wave exceeds the advertised bound");
            body.extend_from_slice(&wave);
        }
        body
    }

    #[tokio::test]
    async fn test_fetch_sends_a_close_delimited_get() {
        let (address, task) = spawn_upstream(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await;

        let mut upstream = fetch(&address.to_string(), "/json").await.unwrap();
        assert_eq!(upstream.status(), 200);
        assert_eq!(collect_body(&mut upstream).await, b"ok");

        let received = task.await.unwrap();
        assert!(received.starts_with("GET /json HTTP/1.1\r\n"), "got: {received}");
        assert!(received.contains("Host: 127.0.0.1\r\n"), "got: {received}");
        assert!(received.contains("Connection: close\r\n"), "got: {received}");
    }

    #[tokio::test]
    async fn test_declared_length_body_arrives_in_bounded_waves() {
        let payload: &'static [u8] = &[b'x'; 3000];
        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", payload.len());
        let response: &'static [u8] = Box::leak([head.as_bytes(), payload].concat().into_boxed_slice());

        let (address, _task) = spawn_upstream(response).await;
        let mut upstream = fetch(&address.to_string(), "/bytes/3000").await.unwrap();

        assert_eq!(collect_body(&mut upstream).await, payload);
    }

    #[tokio::test]
    async fn test_chunked_body_is_unfolded() {
        let response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let (address, _task) = spawn_upstream(response).await;

        let mut upstream = fetch(&address.to_string(), "/stream/1").await.unwrap();
        assert!(upstream.headers().get("transfer-encoding").is_some());
        assert_eq!(collect_body(&mut upstream).await, b"hello world");
    }

    #[tokio::test]
    async fn test_body_without_length_reads_to_eof() {
        let response = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nuntil the very end";
        let (address, _task) = spawn_upstream(response).await;

        let mut upstream = fetch(&address.to_string(), "/anything").await.unwrap();
        assert_eq!(upstream.headers().get("content-type"), Some("text/plain"));
        assert_eq!(collect_body(&mut upstream).await, b"until the very end");
    }

    #[tokio::test]
    async fn test_truncated_declared_body_is_an_error() {
        let response = b"HTTP/1.1 200 OK\r\nContent-Length: 50\r\n\r\nshort";
        let (address, _task) = spawn_upstream(response).await;

        let mut upstream = fetch(&address.to_string(), "/bytes/50").await.unwrap();
        let err = loop {
            match upstream.next_wave().await {
                Ok(Some(_wave)) => {}
                Ok(None) => panic!("a truncated body must not end cleanly"),
                Err(e) => break e,
            }
        };
        assert!(matches!(err, UpstreamError::UnexpectedEof), "got: {err}");
    }

    #[tokio::test]
    async fn test_garbage_status_line_is_rejected() {
        let (address, _task) = spawn_upstream(b"SMTP ready\r\n\r\n").await;

        let err = fetch(&address.to_string(), "/").await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidHead { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn test_oversized_status_line_hits_the_head_cap() {
        let response: &'static [u8] = Box::leak(vec![b'a'; MAX_HEAD_BYTES * 2].into_boxed_slice());
        let (address, _task) = spawn_upstream(response).await;

        let err = fetch(&address.to_string(), "/").await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidHead { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn test_oversized_header_section_hits_the_head_cap() {
        let head = format!("HTTP/1.1 200 OK\r\nX-Padding: {}", "a".repeat(MAX_HEAD_BYTES * 2));
        let response: &'static [u8] = Box::leak(head.into_bytes().into_boxed_slice());
        let (address, _task) = spawn_upstream(response).await;

        let err = fetch(&address.to_string(), "/").await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidHead { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_an_io_error() {
        // bind then drop to get a port that refuses connections
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let err = fetch(&address.to_string(), "/").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Io { .. }), "got: {err}");
    }
}
