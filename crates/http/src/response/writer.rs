use crate::protocol::headers::CONTENT_TYPE;
use crate::protocol::{Headers, WriteError};
use crate::response::default_fields;
use crate::utils::ensure;
use bytes::BytesMut;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

const FILE_BUFFER_SIZE: usize = 4096;

/// Section of the response the writer expects next.
///
/// Every write operation names the state it requires; calling it in any
/// other state fails without emitting a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Initialized,
    StatusLineWritten,
    HeadersWritten,
    BodyDone,
    Done,
}

/// Serializes one response onto an output sink, section by section.
///
/// The legal orderings are `status line -> headers -> body` and
/// `status line -> headers -> chunks -> done -> trailers`. The writer owns
/// the sink; [`ResponseWriter::get_mut`] exposes it for raw writes.
#[derive(Debug)]
pub struct ResponseWriter<W> {
    writer: W,
    state: WriterState,
}

impl<W> ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Creates a writer in the `Initialized` state.
    pub fn new(writer: W) -> Self {
        Self { writer, state: WriterState::Initialized }
    }

    /// The section the writer expects next.
    #[inline]
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// The underlying sink.
    #[inline]
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    fn check_state(&self, expected: WriterState) -> Result<(), WriteError> {
        ensure!(self.state == expected, WriteError::invalid_state(self.state, expected));
        Ok(())
    }

    /// Writes the status line for one of the supported status codes.
    ///
    /// An unsupported code fails without changing state, so the caller can
    /// retry with a supported one.
    pub async fn write_status_line(&mut self, status: u16) -> Result<(), WriteError> {
        self.check_state(WriterState::Initialized)?;

        let line: &[u8] = match status {
            super::STATUS_OK => b"HTTP/1.1 200 OK\r\n",
            super::STATUS_BAD_REQUEST => b"HTTP/1.1 400 Bad Request\r\n",
            super::STATUS_INTERNAL_SERVER_ERROR => b"HTTP/1.1 500 Internal Server Error\r\n",
            unsupported => return Err(WriteError::UnsupportedStatus(unsupported)),
        };

        self.writer.write_all(line).await?;
        self.state = WriterState::StatusLineWritten;
        Ok(())
    }

    /// Writes the header section, fields in table order, then the blank line.
    pub async fn write_headers(&mut self, headers: &Headers) -> Result<(), WriteError> {
        self.check_state(WriterState::StatusLineWritten)?;
        self.write_field_lines(headers).await?;
        self.state = WriterState::HeadersWritten;
        Ok(())
    }

    /// Writes a fixed body and a trailing newline.
    ///
    /// Returns the payload length, which is what a matching `Content-Length`
    /// declares; the trailing newline sits outside the declared length.
    pub async fn write_body(&mut self, body: &[u8]) -> Result<usize, WriteError> {
        self.check_state(WriterState::HeadersWritten)?;

        self.writer.write_all(body).await?;
        self.writer.write_all(b"\n").await?;
        self.state = WriterState::BodyDone;
        Ok(body.len())
    }

    /// Writes one chunk frame: the payload length in hex, CRLF, the payload,
    /// CRLF. Does not advance state, so chunks can follow each other.
    pub async fn write_chunked_body(&mut self, chunk: &[u8]) -> Result<usize, WriteError> {
        self.check_state(WriterState::HeadersWritten)?;

        let mut frame = BytesMut::with_capacity(chunk.len() + 16);
        frame.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        frame.extend_from_slice(chunk);
        frame.extend_from_slice(b"\r\n");

        self.writer.write_all(&frame).await?;
        Ok(chunk.len())
    }

    /// Writes the terminating zero frame of a chunked body.
    ///
    /// Trailers may follow; without them the final CRLF never appears on the
    /// wire, which peers reading to end-of-stream tolerate.
    pub async fn write_chunked_body_done(&mut self) -> Result<(), WriteError> {
        self.check_state(WriterState::HeadersWritten)?;

        self.writer.write_all(b"0\r\n").await?;
        self.state = WriterState::BodyDone;
        Ok(())
    }

    /// Writes the trailer section closing a chunked body.
    pub async fn write_trailers(&mut self, trailers: &Headers) -> Result<(), WriteError> {
        self.check_state(WriterState::BodyDone)?;
        self.write_field_lines(trailers).await?;
        self.state = WriterState::Done;
        Ok(())
    }

    /// Serves a whole file as one response: status line, default headers
    /// with the given content type, then the file contents streamed in
    /// fixed-size reads.
    ///
    /// Returns the number of file bytes written. Failing to open the file
    /// leaves the writer in `Initialized`, so an error response can still
    /// be written.
    pub async fn write_file(&mut self, path: impl AsRef<Path>, content_type: &str, status: u16) -> Result<u64, WriteError> {
        self.check_state(WriterState::Initialized)?;

        let mut file = File::open(path.as_ref()).await?;
        let size = file.metadata().await?.len();

        self.write_status_line(status).await?;
        let mut headers = default_fields(size);
        // Safe: constant header names are valid tokens
        headers.overwrite(CONTENT_TYPE, content_type).unwrap();
        self.write_headers(&headers).await?;

        let total = self.stream_file_body(&mut file).await?;
        trace!(bytes = total, "served file");

        self.writer.write_all(b"\r\n").await?;
        self.state = WriterState::BodyDone;
        Ok(total)
    }

    async fn stream_file_body<R>(&mut self, file: &mut R) -> Result<u64, WriteError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = [0u8; FILE_BUFFER_SIZE];
        let mut total = 0u64;
        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                return Ok(total);
            }
            self.writer.write_all(&buffer[..n]).await?;
            total += n as u64;
        }
    }

    async fn write_field_lines(&mut self, headers: &Headers) -> Result<(), WriteError> {
        let mut buffer = BytesMut::new();
        for (name, value) in headers.iter() {
            buffer.extend_from_slice(name.as_bytes());
            buffer.extend_from_slice(b": ");
            buffer.extend_from_slice(value.as_bytes());
            buffer.extend_from_slice(b"\r\n");
        }
        buffer.extend_from_slice(b"\r\n");

        self.writer.write_all(&buffer).await?;
        Ok(())
    }

    /// Flushes the underlying sink.
    pub async fn flush(&mut self) -> Result<(), WriteError> {
        Ok(self.writer.flush().await?)
    }

    /// Shuts down the underlying sink.
    pub async fn shutdown(&mut self) -> Result<(), WriteError> {
        Ok(self.writer.shutdown().await?)
    }
}
