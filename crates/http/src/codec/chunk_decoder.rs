//! Decoder for chunk-framed payloads.
//!
//! Frames arrive as `SIZE CRLF data CRLF`, with the hexadecimal size first.
//! A zero-sized frame ends the payload, optionally followed by trailer lines
//! and always by a final CRLF. Chunk extensions are not supported and are
//! rejected outright. Trailer lines are consumed but ignored.

use crate::protocol::ParseError;
use crate::utils::ensure;
use bytes::{Buf, Bytes, BytesMut};
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;
use ChunkState::*;

/// One frame of a chunk-framed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkItem {
    /// A slice of payload data. Large frames may surface as several `Data`
    /// items when the underlying reads are fragmented.
    Data(Bytes),
    /// The zero-sized frame and its terminator have been consumed.
    End,
}

/// Incremental decoder for chunk-framed payloads.
///
/// Emits [`ChunkItem::Data`] as payload bytes become available and a single
/// [`ChunkItem::End`] once the terminating frame is complete. After that the
/// decoder reports no further items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDecoder {
    state: ChunkState,
    remaining: u64,
    saw_size_digit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    /// Read the frame size in hex
    Size,
    /// Read LF closing the size line
    SizeLf,
    /// Read frame payload
    Data,
    /// Read CR after the payload
    DataCr,
    /// Read LF after the payload
    DataLf,
    /// Read the first byte after the zero frame: terminal CR or a trailer
    LastLine,
    /// Skip the rest of a trailer line
    Trailer,
    /// Read LF closing a trailer line
    TrailerLf,
    /// Read the final LF
    LastLf,
    /// Terminal state
    End,
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.is_empty() {
            return Poll::Pending;
        }
        $src.get_u8()
    }};
}

impl ChunkDecoder {
    /// Creates a new `ChunkDecoder` instance
    pub fn new() -> Self {
        Default::default()
    }

    fn step(&mut self, src: &mut BytesMut, item: &mut Option<ChunkItem>) -> Poll<Result<ChunkState, ParseError>> {
        match self.state {
            Size => self.read_size(src),
            SizeLf => self.read_size_lf(src),
            Data => self.read_data(src, item),
            DataCr => self.read_data_cr(src),
            DataLf => self.read_data_lf(src),
            LastLine => self.read_last_line(src),
            Trailer => self.read_trailer(src),
            TrailerLf => self.read_trailer_lf(src),
            LastLf => self.read_last_lf(src, item),
            End => Poll::Ready(Ok(End)),
        }
    }

    /// Accumulates hex digits until the CR closing the size line. At least
    /// one digit is required, and extensions are rejected.
    fn read_size(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkState, ParseError>> {
        macro_rules! or_overflow {
            ($e:expr) => {
                match $e {
                    Some(val) => val,
                    None => return Poll::Ready(Err(ParseError::invalid_chunk("frame size overflows"))),
                }
            };
        }

        let radix = 16;
        match try_next_byte!(src) {
            b @ b'0'..=b'9' => {
                self.remaining = or_overflow!(self.remaining.checked_mul(radix));
                self.remaining = or_overflow!(self.remaining.checked_add(u64::from(b - b'0')));
            }
            b @ b'a'..=b'f' => {
                self.remaining = or_overflow!(self.remaining.checked_mul(radix));
                self.remaining = or_overflow!(self.remaining.checked_add(u64::from(b + 10 - b'a')));
            }
            b @ b'A'..=b'F' => {
                self.remaining = or_overflow!(self.remaining.checked_mul(radix));
                self.remaining = or_overflow!(self.remaining.checked_add(u64::from(b + 10 - b'A')));
            }
            b'\r' => {
                return if self.saw_size_digit {
                    Poll::Ready(Ok(SizeLf))
                } else {
                    Poll::Ready(Err(ParseError::invalid_chunk("size line has no digits")))
                };
            }
            b';' => return Poll::Ready(Err(ParseError::invalid_chunk("extensions are not supported"))),
            _ => return Poll::Ready(Err(ParseError::invalid_chunk("invalid size digit"))),
        }

        self.saw_size_digit = true;
        Poll::Ready(Ok(Size))
    }

    fn read_size_lf(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' if self.remaining == 0 => Poll::Ready(Ok(LastLine)),
            b'\n' => Poll::Ready(Ok(Data)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("size line missing LF"))),
        }
    }

    /// Surfaces as much frame payload as is buffered, without copying.
    fn read_data(&mut self, src: &mut BytesMut, item: &mut Option<ChunkItem>) -> Poll<Result<ChunkState, ParseError>> {
        if src.is_empty() {
            return Poll::Pending;
        }

        // cap remaining bytes at the max capacity of usize
        let remaining = match self.remaining {
            r if r > usize::MAX as u64 => usize::MAX,
            r => r as usize,
        };

        let read_size = std::cmp::min(remaining, src.len());
        self.remaining -= read_size as u64;
        *item = Some(ChunkItem::Data(src.split_to(read_size).freeze()));

        if self.remaining > 0 {
            Poll::Ready(Ok(Data))
        } else {
            Poll::Ready(Ok(DataCr))
        }
    }

    fn read_data_cr(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(DataLf)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("payload missing CR"))),
        }
    }

    fn read_data_lf(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => {
                self.saw_size_digit = false;
                Poll::Ready(Ok(Size))
            }
            _ => Poll::Ready(Err(ParseError::invalid_chunk("payload missing LF"))),
        }
    }

    /// After the zero frame, a CR begins the terminal CRLF and anything else
    /// begins a trailer line.
    fn read_last_line(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(LastLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_trailer(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(TrailerLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_trailer_lf(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(LastLine)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("trailer line missing LF"))),
        }
    }

    fn read_last_lf(&mut self, src: &mut BytesMut, item: &mut Option<ChunkItem>) -> Poll<Result<ChunkState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => {
                trace!("chunked payload complete");
                *item = Some(ChunkItem::End);
                Poll::Ready(Ok(End))
            }
            _ => Poll::Ready(Err(ParseError::invalid_chunk("terminator missing LF"))),
        }
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self { state: Size, remaining: 0, saw_size_digit: false }
    }
}

impl Decoder for ChunkDecoder {
    type Item = ChunkItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                return Ok(None);
            }

            let mut item = None;
            self.state = match self.step(src, &mut item) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(next)) => next,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if item.is_some() {
                return Ok(item);
            }
        }
    }

    /// End-of-stream before the terminating frame is a hard error.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => {
                ensure!(self.state == End, ParseError::invalid_chunk("stream ended before the final frame"));
                Ok(None)
            }
        }
    }
}
