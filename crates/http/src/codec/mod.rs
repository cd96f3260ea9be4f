//! Codecs that turn raw byte streams into structured messages.
//!
//! Both decoders follow the same state machine pattern: each `decode` call
//! consumes exactly the bytes it could parse and returns `Ok(None)` until a
//! complete item is buffered, so they can be driven by `FramedRead` over any
//! fragmentation of the input.
//!
//! # Components
//!
//! - [`RequestDecoder`]: assembles one request from a byte stream
//! - [`ChunkDecoder`]: unfolds a chunk-framed payload into data frames
//!
//! # Example
//!
//! ```no_run
//! use raw_http::codec::RequestDecoder;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::new();
//! // refill `buffer` from the transport between calls
//! let request = decoder.decode(&mut buffer);
//! ```

mod chunk_decoder;
mod request_decoder;

pub use chunk_decoder::{ChunkDecoder, ChunkItem};
pub use request_decoder::{ParseState, RequestDecoder};
