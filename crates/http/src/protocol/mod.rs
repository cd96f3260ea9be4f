//! Core protocol types: header table, request model and error taxonomy.
//!
//! # Components
//!
//! - **Header table** ([`headers`]): ordered case-insensitive fields plus
//!   the wire-format line parser
//!   - [`Headers`]: the table itself
//!   - [`HeaderParse`]: outcome of one incremental parse step
//!
//! - **Request model** ([`request`]): what the decoder produces
//!   - [`RequestLine`]: method, target, version
//!   - [`Request`]: request line, headers and body
//!
//! - **Error handling** ([`error`]): the error types used across the crate
//!   - [`HttpError`]: top-level error type
//!   - [`ParseError`]: request parsing errors
//!   - [`WriteError`]: response writing errors

pub mod headers;
pub use headers::HeaderParse;
pub use headers::Headers;

mod request;
pub use request::Request;
pub use request::RequestLine;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::WriteError;
