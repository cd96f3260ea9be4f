use crate::codec::ParseState;
use crate::response::WriterState;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: WriteError,
    },
}

/// Errors produced while parsing a request from the byte stream.
///
/// Everything except [`ParseError::Misuse`] and [`ParseError::Io`] means the
/// peer sent malformed input; those two mean the local side went wrong.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid request line: {line:?}")]
    InvalidRequestLine { line: String },

    #[error("invalid method: {method:?}")]
    InvalidMethod { method: String },

    #[error("invalid http version: {version:?}")]
    InvalidVersion { version: String },

    #[error("malformed header line: {reason}")]
    MalformedHeader { reason: String },

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("body exceeds declared content-length: expected {expected}, got {actual}")]
    BodyOverflow { expected: usize, actual: usize },

    #[error("invalid chunked payload: {reason}")]
    InvalidChunk { reason: String },

    #[error("{what} exceeds the limit: {current} > {max}")]
    LimitExceeded { what: &'static str, current: usize, max: usize },

    #[error("stream closed before the request completed, state: {state:?}")]
    IncompleteRequest { state: ParseState },

    #[error("parse attempted on an already completed request")]
    Misuse,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn invalid_request_line<S: ToString>(line: S) -> Self {
        Self::InvalidRequestLine { line: line.to_string() }
    }

    pub fn invalid_method<S: ToString>(method: S) -> Self {
        Self::InvalidMethod { method: method.to_string() }
    }

    pub fn invalid_version<S: ToString>(version: S) -> Self {
        Self::InvalidVersion { version: version.to_string() }
    }

    pub fn malformed_header<S: ToString>(reason: S) -> Self {
        Self::MalformedHeader { reason: reason.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(reason: S) -> Self {
        Self::InvalidContentLength { reason: reason.to_string() }
    }

    pub fn invalid_chunk<S: ToString>(reason: S) -> Self {
        Self::InvalidChunk { reason: reason.to_string() }
    }

    pub fn limit_exceeded(what: &'static str, current: usize, max: usize) -> Self {
        Self::LimitExceeded { what, current, max }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// True for errors caused by the peer's bytes rather than by local misuse
    /// or transport failure. The connection driver renders these as 400.
    pub fn is_malformed_input(&self) -> bool {
        !matches!(self, Self::Misuse | Self::Io { .. })
    }
}

/// Errors produced while writing a response to the output sink.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("wrong writer state: {actual:?}, expected: {expected:?}")]
    InvalidState { actual: WriterState, expected: WriterState },

    #[error("unsupported status code: {0}")]
    UnsupportedStatus(u16),

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl WriteError {
    pub fn invalid_state(actual: WriterState, expected: WriterState) -> Self {
        Self::InvalidState { actual, expected }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
