//! Case-insensitive header table with wire-format line parsing.
//!
//! [`Headers`] keeps fields in insertion order so serialized output is
//! deterministic, while lookups and repeated inserts are case-insensitive.
//! The incremental [`Headers::parse`] consumes one field line per call from
//! a shared read buffer, which lets the request decoder interleave header
//! parsing with network reads.

use crate::protocol::ParseError;
use crate::utils::{ensure, find_crlf};
use bytes::{Buf, BytesMut};

pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONNECTION: &str = "Connection";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const TRAILER: &str = "Trailer";
pub const HOST: &str = "Host";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    /// Display name with the casing it was first inserted with
    name: String,
    value: String,
}

/// An ordered header table keyed case-insensitively by field name.
///
/// Repeated [`set`](Headers::set) calls for the same name accumulate values
/// joined with `", "`; [`overwrite`](Headers::overwrite) replaces instead.
/// Field names must stay within the HTTP token alphabet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<Field>,
}

/// Outcome of a single [`Headers::parse`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderParse {
    /// No complete line is buffered yet, nothing was consumed
    Incomplete,
    /// One field line was consumed and added to the table
    Field,
    /// The terminating blank line was consumed, the section is complete
    End,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name.eq_ignore_ascii_case(name))
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|index| self.fields[index].value.as_str())
    }

    /// Inserts a field, joining with `", "` when the name is already present.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ParseError> {
        ensure!(is_valid_field_name(name), ParseError::malformed_header(format!("invalid field name: {name:?}")));
        match self.position(name) {
            Some(index) => {
                let field = &mut self.fields[index];
                field.value.push_str(", ");
                field.value.push_str(value);
            }
            None => self.fields.push(Field { name: name.to_string(), value: value.to_string() }),
        }
        Ok(())
    }

    /// Inserts a field, replacing any existing value for the name.
    pub fn overwrite(&mut self, name: &str, value: &str) -> Result<(), ParseError> {
        ensure!(is_valid_field_name(name), ParseError::malformed_header(format!("invalid field name: {name:?}")));
        match self.position(name) {
            Some(index) => self.fields[index].value = value.to_string(),
            None => self.fields.push(Field { name: name.to_string(), value: value.to_string() }),
        }
        Ok(())
    }

    /// Removes a field if present.
    pub fn remove(&mut self, name: &str) {
        if let Some(index) = self.position(name) {
            self.fields.remove(index);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|field| (field.name.as_str(), field.value.as_str()))
    }

    /// Parses one `name: value` field line, without its CRLF terminator.
    ///
    /// The name must not be empty and must not end in a space before the
    /// colon; surrounding whitespace is then trimmed from both name and
    /// value, and the trimmed name is validated against the token alphabet.
    pub fn parse_line(&mut self, line: &[u8]) -> Result<(), ParseError> {
        let line = std::str::from_utf8(line)
            .map_err(|e| ParseError::malformed_header(format!("field line is not valid utf-8: {e}")))?;

        let (raw_name, raw_value) = line
            .split_once(':')
            .ok_or_else(|| ParseError::malformed_header(format!("missing colon in field line: {line:?}")))?;

        ensure!(!raw_name.is_empty(), ParseError::malformed_header(format!("empty field name in line: {line:?}")));
        ensure!(
            !raw_name.ends_with(' '),
            ParseError::malformed_header(format!("whitespace before colon in line: {line:?}"))
        );

        self.set(raw_name.trim(), raw_value.trim())
    }

    /// Consumes at most one field line from `src`.
    ///
    /// Returns [`HeaderParse::Incomplete`] without consuming anything when no
    /// full line is buffered, [`HeaderParse::End`] after consuming the blank
    /// line that terminates the section, and [`HeaderParse::Field`] after
    /// consuming one parsed field line. On error nothing is consumed.
    pub fn parse(&mut self, src: &mut BytesMut) -> Result<HeaderParse, ParseError> {
        let Some(index) = find_crlf(src) else {
            return Ok(HeaderParse::Incomplete);
        };

        if index == 0 {
            src.advance(2);
            return Ok(HeaderParse::End);
        }

        self.parse_line(&src[..index])?;
        src.advance(index + 2);
        Ok(HeaderParse::Field)
    }
}

fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(is_valid_field_name_byte)
}

fn is_valid_field_name_byte(b: u8) -> bool {
    const SPECIALS: &[u8] = b"!#$%&'*+-.^_`|~";
    b.is_ascii_alphanumeric() || SPECIALS.contains(&b)
}
