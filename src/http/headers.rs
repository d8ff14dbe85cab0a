//! HTTP headers handling
//!
//! Header names are matched case-insensitively and kept in the order they
//! arrived on the wire.

use super::{Error, Result, MAX_HEADERS};

/// HTTP headers collection
#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: Vec<(String, String)>,
}

impl Headers {
    /// Create a new empty headers collection
    pub fn new() -> Self {
        Headers {
            headers: Vec::new(),
        }
    }

    /// Append a header, keeping any earlier value with the same name.
    ///
    /// Headers beyond [`MAX_HEADERS`] are dropped.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if self.headers.len() >= MAX_HEADERS {
            return;
        }
        self.headers.push((name.into(), value.into()));
    }

    /// Get the first value for a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check if a header exists
    pub fn contains(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Parsed `Content-Length`, if present
    pub fn content_length(&self) -> Result<Option<usize>> {
        match self.get("Content-Length") {
            Some(value) => value
                .parse::<usize>()
                .map(Some)
                .map_err(|_| Error::Parse(format!("Invalid Content-Length: {}", value))),
            None => Ok(None),
        }
    }

    /// Whether the body uses chunked transfer encoding
    pub fn is_chunked(&self) -> bool {
        self.get("Transfer-Encoding")
            .map(|te| {
                te.rsplit(',')
                    .next()
                    .map(|last| last.trim().eq_ignore_ascii_case("chunked"))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Get the number of headers
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Check if there are no headers
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Clear all headers
    pub fn clear(&mut self) {
        self.headers.clear();
    }

    /// Iterate over all headers
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Split a `Name: value` line
    pub fn parse_header_line(line: &str) -> Result<(String, String)> {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidHeader(format!("No colon in header: {}", line)))?;

        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidHeader("Empty header name".to_string()));
        }

        Ok((name.to_string(), value.trim().to_string()))
    }
}
