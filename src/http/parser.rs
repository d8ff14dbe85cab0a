//! HTTP response parsing
//!
//! `ResponseParser` is fed raw bytes as they arrive from the session and
//! yields a response once the status line, the headers and the body (as
//! delimited by `Content-Length`, chunked encoding, or connection close) are
//! all available.

use super::chunked::ChunkedDecoder;
use super::{Error, Headers, HttpResponse, Method, Result, Status, Version, MAX_BODY_SIZE};

/// Find the next CRLF in a buffer
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parse HTTP response status line
///
/// Format: VERSION STATUS REASON\r\n
/// Example: HTTP/1.1 200 OK\r\n
pub fn parse_status_line(line: &str) -> Result<(Version, Status, String)> {
    let parts: Vec<&str> = line.splitn(3, ' ').collect();

    if parts.len() < 2 {
        return Err(Error::Parse(format!(
            "Invalid status line: expected at least 2 parts, got {}",
            parts.len()
        )));
    }

    let version = Version::parse(parts[0])?;
    let status_code = parts[1]
        .parse::<u16>()
        .map_err(|_| Error::Parse(format!("Invalid status code: {}", parts[1])))?;
    let status = Status::new(status_code)?;
    let reason = match parts.get(2) {
        Some(reason) => reason.to_string(),
        None => status.reason_phrase().to_string(),
    };

    Ok((version, status, reason))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParserState {
    StatusLine,
    Headers,
    Body(BodyKind),
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BodyKind {
    Empty,
    Length(usize),
    Chunked,
    UntilClose,
}

/// HTTP response parser
pub struct ResponseParser {
    state: ParserState,
    head_request: bool,
    buffer: Vec<u8>,
    version: Version,
    status: Status,
    reason: String,
    headers: Headers,
    body: Vec<u8>,
    max_body: usize,
    chunked: ChunkedDecoder,
}

impl ResponseParser {
    /// Create a parser for the response to a request with `method`
    pub fn new(method: Method) -> Self {
        ResponseParser {
            state: ParserState::StatusLine,
            head_request: method == Method::Head,
            buffer: Vec::new(),
            version: Version::default(),
            status: Status::OK,
            reason: String::new(),
            headers: Headers::new(),
            body: Vec::new(),
            max_body: MAX_BODY_SIZE,
            chunked: ChunkedDecoder::new(),
        }
    }

    /// Reject bodies longer than `max` bytes
    pub fn with_max_body(mut self, max: usize) -> Self {
        self.max_body = max;
        self
    }

    /// Feed data to the parser
    ///
    /// Returns Ok(Some(response)) when a complete response is parsed,
    /// Ok(None) if more data is needed, or Err on parse error.
    pub fn parse(&mut self, data: &[u8]) -> Result<Option<HttpResponse>> {
        self.buffer.extend_from_slice(data);

        loop {
            match self.state {
                ParserState::StatusLine => {
                    let Some(eol) = find_crlf(&self.buffer) else { return Ok(None) };
                    let line = String::from_utf8_lossy(&self.buffer[..eol]).to_string();
                    self.buffer.drain(..eol + 2);

                    let (version, status, reason) = parse_status_line(&line)?;
                    self.version = version;
                    self.status = status;
                    self.reason = reason;
                    self.state = ParserState::Headers;
                }
                ParserState::Headers => {
                    let Some(eol) = find_crlf(&self.buffer) else { return Ok(None) };
                    if eol == 0 {
                        self.buffer.drain(..2);
                        self.state = ParserState::Body(self.body_kind()?);
                        continue;
                    }
                    let line = String::from_utf8_lossy(&self.buffer[..eol]).to_string();
                    self.buffer.drain(..eol + 2);

                    let (name, value) = Headers::parse_header_line(&line)?;
                    self.headers.insert(name, value);
                }
                ParserState::Body(BodyKind::Empty) => return Ok(Some(self.complete())),
                ParserState::Body(BodyKind::Length(length)) => {
                    if self.buffer.len() < length {
                        return Ok(None);
                    }
                    self.body = self.buffer.drain(..length).collect();
                    return Ok(Some(self.complete()));
                }
                ParserState::Body(BodyKind::Chunked) => {
                    let consumed = self.chunked.decode(&self.buffer, &mut self.body)?;
                    self.buffer.drain(..consumed);
                    self.check_body_size(self.body.len())?;
                    if !self.chunked.is_complete() {
                        return Ok(None);
                    }
                    return Ok(Some(self.complete()));
                }
                ParserState::Body(BodyKind::UntilClose) => {
                    self.body.append(&mut self.buffer);
                    self.check_body_size(self.body.len())?;
                    return Ok(None);
                }
                ParserState::Complete => return Ok(None),
            }
        }
    }

    /// Signal that the peer closed the connection
    ///
    /// Completes a response whose body is delimited by connection close;
    /// any other state means the response was cut short.
    pub fn finish(&mut self) -> Result<HttpResponse> {
        match self.state {
            ParserState::Body(BodyKind::UntilClose) => {
                self.body.append(&mut self.buffer);
                Ok(self.complete())
            }
            ParserState::StatusLine if self.buffer.is_empty() => Err(Error::ConnectionClosed),
            _ => Err(Error::Incomplete),
        }
    }

    fn body_kind(&self) -> Result<BodyKind> {
        let code = self.status.code();
        if self.head_request || code == 204 || code == 304 || (100..200).contains(&code) {
            return Ok(BodyKind::Empty);
        }
        if self.headers.is_chunked() {
            return Ok(BodyKind::Chunked);
        }
        match self.headers.content_length()? {
            Some(0) => Ok(BodyKind::Empty),
            Some(length) => {
                self.check_body_size(length)?;
                Ok(BodyKind::Length(length))
            }
            None => Ok(BodyKind::UntilClose),
        }
    }

    fn check_body_size(&self, length: usize) -> Result<()> {
        if length > self.max_body {
            return Err(Error::Protocol(format!(
                "response body exceeds {} bytes",
                self.max_body
            )));
        }
        Ok(())
    }

    fn complete(&mut self) -> HttpResponse {
        self.state = ParserState::Complete;
        HttpResponse::new(
            self.version,
            self.status,
            std::mem::take(&mut self.reason),
            std::mem::take(&mut self.headers),
            std::mem::take(&mut self.body),
        )
    }
}
