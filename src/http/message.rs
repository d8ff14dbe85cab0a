//! HTTP message types
//!
//! Requests are only ever built and serialized; responses are only ever
//! parsed. Each type carries just that direction.

use super::{Error, Headers, Result, CRLF};
use std::fmt;

/// HTTP methods the harness issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
}

impl Method {
    /// Convert method to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    Http10,
    #[default]
    Http11,
}

impl Version {
    /// Parse version from a status line token
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            _ => Err(Error::InvalidVersion(s.to_string())),
        }
    }

    /// Convert version to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    code: u16,
}

impl Status {
    /// Create a new status code
    pub fn new(code: u16) -> Result<Self> {
        if (100..600).contains(&code) {
            Ok(Status { code })
        } else {
            Err(Error::InvalidStatus(format!("Invalid status code: {}", code)))
        }
    }

    /// Get the status code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Reason phrase for the codes a test server is likely to send
    pub fn reason_phrase(&self) -> &'static str {
        match self.code {
            200 => "OK",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            400 => "Bad Request",
            403 => "Forbidden",
            404 => "Not Found",
            421 => "Misdirected Request",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }

    /// Check if this is a success status (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub const OK: Status = Status { code: 200 };
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason_phrase())
    }
}

/// HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    uri: String,
    version: Version,
    headers: Headers,
}

impl HttpRequest {
    /// Create a builder for constructing requests
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    /// Get the request method
    pub fn method(&self) -> Method {
        self.method
    }

    /// Get the request URI
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Get the headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Convert the request to wire format
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        buf.extend_from_slice(self.method.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.uri.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.version.as_str().as_bytes());
        buf.extend_from_slice(CRLF.as_bytes());

        for (name, value) in self.headers.iter() {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(CRLF.as_bytes());
        }

        buf.extend_from_slice(CRLF.as_bytes());
        buf
    }
}

/// Builder for HTTP requests
#[derive(Debug, Default)]
pub struct HttpRequestBuilder {
    method: Option<Method>,
    uri: Option<String>,
    headers: Headers,
}

impl HttpRequestBuilder {
    /// Set the HTTP method
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the URI
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Build the request
    pub fn build(self) -> HttpRequest {
        HttpRequest {
            method: self.method.unwrap_or(Method::Get),
            uri: self.uri.unwrap_or_else(|| "/".to_string()),
            version: Version::Http11,
            headers: self.headers,
        }
    }
}

/// HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    version: Version,
    status: Status,
    reason: String,
    headers: Headers,
    body: Vec<u8>,
}

impl HttpResponse {
    pub(crate) fn new(
        version: Version,
        status: Status,
        reason: String,
        headers: Headers,
        body: Vec<u8>,
    ) -> Self {
        HttpResponse {
            version,
            status,
            reason,
            headers,
            body,
        }
    }

    /// Get the HTTP version
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get the status code
    pub fn status(&self) -> Status {
        self.status
    }

    /// Get the reason phrase
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Get the headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get the body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, with invalid sequences replaced
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
