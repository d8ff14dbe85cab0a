//! HTTP/1.1 over TLS for the verification harness
//!
//! This module provides the minimal HTTP client the harness needs: one GET
//! request per connection, over a TLS session whose verification settings
//! are fixed by the caller.
//!
//! # Architecture
//!
//! The HTTP layer uses a session operations abstraction pattern that keeps
//! the request/response code independent of the transport:
//!
//! - `SessionOps` trait defines operations (poll, read, write, close)
//! - `HttpSession` adds timeouts on top of any `SessionOps`
//! - `tls::TlsSessionOps` implements `SessionOps` over an OpenSSL stream
//! - `HttpsTransport` dials, handshakes and issues the request
//!
//! # Examples
//!
//! ```no_run
//! use certmatrix::http::HttpsTransport;
//! use certmatrix::http::tls::TlsConfig;
//! use std::time::Duration;
//!
//! let tls = TlsConfig::client()
//!     .trust_anchor_file("ca/root/root.cert.pem")
//!     .unwrap()
//!     .expected_identity("only-this-domain-is-allowed.com")
//!     .build()
//!     .unwrap();
//!
//! let transport = HttpsTransport::new(tls, Duration::from_secs(5));
//! let response = transport.get("localhost:8443", "/").unwrap();
//! assert_eq!(response.status().code(), 200);
//! ```

pub mod chunked;
pub mod client;
pub mod headers;
pub mod message;
pub mod parser;
pub mod session;
pub mod tls;
pub mod transport;

pub use client::HttpClient;
pub use headers::Headers;
pub use message::{HttpRequest, HttpResponse, Method, Status, Version};
pub use parser::ResponseParser;
pub use session::{HttpSession, SessionOps};
pub use transport::{Exchange, HttpsTransport};

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not resolve {0}")]
    Resolve(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Tls(#[from] tls::TlsError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    #[error("Invalid HTTP status: {0}")]
    InvalidStatus(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("Incomplete message")]
    Incomplete,

    #[error("Timeout")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Maximum number of headers per message
pub const MAX_HEADERS: usize = 64;

/// Largest response body the client accepts
pub const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Default HTTPS port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// CRLF line ending
pub const CRLF: &str = "\r\n";
