//! TLS support for the HTTPS client
//!
//! The TLS layer follows the session operations abstraction:
//!
//! 1. `TlsConfig` holds the verification settings: trust anchors, expected
//!    identity and protocol versions
//! 2. `TlsConfig::connect` runs the handshake and classifies failures
//! 3. `TlsSessionOps` implements `SessionOps`, so the HTTP client code runs
//!    over TLS unchanged
//!
//! # Example
//!
//! ```no_run
//! use certmatrix::http::tls::TlsConfig;
//! use certmatrix::http::HttpClient;
//! use std::net::TcpStream;
//!
//! let tls_config = TlsConfig::client()
//!     .trust_anchor_file("ca/root/root.cert.pem")
//!     .unwrap()
//!     .expected_identity("only-this-domain-is-allowed.com")
//!     .build()
//!     .unwrap();
//!
//! let tcp_stream = TcpStream::connect("localhost:8443").unwrap();
//! let tls_session = tls_config.connect(tcp_stream).unwrap();
//! let mut client = HttpClient::new(tls_session);
//! let response = client.get("/", "localhost:8443").unwrap();
//! ```

pub mod cert;
pub mod config;
pub mod handshake;
pub mod session;

pub use cert::CertInfo;
pub use config::{ClientConfigBuilder, TlsConfig, TlsError, TlsVersion};
pub use handshake::{HandshakeFailure, VerifyReason};
pub use session::TlsSessionOps;

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
