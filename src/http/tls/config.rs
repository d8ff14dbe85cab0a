//! TLS client configuration
//!
//! `ClientConfigBuilder` is the client factory of the harness: it turns a
//! trust anchor file and an expected identity into an immutable
//! [`TlsConfig`] whose every connection verifies strictly.
//!
//! - Only the certificates in the anchor file are trusted. The OpenSSL
//!   default verify paths are never loaded.
//! - The peer must present a certificate that chains to an anchor.
//! - The certificate is matched against the expected identity, not against
//!   whatever address the TCP stream was dialed to.

use super::handshake::{self, HandshakeFailure, PresentedLeaf};
use super::session::TlsSessionOps;
use openssl::error::ErrorStack;
use openssl::ssl::{Ssl, SslContext, SslContextBuilder, SslMethod, SslVerifyMode, SslVersion};
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::verify::X509CheckFlags;
use openssl::x509::X509;
use std::net::{IpAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Parse TLS version from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self, TlsError> {
        match s.to_uppercase().as_str() {
            "TLSV1.2" | "TLS1.2" | "1.2" => Ok(TlsVersion::Tls12),
            "TLSV1.3" | "TLS1.3" | "1.3" => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::InvalidVersion(s.to_string())),
        }
    }

    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(&self) -> SslVersion {
        match self {
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    /// Get version as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] ErrorStack),

    #[error("Invalid TLS version: {0}")]
    InvalidVersion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("trust anchor {}: {reason}", .path.display())]
    TrustAnchor { path: PathBuf, reason: String },

    #[error("invalid expected identity {0:?}")]
    InvalidIdentity(String),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[from] HandshakeFailure),
}

impl TlsError {
    /// Whether the error was raised while building the client, before any
    /// network I/O took place.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, TlsError::Handshake(_))
    }
}

/// The name the peer certificate must be valid for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Identity {
    Dns(String),
    Ip(IpAddr),
}

impl Identity {
    fn parse(value: &str) -> Result<Self, TlsError> {
        let value = value.trim();
        if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '\0') {
            return Err(TlsError::InvalidIdentity(value.to_string()));
        }

        let bracketed = value
            .strip_prefix('[')
            .and_then(|v| v.strip_suffix(']'))
            .unwrap_or(value);
        if let Ok(ip) = bracketed.parse::<IpAddr>() {
            return Ok(Identity::Ip(ip));
        }

        Ok(Identity::Dns(value.trim_end_matches('.').to_ascii_lowercase()))
    }
}

/// TLS client configuration (immutable after building)
#[derive(Clone)]
pub struct TlsConfig {
    ctx: SslContext,
    identity: Identity,
    expected_identity: String,
    trust_anchor: Arc<PathBuf>,
    anchor_count: usize,
}

impl TlsConfig {
    /// Create a new client configuration builder
    pub fn client() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// The identity the peer certificate is verified against
    pub fn expected_identity(&self) -> &str {
        &self.expected_identity
    }

    /// Path of the trust anchor file this configuration was built from
    pub fn trust_anchor(&self) -> &Path {
        &self.trust_anchor
    }

    /// Number of trusted root certificates loaded from the anchor file
    pub fn anchor_count(&self) -> usize {
        self.anchor_count
    }

    /// Perform the client handshake over `stream`
    ///
    /// Verification failures, timeouts and resets are reported as
    /// [`TlsError::Handshake`].
    pub fn connect(&self, stream: TcpStream) -> Result<TlsSessionOps, TlsError> {
        let leaf = PresentedLeaf::new();
        let ssl = self.new_ssl(&leaf)?;
        match ssl.connect(stream) {
            Ok(stream) => Ok(TlsSessionOps::new(stream)),
            Err(err) => Err(TlsError::Handshake(handshake::classify(err, &leaf))),
        }
    }

    /// Per-connection state carrying the identity check and SNI
    fn new_ssl(&self, leaf: &PresentedLeaf) -> Result<Ssl, TlsError> {
        let mut ssl = Ssl::new(&self.ctx)?;
        leaf.install(&mut ssl);
        match &self.identity {
            Identity::Dns(name) => {
                ssl.set_hostname(name)?;
                let param = ssl.param_mut();
                param.set_hostflags(X509CheckFlags::NO_PARTIAL_WILDCARDS);
                param.set_host(name)?;
            }
            // SNI may not carry an IP literal.
            Identity::Ip(ip) => ssl.param_mut().set_ip(*ip)?,
        }
        Ok(ssl)
    }
}

/// Client configuration builder
pub struct ClientConfigBuilder {
    anchors: Vec<X509>,
    trust_anchor: Option<PathBuf>,
    identity: Option<String>,
    min_version: TlsVersion,
    max_version: Option<TlsVersion>,
}

impl ClientConfigBuilder {
    fn new() -> Self {
        ClientConfigBuilder {
            anchors: Vec::new(),
            trust_anchor: None,
            identity: None,
            min_version: TlsVersion::Tls12,
            max_version: None,
        }
    }

    /// Trust exactly the certificates in the PEM file at `path`
    ///
    /// The file is read and parsed immediately; an unreadable file, a
    /// malformed PEM block or a file without any certificate is reported as
    /// [`TlsError::TrustAnchor`].
    pub fn trust_anchor_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, TlsError> {
        let path = path.as_ref();
        let anchor_error = |reason: String| TlsError::TrustAnchor {
            path: path.to_path_buf(),
            reason,
        };

        let pem = std::fs::read(path).map_err(|e| anchor_error(e.to_string()))?;
        let certs = X509::stack_from_pem(&pem)
            .map_err(|e| anchor_error(format!("invalid PEM: {}", e)))?;
        if certs.is_empty() {
            return Err(anchor_error("no certificates found".to_string()));
        }

        self.anchors = certs;
        self.trust_anchor = Some(path.to_path_buf());
        Ok(self)
    }

    /// Verify the peer certificate as `identity` (a DNS name or IP literal)
    pub fn expected_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Set the lowest protocol version offered
    pub fn min_version(mut self, version: TlsVersion) -> Self {
        self.min_version = version;
        self
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.min_version = min;
        self.max_version = Some(max);
        self
    }

    /// Build the TLS configuration
    pub fn build(self) -> Result<TlsConfig, TlsError> {
        let trust_anchor = self.trust_anchor.ok_or_else(|| {
            TlsError::InvalidConfig("no trust anchor configured".to_string())
        })?;
        let expected_identity = self.identity.ok_or_else(|| {
            TlsError::InvalidConfig("no expected identity configured".to_string())
        })?;
        let identity = Identity::parse(&expected_identity)?;

        if let Some(max) = self.max_version {
            if max < self.min_version {
                return Err(TlsError::InvalidConfig(format!(
                    "maximum version {} is below minimum version {}",
                    max.as_str(),
                    self.min_version.as_str()
                )));
            }
        }

        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_client())?;
        ctx_builder.set_min_proto_version(Some(self.min_version.to_openssl_version()))?;
        ctx_builder.set_max_proto_version(self.max_version.map(|v| v.to_openssl_version()))?;

        let mut store = X509StoreBuilder::new()?;
        for cert in &self.anchors {
            store.add_cert(cert.clone())?;
        }
        ctx_builder.set_cert_store(store.build());
        ctx_builder.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);

        Ok(TlsConfig {
            ctx: ctx_builder.build(),
            identity,
            expected_identity,
            trust_anchor: Arc::new(trust_anchor),
            anchor_count: self.anchors.len(),
        })
    }
}
