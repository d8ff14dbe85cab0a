//! TLS handshake failure classification
//!
//! The handshake itself is driven by `Ssl::connect()`. When it fails, the
//! `HandshakeError` is reduced here to a [`HandshakeFailure`] that keeps the
//! certificate verification result OpenSSL recorded, so callers can tell a
//! hostname mismatch from an untrusted issuer without string matching.

use super::cert::CertInfo;
use openssl::ssl::{HandshakeError, SslRef, SslVerifyMode};
use openssl::x509::{X509StoreContextRef, X509VerifyResult, X509};
use serde::Serialize;
use std::fmt;
use std::io;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

// X509_V_ERR_* codes, see openssl/x509_vfy.h
const UNABLE_TO_GET_ISSUER_CERT: i32 = 2;
const CERT_NOT_YET_VALID: i32 = 9;
const CERT_HAS_EXPIRED: i32 = 10;
const DEPTH_ZERO_SELF_SIGNED_CERT: i32 = 18;
const SELF_SIGNED_CERT_IN_CHAIN: i32 = 19;
const UNABLE_TO_GET_ISSUER_CERT_LOCALLY: i32 = 20;
const UNABLE_TO_VERIFY_LEAF_SIGNATURE: i32 = 21;
const PERMITTED_VIOLATION: i32 = 47;
const EXCLUDED_VIOLATION: i32 = 48;
const HOSTNAME_MISMATCH: i32 = 62;
const IP_ADDRESS_MISMATCH: i32 = 64;

/// Why the peer certificate was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyReason {
    /// Certificate is not valid for the expected identity
    HostnameMismatch,
    /// Chain does not lead to a trust anchor
    UntrustedIssuer,
    /// Peer presented a self-signed certificate that is not an anchor
    SelfSigned,
    Expired,
    NotYetValid,
    /// A CA's name constraints exclude the certificate's names
    NameConstraintViolation,
    /// Any other `X509_V_ERR_*` code
    Other(i32),
}

impl VerifyReason {
    /// Map an OpenSSL verify result code
    pub fn from_code(code: i32) -> Self {
        match code {
            UNABLE_TO_GET_ISSUER_CERT
            | UNABLE_TO_GET_ISSUER_CERT_LOCALLY
            | UNABLE_TO_VERIFY_LEAF_SIGNATURE => VerifyReason::UntrustedIssuer,
            DEPTH_ZERO_SELF_SIGNED_CERT | SELF_SIGNED_CERT_IN_CHAIN => VerifyReason::SelfSigned,
            CERT_HAS_EXPIRED => VerifyReason::Expired,
            CERT_NOT_YET_VALID => VerifyReason::NotYetValid,
            PERMITTED_VIOLATION | EXCLUDED_VIOLATION => VerifyReason::NameConstraintViolation,
            HOSTNAME_MISMATCH | IP_ADDRESS_MISMATCH => VerifyReason::HostnameMismatch,
            other => VerifyReason::Other(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyReason::HostnameMismatch => "hostname mismatch",
            VerifyReason::UntrustedIssuer => "untrusted issuer",
            VerifyReason::SelfSigned => "self-signed certificate",
            VerifyReason::Expired => "certificate expired",
            VerifyReason::NotYetValid => "certificate not yet valid",
            VerifyReason::NameConstraintViolation => "name constraint violation",
            VerifyReason::Other(_) => "certificate rejected",
        }
    }
}

impl fmt::Display for VerifyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyReason::Other(code) => write!(f, "{} (code {})", self.as_str(), code),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// A failed TLS handshake
#[derive(Debug, thiserror::Error)]
pub enum HandshakeFailure {
    /// The peer certificate did not verify
    #[error("certificate verification failed: {detail}{}", presented_suffix(.presented))]
    Verification {
        reason: VerifyReason,
        /// OpenSSL's description of the verify result
        detail: String,
        /// Names carried by the rejected leaf certificate, if one was received
        presented: Option<CertInfo>,
    },

    #[error("handshake timed out")]
    TimedOut,

    #[error("connection reset during handshake: {0}")]
    Reset(#[source] io::Error),

    #[error("{0}")]
    Protocol(String),
}

impl HandshakeFailure {
    /// The verification reason, if the certificate was rejected
    pub fn verify_reason(&self) -> Option<VerifyReason> {
        match self {
            HandshakeFailure::Verification { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

fn presented_suffix(presented: &Option<CertInfo>) -> String {
    match presented {
        Some(info) if !info.subject_alt_names.is_empty() => {
            format!(" (certificate names: {})", info.subject_alt_names.join(", "))
        }
        Some(info) => format!(" (certificate subject: {})", info.subject),
        None => String::new(),
    }
}

/// The leaf certificate the peer sent, recorded during verification
///
/// OpenSSL only stores the peer certificate on the session once the chain
/// verified, so a rejected leaf has to be picked up from the verify
/// callback.
#[derive(Default)]
pub(crate) struct PresentedLeaf(Arc<Mutex<Option<X509>>>);

impl PresentedLeaf {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Require a peer certificate on `ssl` and record its leaf
    pub(crate) fn install(&self, ssl: &mut SslRef) {
        let slot = Arc::clone(&self.0);
        ssl.set_verify_callback(
            SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT,
            move |preverify, ctx| {
                if let Some(leaf) = leaf_of(ctx) {
                    if let Ok(mut slot) = slot.lock() {
                        if slot.is_none() {
                            *slot = Some(leaf);
                        }
                    }
                }
                preverify
            },
        );
    }

    fn info(&self) -> Option<CertInfo> {
        let slot = self.0.lock().ok()?;
        slot.as_deref().map(CertInfo::from_x509)
    }
}

fn leaf_of(ctx: &X509StoreContextRef) -> Option<X509> {
    // The chain is built leaf first; errors above the leaf stop before
    // depth 0 is ever visited.
    if let Some(leaf) = ctx.chain().and_then(|chain| chain.get(0)) {
        return Some(leaf.to_owned());
    }
    if ctx.error_depth() == 0 {
        return ctx.current_cert().map(|cert| cert.to_owned());
    }
    None
}

/// Reduce an OpenSSL handshake error to a [`HandshakeFailure`]
pub(crate) fn classify(err: HandshakeError<TcpStream>, leaf: &PresentedLeaf) -> HandshakeFailure {
    match err {
        HandshakeError::SetupFailure(stack) => HandshakeFailure::Protocol(stack.to_string()),
        // Blocking socket with a read timeout: OpenSSL reports WANT_READ.
        HandshakeError::WouldBlock(_) => HandshakeFailure::TimedOut,
        HandshakeError::Failure(mid) => {
            let verify = mid.ssl().verify_result();
            if verify != X509VerifyResult::OK {
                return HandshakeFailure::Verification {
                    reason: VerifyReason::from_code(verify.as_raw()),
                    detail: verify.error_string().to_string(),
                    presented: leaf.info().or_else(|| {
                        mid.ssl().peer_certificate().map(|c| CertInfo::from_x509(&c))
                    }),
                };
            }

            let description = mid.error().to_string();
            match mid.into_error().into_io_error() {
                Ok(io_err) => match io_err.kind() {
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                        HandshakeFailure::TimedOut
                    }
                    _ => HandshakeFailure::Reset(io_err),
                },
                Err(_) => HandshakeFailure::Protocol(description),
            }
        }
    }
}
