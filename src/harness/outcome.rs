//! Observed outcomes and verdicts

use crate::http::tls::{CertInfo, HandshakeFailure, TlsError, VerifyReason};
use crate::http::{self, Exchange};
use serde::Serialize;
use std::fmt;

/// Broad category of a failed case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The client could not be built (trust anchor, identity, address)
    Configuration,
    /// The TLS handshake was rejected by either side
    Handshake,
    /// Resolution, connection or transport I/O failed
    Network,
    Timeout,
    /// The server's HTTP response was malformed or cut short
    Protocol,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Configuration => "configuration",
            FailureKind::Handshake => "handshake",
            FailureKind::Network => "network",
            FailureKind::Timeout => "timeout",
            FailureKind::Protocol => "protocol",
        })
    }
}

/// Why a request produced no response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    /// Certificate verification result, when the handshake rejected the peer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<VerifyReason>,
    /// Full description of the underlying error
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Failure {
            kind,
            verify: None,
            message: message.into(),
        }
    }

    /// Classify a transport error
    pub fn from_error(err: &http::Error) -> Self {
        let (kind, verify) = match err {
            http::Error::Tls(TlsError::Handshake(failure)) => match failure {
                HandshakeFailure::TimedOut => (FailureKind::Timeout, None),
                HandshakeFailure::Reset(_) => (FailureKind::Network, None),
                _ => (FailureKind::Handshake, failure.verify_reason()),
            },
            http::Error::Tls(_) | http::Error::InvalidAddress(_) => {
                (FailureKind::Configuration, None)
            }
            http::Error::Timeout => (FailureKind::Timeout, None),
            http::Error::Io(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                (FailureKind::Timeout, None)
            }
            http::Error::Io(_)
            | http::Error::Connect { .. }
            | http::Error::Resolve(_)
            | http::Error::ConnectionClosed => (FailureKind::Network, None),
            http::Error::Parse(_)
            | http::Error::InvalidVersion(_)
            | http::Error::InvalidStatus(_)
            | http::Error::InvalidHeader(_)
            | http::Error::InvalidChunkSize(_)
            | http::Error::Incomplete
            | http::Error::Protocol(_) => (FailureKind::Protocol, None),
        };

        Failure {
            kind,
            verify,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// What a single request produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    /// A response was received, whatever its status
    Succeeded {
        status: u16,
        body: String,
        tls_version: String,
        /// Certificates the server presented, leaf first
        peer_chain: Vec<CertInfo>,
    },
    Failed(Failure),
}

impl Outcome {
    pub fn from_result(result: http::Result<Exchange>) -> Self {
        match result {
            Ok(exchange) => Outcome::Succeeded {
                status: exchange.response.status().code(),
                body: exchange.response.body_text(),
                tls_version: exchange.tls_version,
                peer_chain: exchange.peer_chain,
            },
            Err(err) => Outcome::Failed(Failure::from_error(&err)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Outcome::Failed(failure) => Some(failure),
            Outcome::Succeeded { .. } => None,
        }
    }
}

/// An outcome judged against the expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    ExpectedSuccessObserved,
    UnexpectedSuccess,
    ExpectedFailureObserved,
    UnexpectedFailure,
}

impl Verdict {
    pub fn classify(expect_success: bool, outcome: &Outcome) -> Self {
        match (expect_success, outcome.is_success()) {
            (true, true) => Verdict::ExpectedSuccessObserved,
            (true, false) => Verdict::UnexpectedFailure,
            (false, true) => Verdict::UnexpectedSuccess,
            (false, false) => Verdict::ExpectedFailureObserved,
        }
    }

    pub fn passed(&self) -> bool {
        matches!(
            self,
            Verdict::ExpectedSuccessObserved | Verdict::ExpectedFailureObserved
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn succeeded() -> Outcome {
        Outcome::Succeeded {
            status: 200,
            body: "Hello from :8443".to_string(),
            tls_version: "TLSv1.3".to_string(),
            peer_chain: vec![CertInfo {
                subject: "only-this-domain-is-allowed.com".to_string(),
                issuer: "Test Root".to_string(),
                subject_alt_names: vec!["DNS:only-this-domain-is-allowed.com".to_string()],
            }],
        }
    }

    fn failed() -> Outcome {
        Outcome::Failed(Failure::new(FailureKind::Handshake, "certificate verify failed"))
    }

    #[test]
    fn test_verdict_table() {
        assert_eq!(
            Verdict::classify(true, &succeeded()),
            Verdict::ExpectedSuccessObserved
        );
        assert_eq!(Verdict::classify(true, &failed()), Verdict::UnexpectedFailure);
        assert_eq!(Verdict::classify(false, &succeeded()), Verdict::UnexpectedSuccess);
        assert_eq!(
            Verdict::classify(false, &failed()),
            Verdict::ExpectedFailureObserved
        );
    }

    #[test]
    fn test_non_2xx_response_is_success() {
        let outcome = Outcome::Succeeded {
            status: 500,
            body: String::new(),
            tls_version: "TLSv1.2".to_string(),
            peer_chain: Vec::new(),
        };
        assert_eq!(Verdict::classify(true, &outcome), Verdict::ExpectedSuccessObserved);
        assert!(!Verdict::classify(false, &outcome).passed());
    }

    #[test]
    fn test_failure_kinds() {
        let verification = http::Error::Tls(TlsError::Handshake(HandshakeFailure::Verification {
            reason: VerifyReason::HostnameMismatch,
            detail: "hostname mismatch".to_string(),
            presented: None,
        }));
        let failure = Failure::from_error(&verification);
        assert_eq!(failure.kind, FailureKind::Handshake);
        assert_eq!(failure.verify, Some(VerifyReason::HostnameMismatch));

        let anchor = http::Error::Tls(TlsError::TrustAnchor {
            path: "ca/root/root.cert.pem".into(),
            reason: "No such file or directory".to_string(),
        });
        assert_eq!(Failure::from_error(&anchor).kind, FailureKind::Configuration);

        let handshake_timeout = http::Error::Tls(TlsError::Handshake(HandshakeFailure::TimedOut));
        assert_eq!(Failure::from_error(&handshake_timeout).kind, FailureKind::Timeout);
        assert_eq!(Failure::from_error(&http::Error::Timeout).kind, FailureKind::Timeout);

        let refused = http::Error::Connect {
            address: "localhost:8443".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        let failure = Failure::from_error(&refused);
        assert_eq!(failure.kind, FailureKind::Network);
        assert!(failure.message.contains("localhost:8443"));

        assert_eq!(Failure::from_error(&http::Error::Incomplete).kind, FailureKind::Protocol);
    }

    #[test]
    fn test_outcome_json_shape() {
        let value = serde_json::to_value(succeeded()).unwrap();
        assert_eq!(value["result"], "succeeded");
        assert_eq!(value["status"], 200);
        assert_eq!(value["tls_version"], "TLSv1.3");
        assert_eq!(value["peer_chain"][0]["issuer"], "Test Root");
        assert_eq!(
            value["peer_chain"][0]["subject_alt_names"][0],
            "DNS:only-this-domain-is-allowed.com"
        );

        let outcome = Outcome::Failed(Failure {
            kind: FailureKind::Handshake,
            verify: Some(VerifyReason::UntrustedIssuer),
            message: "certificate verification failed".to_string(),
        });
        let value = serde_json::to_value(outcome).unwrap();
        assert_eq!(value["result"], "failed");
        assert_eq!(value["kind"], "handshake");
        assert_eq!(value["verify"], "untrusted_issuer");
    }
}
