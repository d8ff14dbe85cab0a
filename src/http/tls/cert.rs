//! Peer certificate summaries
//!
//! Reports show which names a server actually presented, which is what makes
//! a hostname mismatch readable.

use openssl::nid::Nid;
use openssl::ssl::SslRef;
use openssl::x509::{X509NameRef, X509Ref};
use serde::Serialize;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Names carried by one certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertInfo {
    /// Subject Common Name
    pub subject: String,
    /// Issuer Common Name
    pub issuer: String,
    /// Subject Alternative Names, as `DNS:<name>` or `IP:<addr>`
    pub subject_alt_names: Vec<String>,
}

impl CertInfo {
    pub fn from_x509(cert: &X509Ref) -> Self {
        CertInfo {
            subject: common_name(cert.subject_name()),
            issuer: common_name(cert.issuer_name()),
            subject_alt_names: subject_alt_names(cert),
        }
    }
}

fn common_name(name: &X509NameRef) -> String {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "<undef>".to_string())
}

fn subject_alt_names(cert: &X509Ref) -> Vec<String> {
    let Some(sans) = cert.subject_alt_names() else {
        return Vec::new();
    };

    sans.iter()
        .filter_map(|name| {
            if let Some(dns) = name.dnsname() {
                return Some(format!("DNS:{}", dns));
            }
            match name.ipaddress()? {
                &[a, b, c, d] => Some(format!("IP:{}", Ipv4Addr::new(a, b, c, d))),
                octets if octets.len() == 16 => {
                    let mut raw = [0u8; 16];
                    raw.copy_from_slice(octets);
                    Some(format!("IP:{}", Ipv6Addr::from(raw)))
                }
                _ => None,
            }
        })
        .collect()
}

/// Summarize the certificates the peer sent, leaf first
///
/// On the client side OpenSSL's peer chain already includes the leaf.
pub fn peer_chain(ssl: &SslRef) -> Vec<CertInfo> {
    match ssl.peer_cert_chain() {
        Some(chain) => chain.iter().map(CertInfo::from_x509).collect(),
        None => ssl
            .peer_certificate()
            .map(|leaf| vec![CertInfo::from_x509(&leaf)])
            .unwrap_or_default(),
    }
}
