//! Throwaway PKI and TLS servers for integration tests

#![allow(dead_code)]

use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{SslAcceptor, SslMethod};
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName, SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509Extension, X509Name, X509NameBuilder, X509};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Once;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;

pub const ALLOWED: &str = "only-this-domain-is-allowed.com";
pub const NOT_ALLOWED: &str = "this-domain-is-not-allowed.com";

const DAY: i64 = 24 * 60 * 60;

static SERIAL: AtomicU32 = AtomicU32::new(1);

pub fn setup() {
    static ONCE: Once = Once::new();

    ONCE.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

fn new_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn cert_builder(cn: &str, key: &PKey<Private>, not_before: i64, not_after: i64) -> X509Builder {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(SERIAL.fetch_add(1, Ordering::Relaxed))
        .unwrap()
        .to_asn1_integer()
        .unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(not_before).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(not_after).unwrap())
        .unwrap();
    builder
}

fn ca_extensions(builder: &mut X509Builder, issuer: Option<&X509>) {
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    builder
        .append_extension(
            KeyUsage::new()
                .critical()
                .key_cert_sign()
                .crl_sign()
                .build()
                .unwrap(),
        )
        .unwrap();
    let skid = {
        let ctx = builder.x509v3_context(issuer.map(|c| &**c), None);
        SubjectKeyIdentifier::new().build(&ctx).unwrap()
    };
    builder.append_extension(skid).unwrap();
}

/// A certificate authority able to issue server certificates
pub struct Authority {
    key: PKey<Private>,
    cert: X509,
    /// Intermediates between this authority and its root, nearest first
    chain: Vec<X509>,
    is_root: bool,
}

impl Authority {
    pub fn root(cn: &str) -> Self {
        Self::root_with_constraints(cn, |_| None)
    }

    /// A root whose name constraints permit only `dns` and its subdomains
    pub fn root_with_permitted_dns(cn: &str, dns: &str) -> Self {
        Self::root_with_constraints(cn, |builder| {
            let ctx = builder.x509v3_context(None, None);
            #[allow(deprecated)]
            let ext = X509Extension::new_nid(
                None,
                Some(&ctx),
                Nid::NAME_CONSTRAINTS,
                &format!("critical,permitted;DNS:{}", dns),
            )
            .unwrap();
            Some(ext)
        })
    }

    /// A root whose name constraints permit only subjects below
    /// `O=<org>, OU=<unit>`
    pub fn root_with_permitted_dir_name(cn: &str, org: &str, unit: &str) -> Self {
        Self::root_with_constraints(cn, |_| Some(permitted_dir_name(org, unit)))
    }

    fn root_with_constraints<F>(cn: &str, constraints: F) -> Self
    where
        F: FnOnce(&X509Builder) -> Option<X509Extension>,
    {
        let key = new_key();
        let mut builder = cert_builder(cn, &key, now() - DAY, now() + 30 * DAY);
        let subject = builder_subject(cn);
        builder.set_issuer_name(&subject).unwrap();
        ca_extensions(&mut builder, None);

        if let Some(ext) = constraints(&builder) {
            builder.append_extension(ext).unwrap();
        }

        builder.sign(&key, MessageDigest::sha256()).unwrap();
        Authority {
            key,
            cert: builder.build(),
            chain: Vec::new(),
            is_root: true,
        }
    }

    /// An intermediate CA signed by this authority
    pub fn intermediate(&self, cn: &str) -> Authority {
        let key = new_key();
        let mut builder = cert_builder(cn, &key, now() - DAY, now() + 30 * DAY);
        builder.set_issuer_name(self.cert.subject_name()).unwrap();
        ca_extensions(&mut builder, Some(&self.cert));
        builder.sign(&self.key, MessageDigest::sha256()).unwrap();

        Authority {
            key,
            cert: builder.build(),
            chain: self.presented_chain(),
            is_root: false,
        }
    }

    /// Certificates a server sends above its leaf; the root is never sent
    fn presented_chain(&self) -> Vec<X509> {
        if self.is_root {
            return Vec::new();
        }
        let mut chain = vec![self.cert.clone()];
        chain.extend(self.chain.iter().cloned());
        chain
    }

    /// A server certificate for `names`, valid from an hour ago for a week
    pub fn issue(&self, names: &[&str]) -> ServerIdentity {
        self.issue_valid(names, None, now() - 60 * 60, now() + 7 * DAY)
    }

    /// Like [`issue`](Self::issue), with subject `O=<org>, OU=<unit>, CN=<first name>`
    pub fn issue_in_unit(&self, org: &str, unit: &str, names: &[&str]) -> ServerIdentity {
        self.issue_valid(names, Some((org, unit)), now() - 60 * 60, now() + 7 * DAY)
    }

    /// A server certificate whose validity ended yesterday
    pub fn issue_expired(&self, names: &[&str]) -> ServerIdentity {
        self.issue_valid(names, None, now() - 10 * DAY, now() - DAY)
    }

    fn issue_valid(
        &self,
        names: &[&str],
        unit: Option<(&str, &str)>,
        not_before: i64,
        not_after: i64,
    ) -> ServerIdentity {
        let key = new_key();
        let cn = names.first().copied().unwrap_or("server");
        let mut builder = cert_builder(cn, &key, not_before, not_after);
        if let Some((org, unit)) = unit {
            let subject = name_of(&[
                (Nid::ORGANIZATIONNAME, org),
                (Nid::ORGANIZATIONALUNITNAME, unit),
                (Nid::COMMONNAME, cn),
            ]);
            builder.set_subject_name(&subject).unwrap();
        }
        builder.set_issuer_name(self.cert.subject_name()).unwrap();
        builder
            .append_extension(BasicConstraints::new().build().unwrap())
            .unwrap();
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .digital_signature()
                    .key_encipherment()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder
            .append_extension(ExtendedKeyUsage::new().server_auth().build().unwrap())
            .unwrap();

        if !names.is_empty() {
            let san = {
                let ctx = builder.x509v3_context(Some(&*self.cert), None);
                let mut san = SubjectAlternativeName::new();
                for name in names {
                    if name.parse::<std::net::IpAddr>().is_ok() {
                        san.ip(name);
                    } else {
                        san.dns(name);
                    }
                }
                san.build(&ctx).unwrap()
            };
            builder.append_extension(san).unwrap();
        }

        builder.sign(&self.key, MessageDigest::sha256()).unwrap();

        ServerIdentity {
            key,
            cert: builder.build(),
            chain: self.presented_chain(),
        }
    }

    pub fn cert(&self) -> &X509 {
        &self.cert
    }

    /// Write this authority's certificate to a PEM file usable as a trust
    /// anchor
    pub fn anchor_file(&self) -> NamedTempFile {
        write_anchor(&self.cert.to_pem().unwrap())
    }
}

fn builder_subject(cn: &str) -> X509Name {
    name_of(&[(Nid::COMMONNAME, cn)])
}

fn name_of(entries: &[(Nid, &str)]) -> X509Name {
    let mut name = X509NameBuilder::new().unwrap();
    for (nid, value) in entries {
        name.append_entry_by_nid(*nid, value).unwrap();
    }
    name.build()
}

/// DER tag-length-value
fn der(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    if content.len() < 0x80 {
        out.push(content.len() as u8);
    } else {
        let len = content.len().to_be_bytes();
        let skip = len.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (len.len() - skip) as u8);
        out.extend_from_slice(&len[skip..]);
    }
    out.extend_from_slice(content);
    out
}

/// Critical nameConstraints with a single permitted directoryName subtree
///
/// Built from DER since the config-string form needs a config section for
/// dirName.
fn permitted_dir_name(org: &str, unit: &str) -> X509Extension {
    let base = name_of(&[
        (Nid::ORGANIZATIONNAME, org),
        (Nid::ORGANIZATIONALUNITNAME, unit),
    ]);
    let directory_name = der(0xa4, &base.to_der().unwrap());
    let subtree = der(0x30, &directory_name);
    let permitted = der(0xa0, &subtree);
    let constraints = der(0x30, &permitted);

    let oid = Asn1Object::from_str("2.5.29.30").unwrap();
    let contents = Asn1OctetString::new_from_bytes(&constraints).unwrap();
    X509Extension::new_from_der(&oid, true, &contents).unwrap()
}

pub fn write_anchor(pem: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(pem).unwrap();
    file.flush().unwrap();
    file
}

/// Key, leaf and intermediates presented by a test server
pub struct ServerIdentity {
    key: PKey<Private>,
    cert: X509,
    chain: Vec<X509>,
}

/// Start an HTTPS server on 127.0.0.1 answering `Hello from :<port>`
///
/// The server accepts connections until the test process exits. Handshakes
/// the client aborts are ignored.
pub fn spawn_server(identity: ServerIdentity) -> u16 {
    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
    acceptor.set_private_key(&identity.key).unwrap();
    acceptor.set_certificate(&identity.cert).unwrap();
    for cert in identity.chain {
        acceptor.add_extra_chain_cert(cert).unwrap();
    }
    acceptor.check_private_key().unwrap();
    let acceptor = acceptor.build();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let body = format!("Hello from :{}", port);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
            let Ok(mut tls) = acceptor.accept(stream) else { continue };

            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match tls.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            if request.is_empty() {
                continue;
            }

            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = tls.write_all(response.as_bytes());
            let _ = tls.shutdown();
        }
    });

    port
}

/// A listener that accepts connections and never says anything
pub fn spawn_silent_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        let mut held: Vec<TcpStream> = Vec::new();
        for stream in listener.incoming().flatten() {
            held.push(stream);
        }
    });

    port
}

/// A port nothing listens on
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
