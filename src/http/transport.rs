//! HTTPS transport: dial, handshake, one request
//!
//! `HttpsTransport` pairs a [`TlsConfig`] with an operation bound. Every
//! call to [`HttpsTransport::get`] opens a fresh connection, so the same
//! transport can be used repeatedly without any state carrying over.

use super::tls::{CertInfo, TlsConfig};
use super::{Error, HttpClient, HttpResponse, Result, DEFAULT_HTTPS_PORT};
use log::debug;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Shortest connect attempt handed to any single address
const MIN_CONNECT_BUDGET: Duration = Duration::from_millis(1);

/// A response together with the verified session it arrived over
#[derive(Debug, Clone)]
pub struct Exchange {
    pub response: HttpResponse,
    /// Negotiated protocol version, e.g. `TLSv1.3`
    pub tls_version: String,
    /// Certificates the server presented, leaf first
    pub peer_chain: Vec<CertInfo>,
}

/// HTTPS client transport with fixed TLS verification settings
#[derive(Clone)]
pub struct HttpsTransport {
    tls: TlsConfig,
    timeout: Duration,
}

impl HttpsTransport {
    /// Create a transport; `timeout` bounds connect, handshake and each
    /// read or write of the exchange
    pub fn new(tls: TlsConfig, timeout: Duration) -> Self {
        HttpsTransport { tls, timeout }
    }

    pub fn tls(&self) -> &TlsConfig {
        &self.tls
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue `GET <path>` to `address`
    ///
    /// `address` is `host:port`, `host`, or `:port` for localhost. Any HTTP
    /// response counts as success, whatever its status.
    pub fn get(&self, address: &str, path: &str) -> Result<HttpResponse> {
        self.exchange(address, path).map(|exchange| exchange.response)
    }

    /// Like [`get`](Self::get), also returning what the handshake
    /// negotiated and which certificates the server presented
    pub fn exchange(&self, address: &str, path: &str) -> Result<Exchange> {
        let authority = normalize_address(address)?;
        let stream = self.dial(&authority)?;

        debug!(
            "handshake with {} expecting identity {}",
            authority,
            self.tls.expected_identity()
        );
        let session = self.tls.connect(stream)?;
        debug!(
            "{} verified as {} over {}",
            authority,
            self.tls.expected_identity(),
            session.version()
        );

        let tls_version = session.version().to_string();
        let peer_chain = session.peer_chain().to_vec();

        let mut client = HttpClient::new(session);
        client.set_timeout(self.timeout);
        let response = client.get(path, &authority);
        let _ = client.close();

        Ok(Exchange {
            response: response?,
            tls_version,
            peer_chain,
        })
    }

    /// Connect to the first reachable resolved address
    ///
    /// All attempts share one `timeout`: each address gets an equal slice
    /// of what is left.
    fn dial(&self, authority: &str) -> Result<TcpStream> {
        let addrs: Vec<SocketAddr> = authority
            .to_socket_addrs()
            .map_err(|_| Error::Resolve(authority.to_string()))?
            .collect();
        if addrs.is_empty() {
            return Err(Error::Resolve(authority.to_string()));
        }

        let deadline = Instant::now() + self.timeout;
        let total = addrs.len();
        let mut last_err = None;
        for (tried, addr) in addrs.into_iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                last_err = Some(io::Error::from(io::ErrorKind::TimedOut));
                break;
            }
            match self.connect_one(addr, connect_budget(remaining, total - tried)) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if e.kind() == io::ErrorKind::TimedOut => Err(Error::Timeout),
            Some(source) => Err(Error::Connect {
                address: authority.to_string(),
                source,
            }),
            None => Err(Error::Resolve(authority.to_string())),
        }
    }

    fn connect_one(&self, addr: SocketAddr, budget: Duration) -> io::Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.connect_timeout(&addr.into(), budget)?;
        socket.set_nodelay(true)?;
        // The handshake runs blocking; these bound it.
        socket.set_read_timeout(Some(self.timeout))?;
        socket.set_write_timeout(Some(self.timeout))?;
        Ok(socket.into())
    }
}

/// Share of `remaining` for the next of `left` connect attempts
fn connect_budget(remaining: Duration, left: usize) -> Duration {
    let left = u32::try_from(left.max(1)).unwrap_or(u32::MAX);
    (remaining / left).max(MIN_CONNECT_BUDGET)
}

/// Turn a user-supplied address into `host:port`
///
/// `":8443"` becomes `"localhost:8443"` and a bare host gets port 443.
pub fn normalize_address(address: &str) -> Result<String> {
    let address = address.trim();
    if address.is_empty() {
        return Err(Error::InvalidAddress(address.to_string()));
    }

    if let Some(port) = address.strip_prefix(':') {
        parse_port(address, port)?;
        return Ok(format!("localhost:{}", port));
    }

    // Bracketed IPv6, with or without a port.
    if address.starts_with('[') {
        return match address.rsplit_once("]:") {
            Some((_, port)) => {
                parse_port(address, port)?;
                Ok(address.to_string())
            }
            None if address.ends_with(']') => Ok(format!("{}:{}", address, DEFAULT_HTTPS_PORT)),
            None => Err(Error::InvalidAddress(address.to_string())),
        };
    }

    match address.rsplit_once(':') {
        Some((host, _)) if host.contains(':') => {
            Err(Error::InvalidAddress(address.to_string()))
        }
        Some((host, port)) => {
            if host.is_empty() {
                return Err(Error::InvalidAddress(address.to_string()));
            }
            parse_port(address, port)?;
            Ok(address.to_string())
        }
        None => Ok(format!("{}:{}", address, DEFAULT_HTTPS_PORT)),
    }
}

fn parse_port(address: &str, port: &str) -> Result<u16> {
    match port.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(Error::InvalidAddress(address.to_string())),
    }
}
