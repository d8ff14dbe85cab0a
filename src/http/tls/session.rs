//! TLS session operations
//!
//! Implements `SessionOps` over an established OpenSSL stream so the HTTP
//! client runs over TLS exactly as it runs over plain TCP.

use super::cert::{self, CertInfo};
use crate::http::session::{poll_fd, PollEvents, SessionOps};
use crate::http::{Error, Result};
use openssl::ssl::SslStream;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;

/// An established, verified TLS client session
pub struct TlsSessionOps {
    stream: SslStream<TcpStream>,
    version: &'static str,
    peer_chain: Vec<CertInfo>,
    failed: bool,
}

impl TlsSessionOps {
    pub(crate) fn new(stream: SslStream<TcpStream>) -> Self {
        let ssl = stream.ssl();
        let version = ssl.version_str();
        let peer_chain = cert::peer_chain(ssl);

        log::trace!(
            "TLS established: {} {}",
            version,
            ssl.current_cipher().map(|c| c.name()).unwrap_or("<none>")
        );

        TlsSessionOps {
            stream,
            version,
            peer_chain,
            failed: false,
        }
    }

    /// Negotiated protocol version, e.g. `TLSv1.3`
    pub fn version(&self) -> &str {
        self.version
    }

    /// Certificates the server presented, leaf first
    pub fn peer_chain(&self) -> &[CertInfo] {
        &self.peer_chain
    }

    fn fail(&mut self, err: io::Error) -> Error {
        self.failed = true;
        Error::Io(err)
    }
}

impl SessionOps for TlsSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        // Decrypted bytes may already be buffered inside OpenSSL.
        if events == PollEvents::Read && self.stream.ssl().pending() > 0 {
            return Ok(true);
        }
        poll_fd(self.stream.get_ref().as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            // A peer that closes without close_notify still ends the body.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(0),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self.stream.write(buf) {
            Ok(n) => Ok(n),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn close(&mut self) -> Result<()> {
        if !self.failed {
            let _ = self.stream.shutdown();
        }

        match self.stream.get_mut().shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(Error::Io(e)),
            _ => Ok(()),
        }
    }
}
