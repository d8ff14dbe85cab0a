//! Session operations abstraction
//!
//! `SessionOps` lets the HTTP client run unchanged over a plain TCP stream
//! (used by tests) or an OpenSSL stream (used by the harness). `HttpSession`
//! layers a per-operation timeout on top: every read and write first polls
//! the descriptor, and a poll that expires yields [`Error::Timeout`].

use super::{Error, Result};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

/// Default per-operation timeout, matching the harness request bound
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Session operations trait
pub trait SessionOps {
    /// Poll the session for events
    ///
    /// Returns true if the session is ready for the requested operation
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool>;

    /// Read data from the session
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write data to the session
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Close the session
    fn close(&mut self) -> Result<()>;
}

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
}

/// Wait until `fd` is ready for `events`, or the timeout expires.
pub(crate) fn poll_fd(fd: RawFd, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1);

    loop {
        let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };
        if result >= 0 {
            return Ok(result > 0);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(Error::Io(err));
        }
    }
}

/// HTTP session wrapping a transport with session operations
pub struct HttpSession<S: SessionOps> {
    session: S,
    timeout: Option<Duration>,
}

impl<S: SessionOps> HttpSession<S> {
    /// Create a new HTTP session
    pub fn new(session: S) -> Self {
        HttpSession {
            session,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Set the timeout for operations
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Get the timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Read data with timeout
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.session.poll(PollEvents::Read, self.timeout)? {
            return Err(Error::Timeout);
        }
        self.session.read(buf)
    }

    /// Write data with timeout
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.session.poll(PollEvents::Write, self.timeout)? {
            return Err(Error::Timeout);
        }
        self.session.write(buf)
    }

    /// Close the session
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }
}

/// Plain TCP session operations
pub struct FdSessionOps {
    stream: TcpStream,
}

impl FdSessionOps {
    /// Create a new FD session operations from a TCP stream
    pub fn new(stream: TcpStream) -> Self {
        FdSessionOps { stream }
    }
}

impl SessionOps for FdSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        poll_fd(self.stream.as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).map_err(Error::from)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(Error::from)
    }

    fn close(&mut self) -> Result<()> {
        use std::net::Shutdown;
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(Error::Io(e)),
            _ => Ok(()),
        }
    }
}
