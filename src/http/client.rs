//! HTTP client implementation
//!
//! One request, one response: the harness never reuses a connection, so the
//! client always asks the server to close it.

use super::{Error, HttpRequest, HttpResponse, HttpSession, Method, ResponseParser, Result, SessionOps};
use std::time::Duration;

const READ_CHUNK: usize = 4096;

/// HTTP client
///
/// Provides methods for sending requests and receiving responses.
pub struct HttpClient<S: SessionOps> {
    session: HttpSession<S>,
}

impl<S: SessionOps> HttpClient<S> {
    /// Create a new HTTP client with a session
    pub fn new(session: S) -> Self {
        HttpClient {
            session: HttpSession::new(session),
        }
    }

    /// Set the timeout for operations
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.session.set_timeout(Some(timeout));
    }

    /// Send an HTTP request
    pub fn send_request(&mut self, request: &HttpRequest) -> Result<()> {
        let wire = request.to_wire();
        let mut written = 0;

        while written < wire.len() {
            let n = self.session.write(&wire[written..])?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            written += n;
        }

        Ok(())
    }

    /// Receive the response to a request sent with `method`
    pub fn receive_response(&mut self, method: Method) -> Result<HttpResponse> {
        let mut parser = ResponseParser::new(method);
        let mut temp = vec![0u8; READ_CHUNK];

        loop {
            let n = self.session.read(&mut temp)?;
            if n == 0 {
                return parser.finish();
            }
            if let Some(response) = parser.parse(&temp[..n])? {
                return Ok(response);
            }
        }
    }

    /// Send a GET request for `uri` with the given `Host` header
    pub fn get(&mut self, uri: &str, host: &str) -> Result<HttpResponse> {
        let request = HttpRequest::builder()
            .method(Method::Get)
            .uri(uri)
            .header("Host", host)
            .header("User-Agent", concat!("certmatrix/", env!("CARGO_PKG_VERSION")))
            .header("Accept", "*/*")
            .header("Connection", "close")
            .build();

        self.send_request(&request)?;
        self.receive_response(Method::Get)
    }

    /// Close the connection
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }
}
