//! A minimal HTTP CONNECT proxy tunnel.
//!
//! This does not pull in a general-purpose HTTP client; the CONNECT
//! handshake is three lines of request and one status line of response,
//! hand-written directly over the TCP socket.

use std::fmt;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::connect::DnsConfig;
use crate::Error;

/// Address of an HTTP CONNECT proxy, with optional Basic auth.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy host.
    pub host: String,
    /// Proxy port.
    pub port: u16,
    /// `username:password` Basic auth credentials, if the proxy requires
    /// them.
    pub basic_auth: Option<(String, String)>,
}

impl ProxyConfig {
    /// A proxy with no authentication.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_owned(),
            port,
            basic_auth: None,
        }
    }

    /// Attach HTTP Basic auth credentials.
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.basic_auth = Some((username.to_owned(), password.to_owned()));
        self
    }

    /// Connect to the proxy and tunnel a connection to `target` through
    /// it via `CONNECT`, returning the tunnelled socket.
    pub async fn connect(&self, target: &DnsConfig) -> Result<TcpStream, Error> {
        let proxy_stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let mut stream = BufReader::new(proxy_stream);

        let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
        if let Some((user, pass)) = &self.basic_auth {
            use base64::engine::general_purpose::STANDARD as b64;
            use base64::Engine as _;
            let token = b64.encode(format!("{user}:{pass}"));
            request.push_str(&format!("Proxy-Authorization: Basic {token}\r\n"));
        }
        request.push_str("\r\n");
        stream.get_mut().write_all(request.as_bytes()).await?;

        let mut status_line = String::new();
        stream.read_line(&mut status_line).await?;
        let status_line = status_line.trim();
        let status_code = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse::<u16>().ok());
        if status_code != Some(200) {
            return Err(Error::Proxy(format!(
                "CONNECT to {target} via {self} failed: {status_line}"
            )));
        }

        // Drain the remaining response headers up to the blank line.
        loop {
            let mut line = String::new();
            let n = stream.read_line(&mut line).await?;
            if n == 0 || line.trim().is_empty() {
                break;
            }
        }

        Ok(stream.into_inner())
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
