//! Resolution of a configured server address to a TCP connection.
//!
//! DNS SRV discovery is intentionally not implemented here: callers that
//! need it are expected to resolve the target host/port themselves (e.g.
//! via a higher-level crate) and hand the result to [`DnsConfig::host`] or
//! [`DnsConfig::addr`].

use std::net::SocketAddr;

use tokio::net::TcpStream;

use crate::Error;

/// How to resolve the server to connect to.
#[derive(Clone, Debug)]
pub enum DnsConfig {
    /// Resolve `host` via the system resolver (A/AAAA) and connect to
    /// `port`, trying each returned address in order.
    Host {
        /// Hostname or literal IP address.
        host: String,
        /// TCP port.
        port: u16,
    },

    /// Connect directly to a pre-resolved socket address.
    Addr {
        /// `ip:port`.
        addr: String,
    },
}

impl std::fmt::Display for DnsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host { host, port } => write!(f, "{host}:{port}"),
            Self::Addr { addr } => write!(f, "{addr}"),
        }
    }
}

impl DnsConfig {
    /// Resolve `host:port` via the system resolver at connect time.
    pub fn host(host: &str, port: u16) -> Self {
        Self::Host {
            host: host.to_owned(),
            port,
        }
    }

    /// Connect to a fixed, pre-resolved socket address.
    pub fn addr(addr: &str) -> Self {
        Self::Addr {
            addr: addr.to_owned(),
        }
    }

    /// Connect a plain TCP socket to the configured address.
    pub async fn resolve(&self) -> Result<TcpStream, Error> {
        match self {
            Self::Addr { addr } => {
                let addr: SocketAddr = addr.parse()?;
                Ok(TcpStream::connect(addr).await?)
            }
            Self::Host { host, port } => {
                // tokio::net::lookup_host performs the system's standard
                // A/AAAA resolution (no SRV lookup) and TcpStream::connect
                // accepts anything implementing ToSocketAddrs directly, so
                // this already tries each returned address in order.
                Ok(TcpStream::connect((host.as_str(), *port)).await?)
            }
        }
    }
}
