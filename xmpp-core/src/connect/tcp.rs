//! Plain, unencrypted TCP connector.
//!
//! Useful for talking to a server over `localhost`, or inside a tunnel
//! that already provides encryption. Never offers channel binding.

use sasl::common::ChannelBinding;
use tokio::net::TcpStream;

use crate::connect::{proxy::ProxyConfig, DnsConfig, ServerConnector};
use crate::xmlstream::{StreamFeatures, StreamHeader, XmlStream};
use crate::Error;

/// Connects over plain TCP, with no transport encryption.
#[derive(Debug, Clone)]
pub struct PlainTcpConnector {
    dns: DnsConfig,
    proxy: Option<ProxyConfig>,
}

impl PlainTcpConnector {
    /// Connect directly, resolving `dns` at connect time.
    pub fn new(dns: DnsConfig) -> Self {
        Self { dns, proxy: None }
    }

    /// Connect through an HTTP CONNECT proxy tunnel.
    pub fn with_proxy(dns: DnsConfig, proxy: ProxyConfig) -> Self {
        Self {
            dns,
            proxy: Some(proxy),
        }
    }
}

impl ServerConnector for PlainTcpConnector {
    type Stream = TcpStream;

    async fn connect(
        &self,
        jid: &jid::Jid,
    ) -> Result<(XmlStream<Self::Stream>, StreamFeatures), Error> {
        let tcp_stream = match &self.proxy {
            Some(proxy) => proxy.connect(&self.dns).await?,
            None => self.dns.resolve().await?,
        };

        let header = StreamHeader::client_to_server(jid.clone());
        let (mut stream, _id) = XmlStream::initiate(tcp_stream, &header).await?;
        let features_el = stream.read_element().await?.ok_or(Error::Disconnected)?;
        let features = StreamFeatures::from_element(&features_el);
        Ok((stream, features))
    }

    fn channel_binding(_stream: &Self::Stream) -> Result<ChannelBinding, Error> {
        Ok(ChannelBinding::None)
    }
}
