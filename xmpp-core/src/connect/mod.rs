//! Pluggable transports that get an XML stream ready to authenticate.

pub mod dns;
pub mod proxy;
pub mod starttls;
pub mod tcp;
pub mod websocket;

pub use dns::DnsConfig;

use sasl::common::ChannelBinding;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::xmlstream::{StreamFeatures, XmlStream};
use crate::Error;

/// Marker trait for anything that can carry an XML stream.
pub trait AsyncReadAndWrite: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadAndWrite for T {}

/// Must be implemented by a [`ServerConnector`]'s error type.
pub trait ServerConnectorError: std::error::Error + Sync + Send {}

/// Produces a ready-to-authenticate XML stream, possibly retried across
/// reconnects.
pub trait ServerConnector: Clone + core::fmt::Debug + Send + Unpin + 'static {
    /// The transport type this connector produces.
    type Stream: AsyncReadAndWrite;

    /// Connect and negotiate the stream up to (and including) any
    /// transport-level encryption, returning the stream positioned right
    /// after the post-negotiation `<stream:features>` and those features
    /// themselves.
    fn connect(
        &self,
        jid: &jid::Jid,
    ) -> impl std::future::Future<Output = Result<(XmlStream<Self::Stream>, StreamFeatures), Error>> + Send;

    /// Channel binding data for the active transport encryption, if any.
    ///
    /// Must not fail if channel binding is simply unavailable; return
    /// `Ok(ChannelBinding::None)` in that case. Only meaningful to call
    /// after the stream returned by [`Self::connect`] is established.
    fn channel_binding(_stream: &Self::Stream) -> Result<ChannelBinding, Error> {
        Ok(ChannelBinding::None)
    }
}
