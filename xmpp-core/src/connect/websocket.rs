//! `ServerConnector` for secure WebSocket (RFC 7395) connections.
//!
//! RFC 7395 frames each stanza as exactly one WebSocket text message
//! rather than a raw byte stream, so [`WsAdapter`] translates one
//! `write_all` call into one text frame and one `poll_read` fill into one
//! received frame's bytes, instead of reusing the TCP-oriented tag
//! scanner of [`crate::xmlstream`] across frame boundaries. The stream
//! preamble/epilogue is also RFC 7395-specific: `<open/>`/`<close/>`
//! nonzas in the `urn:ietf:params:xml:ns:xmpp-framing` namespace, rather
//! than `<stream:stream>`/`</stream:stream>` (see
//! [`crate::xmlstream::XmlStream::initiate_websocket`]).

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{ready, Sink, SinkExt, StreamExt};
use sasl::common::ChannelBinding;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::connect::{DnsConfig, ServerConnector};
use crate::error::ProtocolError;
use crate::xmlstream::{StreamFeatures, StreamHeader, XmlStream};
use crate::Error;

/// Connects via secure WebSocket (`wss://`) to an XMPP server.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    dns: DnsConfig,
    url: String,
}

impl WebSocketConnector {
    /// Connect to `url` (e.g. `wss://example.com/xmpp-websocket`), resolving
    /// the TCP endpoint via `dns`.
    pub fn new(dns: DnsConfig, url: String) -> Self {
        Self { dns, url }
    }
}

/// Adapts a [`WebSocketStream`] to [`AsyncRead`]/[`AsyncWrite`], framing
/// each write as one text message and surfacing each received message's
/// bytes as one read.
pub struct WsAdapter<S> {
    inner: WebSocketStream<S>,
    pending_read: Option<io::Cursor<Vec<u8>>>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for WsAdapter<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            if let Some(cursor) = self.pending_read.as_mut() {
                let start = cursor.position() as usize;
                let data = cursor.get_ref();
                let n = std::cmp::min(buf.remaining(), data.len() - start);
                buf.put_slice(&data[start..start + n]);
                cursor.set_position((start + n) as u64);
                if cursor.position() as usize >= cursor.get_ref().len() {
                    self.pending_read = None;
                }
                return Poll::Ready(Ok(()));
            }
            match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(Message::Text(text))) => {
                    self.pending_read = Some(io::Cursor::new(text.into_bytes()));
                }
                Some(Ok(Message::Binary(data))) => {
                    self.pending_read = Some(io::Cursor::new(data.to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Poll::Ready(Ok(())),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, e))),
            }
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for WsAdapter<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        ready!(self.inner.poll_ready_unpin(cx)).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let text = String::from_utf8_lossy(buf).into_owned();
        self.inner
            .start_send_unpin(Message::Text(text.into()))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Sink::<Message>::poll_flush(Pin::new(&mut self.inner), cx)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Sink::<Message>::poll_close(Pin::new(&mut self.inner), cx)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl ServerConnector for WebSocketConnector {
    type Stream = WsAdapter<MaybeTlsStream<tokio::net::TcpStream>>;

    async fn connect(
        &self,
        jid: &jid::Jid,
    ) -> Result<(XmlStream<Self::Stream>, StreamFeatures), Error> {
        let tcp_stream = self.dns.resolve().await?;

        let mut request: Request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ProtocolError::InvalidStanza(format!("invalid websocket url: {e}")))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", "xmpp".parse().unwrap());

        let (ws_stream, _response) =
            tokio_tungstenite::client_async_tls(request, tcp_stream)
                .await
                .map_err(|e| ProtocolError::InvalidStanza(format!("websocket handshake failed: {e}")))?;

        let adapter = WsAdapter {
            inner: ws_stream,
            pending_read: None,
        };

        // RFC 7395 §3.2/§3.4: the opening stream is an `<open/>` nonza, and
        // closing it is a bare `<close/>` nonza, both in the
        // xmpp-framing namespace rather than `<stream:stream>`.
        let header = StreamHeader::client_to_server(jid.clone());
        let (mut stream, _id) = XmlStream::initiate_websocket(adapter, &header).await?;
        let features_el = stream.read_element().await?.ok_or(Error::Disconnected)?;
        let features = StreamFeatures::from_element(&features_el);
        Ok((stream, features))
    }

    fn channel_binding(_stream: &Self::Stream) -> Result<ChannelBinding, Error> {
        Ok(ChannelBinding::None)
    }
}
