//! `ServerConnector` for TCP + STARTTLS connections.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use sasl::common::ChannelBinding;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::{client::TlsStream, TlsConnector};

use minidom::Element;

use crate::connect::{proxy::ProxyConfig, DnsConfig, ServerConnector, ServerConnectorError};
use crate::error::{Error, ProtocolError};
use crate::xmlstream::{StreamFeatures, StreamHeader, XmlStream, TLS_NS};

/// Connects via TCP, then STARTTLS, to an XMPP server.
#[derive(Debug, Clone)]
pub struct StartTlsConnector {
    dns: DnsConfig,
    proxy: Option<ProxyConfig>,
}

impl From<DnsConfig> for StartTlsConnector {
    fn from(dns: DnsConfig) -> Self {
        Self { dns, proxy: None }
    }
}

impl StartTlsConnector {
    /// Connect through an HTTP CONNECT proxy tunnel before negotiating TLS.
    pub fn with_proxy(dns: DnsConfig, proxy: ProxyConfig) -> Self {
        Self {
            dns,
            proxy: Some(proxy),
        }
    }

    fn root_store() -> RootCertStore {
        let mut root_store = RootCertStore::empty();
        #[cfg(feature = "webpki-roots")]
        {
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        #[cfg(feature = "rustls-native-certs")]
        {
            if let Ok(certs) = rustls_native_certs::load_native_certs() {
                root_store.add_parsable_certificates(certs);
            }
        }
        root_store
    }
}

impl ServerConnector for StartTlsConnector {
    type Stream = TlsStream<TcpStream>;

    async fn connect(
        &self,
        jid: &jid::Jid,
    ) -> Result<(XmlStream<Self::Stream>, StreamFeatures), Error> {
        let tcp_stream = match &self.proxy {
            Some(proxy) => proxy.connect(&self.dns).await?,
            None => self.dns.resolve().await?,
        };

        let header = StreamHeader::client_to_server(jid.clone());
        let (mut plain_stream, _id) = XmlStream::initiate(tcp_stream, &header).await?;
        let features_el = plain_stream
            .read_element()
            .await?
            .ok_or(Error::Disconnected)?;
        let features = StreamFeatures::from_element(&features_el);

        if !features.can_starttls() {
            return Err(ProtocolError::NoTls.into());
        }

        plain_stream
            .send_element(&Element::bare("starttls", TLS_NS))
            .await?;
        loop {
            match plain_stream.read_element().await? {
                Some(el) if el.is("proceed", TLS_NS) => break,
                Some(el) if el.is("failure", TLS_NS) => return Err(ProtocolError::NoTls.into()),
                Some(_) => continue,
                None => return Err(Error::Disconnected),
            }
        }

        let tcp_stream = plain_stream.into_inner();
        let domain = ServerName::try_from(jid.domain().to_owned())
            .map_err(|e| StartTlsError::DnsName(e.to_string()))?;
        let config = ClientConfig::builder()
            .with_root_certificates(Self::root_store())
            .with_no_client_auth();
        let tls_stream = TlsConnector::from(Arc::new(config))
            .connect(domain, tcp_stream)
            .await?;

        let (mut stream, _id) = XmlStream::initiate(tls_stream, &header).await?;
        let features_el = stream.read_element().await?.ok_or(Error::Disconnected)?;
        let features = StreamFeatures::from_element(&features_el);
        Ok((stream, features))
    }

    fn channel_binding(stream: &Self::Stream) -> Result<ChannelBinding, Error> {
        let (_, connection) = stream.get_ref();
        Ok(match connection.protocol_version() {
            Some(tokio_rustls::rustls::ProtocolVersion::TLSv1_3) => {
                let data = vec![0u8; 32];
                let data = connection
                    .export_keying_material(data, b"EXPORTER-Channel-Binding", None)
                    .map_err(|e| StartTlsError::Tls(e.to_string()))?;
                ChannelBinding::TlsExporter(data)
            }
            // Channel binding via tls-server-end-point for TLS 1.2 is not
            // implemented; PLAIN/SCRAM without -PLUS still works.
            _ => ChannelBinding::None,
        })
    }
}

/// Errors specific to [`StartTlsConnector`].
#[derive(Debug)]
pub enum StartTlsError {
    /// TLS handshake or key export failure.
    Tls(String),
    /// The server's hostname isn't a valid DNS name for certificate
    /// validation purposes.
    DnsName(String),
}

impl ServerConnectorError for StartTlsError {}

impl fmt::Display for StartTlsError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Tls(e) => write!(fmt, "TLS error: {e}"),
            Self::DnsName(e) => write!(fmt, "invalid DNS name: {e}"),
        }
    }
}

impl StdError for StartTlsError {}
