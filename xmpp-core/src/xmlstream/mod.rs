// Copyright (c) 2024 Jonas Schäfer <jonas@zombofant.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Raw XML stream framing: opening/closing `<stream:stream>` headers and
//! reading/writing the top-level child elements (stanzas, SASL nonzas,
//! `<stream:features>`) exchanged over it.

mod common;

use std::io;

use bytes::BytesMut;
use minidom::Element;
use rxml::writer::TrackNamespace;
use rxml::{Event, Namespace, NcName};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub use common::{StreamHeader, Timeouts};

use crate::error::ProtocolError;

/// `http://etherx.jabber.org/streams`.
pub const STREAM_NS: &str = "http://etherx.jabber.org/streams";
/// `urn:ietf:params:xml:ns:xmpp-sasl`.
pub const SASL_NS: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
/// `urn:ietf:params:xml:ns:xmpp-bind`.
pub const BIND_NS: &str = "urn:ietf:params:xml:ns:xmpp-bind";
/// `urn:ietf:params:xml:ns:xmpp-tls`.
pub const TLS_NS: &str = "urn:ietf:params:xml:ns:xmpp-tls";
/// `urn:xmpp:sm:3`.
pub const SM_NS: &str = "urn:xmpp:sm:3";
/// `urn:ietf:params:xml:ns:xmpp-streams`, the namespace of the defined
/// condition children of a `<stream:error/>` (RFC 6120 §4.9.3).
pub const STREAM_ERROR_NS: &str = "urn:ietf:params:xml:ns:xmpp-streams";
/// `urn:ietf:params:xml:ns:xmpp-framing`, the RFC 7395 WebSocket framing
/// namespace: `<open/>`/`<close/>` nonzas replace `<stream:stream>`/
/// `</stream:stream>` when this namespace is in effect.
pub const FRAMING_NS: &str = "urn:ietf:params:xml:ns:xmpp-framing";

fn xml_escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}

/// Find the exclusive end offset of the first tag in `buf`, honoring
/// quoted attribute values (a literal `>` inside a quoted value does not
/// end the tag).
fn scan_tag_end(buf: &[u8], start: usize) -> Option<usize> {
    debug_assert_eq!(buf.get(start), Some(&b'<'));
    let mut j = start + 1;
    let mut in_quote: Option<u8> = None;
    loop {
        let b = *buf.get(j)?;
        match in_quote {
            Some(q) if b == q => in_quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => in_quote = Some(b),
                b'>' => return Some(j),
                _ => {}
            },
        }
        j += 1;
    }
}

/// Scans for the stream's opening tag, e.g. `<stream:stream ...>`. Returns
/// the exclusive end offset of the `>` once found.
fn scan_open_tag(buf: &[u8]) -> Option<usize> {
    let start = buf.iter().position(|&b| b == b'<')?;
    scan_tag_end(buf, start).map(|end| end + 1)
}

/// Scans for the first complete top-level child element after the stream
/// header, returning its exclusive end offset. XMPP stanzas never contain
/// top-level CDATA sections or comments, so those are not handled.
fn scan_complete_element(buf: &[u8]) -> Option<usize> {
    let mut i = 0;
    let mut depth = 0usize;
    let mut seen_open = false;
    loop {
        while buf.get(i).is_some_and(|&b| b != b'<') {
            i += 1;
        }
        if i >= buf.len() {
            return None;
        }
        let tag_end = scan_tag_end(buf, i)?;
        let tag = &buf[i..=tag_end];
        if tag.starts_with(b"<?") {
            // processing instruction, depth-neutral
        } else if tag.starts_with(b"</") {
            depth = depth.saturating_sub(1);
            if seen_open && depth == 0 {
                return Some(tag_end + 1);
            }
        } else if tag.ends_with(b"/>") {
            seen_open = true;
            if depth == 0 {
                return Some(tag_end + 1);
            }
        } else {
            seen_open = true;
            depth += 1;
        }
        i = tag_end + 1;
    }
}

/// Run a complete, self-contained byte fragment through a one-shot `rxml`
/// parse and assemble it into a single [`Element`].
fn parse_complete_fragment(bytes: &[u8]) -> Result<Element, ProtocolError> {
    let cursor = io::Cursor::new(bytes);
    let mut parser = rxml::Parser::new(cursor);
    let (qname, attrs) = loop {
        match parser.next() {
            Some(Ok(Event::XmlDeclaration(_, _))) => continue,
            Some(Ok(Event::StartElement(_, qname, attrs))) => break (qname, attrs),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(minidom::Error::from(e).into()),
            None => return Err(ProtocolError::UnexpectedEof),
        }
    };
    let mut builder = Element::from_events(qname, attrs);
    loop {
        match parser.next() {
            Some(Ok(ev)) => {
                if let Some(el) = builder.feed(ev).map_err(ProtocolError::from)? {
                    return Ok(el);
                }
            }
            Some(Err(e)) => return Err(minidom::Error::from(e).into()),
            None => return Err(ProtocolError::UnexpectedEof),
        }
    }
}

/// Parses the stream header open-tag by synthesizing a matching close and
/// running it through the same one-shot parser used for stanzas.
///
/// Handles both non-self-closing preambles (`<stream:stream ...>`) and
/// already-self-closing ones (RFC 7395's `<open .../>`).
fn parse_open_tag(tag_bytes: &[u8]) -> Result<(String, String, Element), ProtocolError> {
    let mut synth = tag_bytes.to_vec();
    if !synth.ends_with(b"/>") {
        // Replace the trailing '>' with '/>' so this becomes a complete,
        // self-closing fragment.
        synth.pop();
        synth.extend_from_slice(b"/>");
    }
    let el = parse_complete_fragment(&synth)?;
    let name = el.name().to_owned();
    let ns = el.ns();
    Ok((name, ns, el))
}

/// Which outer preamble/closing markers a stream uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `<stream:stream ...>`/`</stream:stream>`, used by TCP-based
    /// transports (plain and STARTTLS).
    Stream,
    /// `<open .../>`/`<close/>` nonzas (RFC 7395 §3.4/§3.6), used by the
    /// WebSocket transport.
    WebSocket,
}

/// A raw XMPP XML stream over an arbitrary async transport.
///
/// This frames the transport's byte stream into a sequence of top-level
/// elements (after the opening `<stream:stream>` header), and serialises
/// outgoing elements the same way. It knows nothing about stanza
/// semantics; see [`crate::stanzastream`] for that layer.
pub struct XmlStream<S> {
    transport: S,
    read_buf: BytesMut,
    encoder: rxml::writer::Encoder,
    write_buf: BytesMut,
    eof: bool,
    framing: Framing,
}

impl<S: AsyncRead + AsyncWrite + Unpin> XmlStream<S> {
    /// Wrap a transport, send the opening `<stream:stream>` header and wait
    /// for the peer's header in response, returning the negotiated stream
    /// ID.
    pub async fn initiate(
        transport: S,
        header: &StreamHeader,
    ) -> Result<(Self, String), ProtocolError> {
        Self::initiate_with_framing(transport, header, Framing::Stream).await
    }

    /// Like [`XmlStream::initiate`], but frames the preamble/epilogue as
    /// RFC 7395 `<open/>`/`<close/>` nonzas instead of
    /// `<stream:stream>`/`</stream:stream>`, for use over a WebSocket
    /// transport.
    pub async fn initiate_websocket(
        transport: S,
        header: &StreamHeader,
    ) -> Result<(Self, String), ProtocolError> {
        Self::initiate_with_framing(transport, header, Framing::WebSocket).await
    }

    /// Restart this stream in place (RFC 6120 §6.2, after a successful
    /// SASL negotiation, or after STARTTLS). Reuses the same [`Framing`]
    /// this stream was created with.
    pub async fn restart(self, header: &StreamHeader) -> Result<(Self, String), ProtocolError> {
        Self::initiate_with_framing(self.transport, header, self.framing).await
    }

    async fn initiate_with_framing(
        mut transport: S,
        header: &StreamHeader,
        framing: Framing,
    ) -> Result<(Self, String), ProtocolError> {
        let mut encoder = rxml::writer::Encoder::new();

        let (open, root_name, root_ns): (String, &str, &str) = match framing {
            Framing::Stream => {
                encoder.ns_tracker_mut().declare_fixed(
                    Some(NcName::try_from("stream".to_owned()).unwrap()),
                    Namespace::from(STREAM_NS.to_owned()),
                );
                encoder.ns_tracker_mut().declare_fixed(
                    None,
                    Namespace::from(crate::stanza::ns::JABBER_CLIENT.to_owned()),
                );

                let mut open = format!(
                    "<?xml version='1.0'?><stream:stream xmlns='{}' xmlns:stream='{}' version='{}'",
                    crate::stanza::ns::JABBER_CLIENT,
                    STREAM_NS,
                    xml_escape_attr(&header.version),
                );
                if let Some(to) = &header.to {
                    open.push_str(&format!(" to='{}'", xml_escape_attr(&to.to_string())));
                }
                if let Some(from) = &header.from {
                    open.push_str(&format!(" from='{}'", xml_escape_attr(&from.to_string())));
                }
                if let Some(lang) = &header.lang {
                    open.push_str(&format!(" xml:lang='{}'", xml_escape_attr(lang)));
                }
                open.push('>');
                (open, "stream", STREAM_NS)
            }
            Framing::WebSocket => {
                encoder
                    .ns_tracker_mut()
                    .declare_fixed(None, Namespace::from(FRAMING_NS.to_owned()));

                let mut open = format!(
                    "<open xmlns='{}' version='{}'",
                    FRAMING_NS,
                    xml_escape_attr(&header.version),
                );
                if let Some(to) = &header.to {
                    open.push_str(&format!(" to='{}'", xml_escape_attr(&to.to_string())));
                }
                if let Some(from) = &header.from {
                    open.push_str(&format!(" from='{}'", xml_escape_attr(&from.to_string())));
                }
                if let Some(lang) = &header.lang {
                    open.push_str(&format!(" xml:lang='{}'", xml_escape_attr(lang)));
                }
                open.push_str("/>");
                (open, "open", FRAMING_NS)
            }
        };
        transport.write_all(open.as_bytes()).await.map_err(|e| {
            ProtocolError::InvalidStanza(format!("failed to send stream header: {e}"))
        })?;

        let mut read_buf = BytesMut::new();
        let stream_id = loop {
            if let Some(end) = scan_open_tag(&read_buf) {
                let tag = read_buf.split_to(end);
                let (name, ns, el) = parse_open_tag(&tag)?;
                if name != root_name || ns != root_ns {
                    return Err(ProtocolError::InvalidStreamStart);
                }
                break el.attr("id").ok_or(ProtocolError::NoStreamId)?.to_owned();
            }
            let n = transport
                .read_buf(&mut read_buf)
                .await
                .map_err(|e| ProtocolError::InvalidStanza(format!("read error: {e}")))?;
            if n == 0 {
                return Err(ProtocolError::UnexpectedEof);
            }
        };

        Ok((
            Self {
                transport,
                read_buf,
                encoder,
                write_buf: BytesMut::new(),
                eof: false,
                framing,
            },
            stream_id,
        ))
    }

    /// Read the next top-level element (stanza, nonza, or
    /// `<stream:features>`), or `None` on a clean stream close.
    pub async fn read_element(&mut self) -> Result<Option<Element>, ProtocolError> {
        loop {
            if let Some(end) = scan_complete_element(&self.read_buf) {
                let chunk = self.read_buf.split_to(end);
                return Ok(Some(parse_complete_fragment(&chunk)?));
            }
            if self.eof {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(ProtocolError::UnexpectedEof);
            }
            let n = self
                .transport
                .read_buf(&mut self.read_buf)
                .await
                .map_err(|e| ProtocolError::InvalidStanza(format!("read error: {e}")))?;
            if n == 0 {
                self.eof = true;
            }
        }
    }

    /// Serialise and send a single top-level element.
    pub async fn send_element(&mut self, el: &Element) -> Result<(), ProtocolError> {
        self.write_buf.clear();
        el.write_into(&mut self.encoder, &mut self.write_buf)?;
        self.transport
            .write_all(&self.write_buf)
            .await
            .map_err(|e| ProtocolError::InvalidStanza(format!("write error: {e}")))?;
        Ok(())
    }

    /// Send the closing marker (`</stream:stream>`, or RFC 7395's `<close/>`
    /// nonza over WebSocket) and flush.
    pub async fn send_close(&mut self) -> Result<(), ProtocolError> {
        let bytes: &[u8] = match self.framing {
            Framing::Stream => b"</stream:stream>",
            Framing::WebSocket => b"<close xmlns='urn:ietf:params:xml:ns:xmpp-framing'/>",
        };
        self.transport
            .write_all(bytes)
            .await
            .map_err(|e| ProtocolError::InvalidStanza(format!("write error: {e}")))?;
        self.transport
            .flush()
            .await
            .map_err(|e| ProtocolError::InvalidStanza(format!("flush error: {e}")))?;
        Ok(())
    }

    /// Consume this stream and return the underlying transport, e.g. to
    /// hand it to a TLS connector after `<starttls/>` succeeds.
    pub fn into_inner(self) -> S {
        self.transport
    }

    /// Borrow the underlying transport (e.g. to inspect TLS session info
    /// for channel binding).
    pub fn inner(&self) -> &S {
        &self.transport
    }

    /// Erase the transport's concrete type, so streams produced by
    /// different [`crate::connect::ServerConnector`] impls can be held
    /// behind a single type across reconnects.
    pub fn box_stream(self) -> XmlStream<Box<dyn crate::connect::AsyncReadAndWrite>>
    where
        S: crate::connect::AsyncReadAndWrite + 'static,
    {
        XmlStream {
            transport: Box::new(self.transport),
            read_buf: self.read_buf,
            encoder: self.encoder,
            write_buf: self.write_buf,
            eof: self.eof,
            framing: self.framing,
        }
    }
}

/// The features advertised in a `<stream:features>` element.
#[derive(Debug, Clone, Default)]
pub struct StreamFeatures {
    /// SASL mechanism names offered by the server.
    pub mechanisms: Vec<String>,
    /// Whether resource binding is offered.
    pub can_bind: bool,
    /// Whether `<starttls/>` is offered.
    pub can_starttls: bool,
    /// Whether STARTTLS is mandatory-to-negotiate.
    pub starttls_required: bool,
    /// Whether XEP-0198 Stream Management is offered.
    pub can_sm: bool,
    /// Whether the peer advertises the legacy RFC 3921 session-establishment
    /// IQ. Deprecated since RFC 6121, but still required by some servers.
    pub can_session: bool,
}

impl StreamFeatures {
    /// Parse a `<stream:features>` element.
    pub fn from_element(el: &Element) -> Self {
        let mut out = Self::default();
        for child in el.children() {
            if child.is("mechanisms", SASL_NS) {
                out.mechanisms = child
                    .children()
                    .filter(|m| m.is("mechanism", SASL_NS))
                    .map(Element::text)
                    .collect();
            } else if child.is("bind", BIND_NS) {
                out.can_bind = true;
            } else if child.is("starttls", TLS_NS) {
                out.can_starttls = true;
                out.starttls_required = child.has_child("required", TLS_NS);
            } else if child.is("sm", SM_NS) {
                out.can_sm = true;
            } else if child.is("session", crate::stanza::ns::SESSION) {
                out.can_session = true;
            }
        }
        out
    }

    /// Whether STARTTLS negotiation should be attempted.
    pub fn can_starttls(&self) -> bool {
        self.can_starttls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn initiate_exchanges_headers() {
        let (client_io, mut server_io) = duplex(4096);
        let header = StreamHeader::client_to_server("example.com".parse().unwrap());

        let client = tokio::spawn(async move { XmlStream::initiate(client_io, &header).await });

        let mut server_buf = BytesMut::new();
        loop {
            let n = server_io.read_buf(&mut server_buf).await.unwrap();
            assert!(n > 0);
            if scan_open_tag(&server_buf).is_some() {
                break;
            }
        }
        server_io
            .write_all(
                b"<?xml version='1.0'?><stream:stream xmlns='jabber:client' \
                   xmlns:stream='http://etherx.jabber.org/streams' id='abc123' \
                   version='1.0'>",
            )
            .await
            .unwrap();

        let (_, stream_id) = client.await.unwrap().unwrap();
        assert_eq!(stream_id, "abc123");
    }

    #[tokio::test]
    async fn initiate_websocket_uses_open_close_nonzas() {
        let (client_io, mut server_io) = duplex(4096);
        let header = StreamHeader::client_to_server("example.com".parse().unwrap());

        let client =
            tokio::spawn(async move { XmlStream::initiate_websocket(client_io, &header).await });

        let mut server_buf = BytesMut::new();
        loop {
            let n = server_io.read_buf(&mut server_buf).await.unwrap();
            assert!(n > 0);
            if scan_open_tag(&server_buf).is_some() {
                break;
            }
        }
        assert!(server_buf.starts_with(b"<open "));
        assert!(!server_buf.starts_with(b"<?xml"));
        server_io
            .write_all(
                b"<open xmlns='urn:ietf:params:xml:ns:xmpp-framing' id='ws42' version='1.0'/>",
            )
            .await
            .unwrap();

        let (mut stream, stream_id) = client.await.unwrap().unwrap();
        assert_eq!(stream_id, "ws42");

        stream.send_close().await.unwrap();
        let mut closing = [0u8; 64];
        let n = server_io.read(&mut closing).await.unwrap();
        assert_eq!(
            &closing[..n],
            b"<close xmlns='urn:ietf:params:xml:ns:xmpp-framing'/>"
        );
    }

    #[tokio::test]
    async fn initiate_websocket_rejects_stream_framing_response() {
        let (client_io, mut server_io) = duplex(4096);
        let header = StreamHeader::client_to_server("example.com".parse().unwrap());

        let client =
            tokio::spawn(async move { XmlStream::initiate_websocket(client_io, &header).await });

        let mut server_buf = BytesMut::new();
        loop {
            let n = server_io.read_buf(&mut server_buf).await.unwrap();
            assert!(n > 0);
            if scan_open_tag(&server_buf).is_some() {
                break;
            }
        }
        server_io
            .write_all(
                b"<?xml version='1.0'?><stream:stream xmlns='jabber:client' \
                   xmlns:stream='http://etherx.jabber.org/streams' id='abc123' \
                   version='1.0'>",
            )
            .await
            .unwrap();

        let err = client.await.unwrap().unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStreamStart));
    }

    #[test]
    fn scans_self_closing_element() {
        let buf = b"<a/><b></b>";
        let end = scan_complete_element(buf).unwrap();
        assert_eq!(&buf[..end], b"<a/>");
    }

    #[test]
    fn scans_nested_element() {
        let buf = b"<iq><query/></iq><next/>";
        let end = scan_complete_element(buf).unwrap();
        assert_eq!(&buf[..end], b"<iq><query/></iq>");
    }

    #[test]
    fn ignores_gt_inside_quoted_attribute() {
        let buf = b"<iq a='1>2'/>tail";
        let end = scan_complete_element(buf).unwrap();
        assert_eq!(&buf[..end], b"<iq a='1>2'/>");
    }

    #[test]
    fn returns_none_on_incomplete_element() {
        let buf = b"<iq><query";
        assert_eq!(scan_complete_element(buf), None);
    }

    #[test]
    fn parses_stream_features() {
        let el = Element::builder("features", STREAM_NS)
            .append(
                Element::builder("mechanisms", SASL_NS)
                    .append(
                        Element::builder("mechanism", SASL_NS)
                            .append(crate::stanza::text_node("SCRAM-SHA-1".into()))
                            .build(),
                    )
                    .build(),
            )
            .append(Element::bare("bind", BIND_NS))
            .build();
        let features = StreamFeatures::from_element(&el);
        assert_eq!(features.mechanisms, vec!["SCRAM-SHA-1".to_owned()]);
        assert!(features.can_bind);
        assert!(!features.can_starttls);
    }
}
