// Copyright (c) 2019 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::io;
use std::time::Duration;

use minidom::Element;

use crate::{
    connect::{
        starttls::StartTlsConnector, tcp::PlainTcpConnector, websocket::WebSocketConnector,
        DnsConfig, ServerConnector,
    },
    error::Error,
    extensions::{DiscoResponder, Extension, ExtensionRegistry, PingResponder},
    stanzastream::{StanzaStage, StanzaState, StanzaStream, StanzaToken},
    xmlstream::{StreamFeatures, Timeouts},
    Stanza,
};

pub(crate) mod iq;
pub(crate) mod login;
mod stream;

pub use iq::{IqFailure, IqRequest, IqResponse, IqResponseToken};
use iq::IqResponseTracker;

/// Default timeout for [`Client::send_iq`], chosen well above the stream's
/// own soft-timeout/liveness-ping cycle so a slow-but-alive peer isn't
/// penalised for stream-level retransmissions. Overridable per-[`Client`]
/// via [`crate::ClientBuilder::iq_timeout`], and per-call via
/// [`Client::send_iq_timeout`].
const IQ_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the liveness probe [`Client::send_iq`] sends after a
/// configured IQ timeout elapses, to tell apart "this specific request was
/// lost" from "the whole connection is gone".
const LIVENESS_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// XMPP client connection and state
///
/// This implements the `futures` crate's [`Stream`](#impl-Stream) to receive
/// stream state changes as well as stanzas received via the stream.
///
/// To send stanzas, the [`send_stanza`][`Client::send_stanza`] method can be
/// used.
pub struct Client {
    stream: StanzaStream,
    bound_jid: Option<jid::Jid>,
    features: Option<StreamFeatures>,
    iq_response_tracker: IqResponseTracker,
    extensions: ExtensionRegistry,
    /// Default timeout for [`Client::send_iq`]. `None` means no timeout is
    /// applied unless the caller uses [`Client::send_iq_timeout`] directly.
    default_iq_timeout: Option<Duration>,
}

impl Client {
    /// Get the client's bound JID (the one reported by the XMPP
    /// server).
    pub fn bound_jid(&self) -> Option<&jid::Jid> {
        self.bound_jid.as_ref()
    }

    /// Send a stanza.
    ///
    /// This will automatically allocate an ID if the stanza has no ID set.
    /// The returned `StanzaToken` is awaited up to the [`StanzaStage::Sent`]
    /// stage, which means that this coroutine only returns once the stanza
    /// has actually been written to the XMPP transport.
    ///
    /// Note that this does not imply that it has been *reeceived* by the
    /// peer, nor that it has been successfully processed. To confirm that a
    /// stanza has been received by a peer, the [`StanzaToken::wait_for`]
    /// method can be called with [`StanzaStage::Acked`], but that stage will
    /// only ever be reached if the server supports XEP-0198 and it has been
    /// negotiated successfully (this may change in the future).
    pub async fn send_stanza(&mut self, mut stanza: Stanza) -> Result<StanzaToken, io::Error> {
        stanza.ensure_id();
        let mut token = self.stream.send(Box::new(stanza)).await;
        match token.wait_for(StanzaStage::Sent).await {
            // Queued < Sent, so it cannot be reached.
            Some(StanzaState::Queued) => unreachable!(),

            None | Some(StanzaState::Dropped) => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "stream disconnected fatally before stanza could be sent",
            )),
            Some(StanzaState::Failed { error }) => Err(error.into_io_error()),
            Some(StanzaState::Sent { .. }) | Some(StanzaState::Acked { .. }) => Ok(token),
        }
    }

    /// Register a new [`Extension`] to answer inbound IQ requests.
    ///
    /// Extensions are tried in registration order; the first one whose
    /// [`Extension::handle_iq`] returns `Some` claims the request and no
    /// later extension (including the built-in [`PingResponder`]/
    /// [`DiscoResponder`]) is ever consulted for it.
    pub fn register_extension(&mut self, extension: Box<dyn Extension>) {
        self.extensions.register(extension);
    }

    /// Look up a registered extension by its [`Extension::name`].
    pub fn get_extension(&self, name: &str) -> Option<&dyn Extension> {
        self.extensions.get_extension(name)
    }

    /// Mutable counterpart of [`Client::get_extension`], useful for
    /// reconfiguring a responder in place (e.g. updating the features a
    /// [`DiscoResponder`] advertises).
    pub fn get_extension_mut(&mut self, name: &str) -> Option<&mut (dyn Extension + 'static)> {
        self.extensions.get_extension_mut(name)
    }

    /// Look up a registered extension by its [`Extension::namespace`].
    pub fn get_extension_by_namespace(&self, namespace: &str) -> Option<&dyn Extension> {
        self.extensions.get_extension_by_namespace(namespace)
    }

    /// Mutable counterpart of [`Client::get_extension_by_namespace`].
    pub fn get_extension_by_namespace_mut(
        &mut self,
        namespace: &str,
    ) -> Option<&mut (dyn Extension + 'static)> {
        self.extensions.get_extension_by_namespace_mut(namespace)
    }

    /// Get the stream features (`<stream:features/>`) of the underlying
    /// stream.
    ///
    /// If the stream has not completed negotiation yet, this will return
    /// `None`. Note that stream features may change at any point due to a
    /// transparent reconnect.
    pub fn get_stream_features(&self) -> Option<&StreamFeatures> {
        self.features.as_ref()
    }

    /// Close the client cleanly.
    ///
    /// This performs an orderly stream shutdown, ensuring that all resources
    /// are correctly cleaned up.
    pub async fn send_end(self) -> Result<(), Error> {
        self.stream.close().await;
        Ok(())
    }

    /// Send an IQ request and wait for the matching response.
    ///
    /// The request is addressed `to` (server if `None`) and assigned a
    /// fresh, internally-tracked ID. Races the response against this
    /// client's configured default timeout (see
    /// [`crate::ClientBuilder::iq_timeout`]); a timed-out request's
    /// tracking entry is dropped, so a late reply from the peer is simply
    /// ignored. If the timeout elapses, a liveness probe distinguishes a
    /// merely slow/lost request ([`IqFailure::Timeout`]) from a dead
    /// connection ([`IqFailure::ConnectionLost`]).
    pub async fn send_iq(
        &mut self,
        to: Option<jid::Jid>,
        request: IqRequest,
    ) -> Result<IqResponse, IqFailure> {
        self.send_iq_timeout(to, request, self.default_iq_timeout).await
    }

    /// Like [`Client::send_iq`], but with an explicit timeout overriding
    /// this client's configured default. `None` means wait indefinitely.
    pub async fn send_iq_timeout(
        &mut self,
        to: Option<jid::Jid>,
        request: IqRequest,
        timeout: Option<Duration>,
    ) -> Result<IqResponse, IqFailure> {
        let (iq, mut token) = self.iq_response_tracker.allocate_iq_handle(None, to, request);
        let stanza_token = self.send_stanza(Stanza::Iq(iq)).await.map_err(IqFailure::SendError)?;
        token.set_stanza_token(stanza_token);
        let Some(timeout) = timeout else {
            return token.await;
        };
        match tokio::time::timeout(timeout, token).await {
            Ok(result) => result,
            Err(_elapsed) => {
                if self.probe_liveness().await {
                    Err(IqFailure::Timeout)
                } else {
                    Err(IqFailure::ConnectionLost)
                }
            }
        }
    }

    /// Send a XEP-0199 ping to the server and wait briefly for a reply,
    /// used as a safety net after an IQ timeout to tell a merely slow
    /// response apart from a dead connection. Returns `true` if the peer
    /// is still reachable.
    async fn probe_liveness(&mut self) -> bool {
        let ping = Element::builder("ping", crate::stanza::ns::PING).build();
        let (iq, mut token) =
            self.iq_response_tracker
                .allocate_iq_handle(None, None, IqRequest::Get(ping));
        let stanza_token = match self.send_stanza(Stanza::Iq(iq)).await {
            Ok(token) => token,
            Err(_) => return false,
        };
        token.set_stanza_token(stanza_token);
        matches!(
            tokio::time::timeout(LIVENESS_PROBE_TIMEOUT, token).await,
            Ok(Ok(_))
        )
    }
}

impl Client {
    /// Start a new XMPP client using STARTTLS transport, resolving the
    /// server via `host`/`port`, and autoreconnect.
    ///
    /// Start polling the returned instance so that it will connect and
    /// yield events.
    pub fn new(jid: jid::Jid, password: String, host: &str, port: u16) -> Self {
        Self::new_starttls(jid, password, DnsConfig::host(host, port), Timeouts::default())
    }

    /// Start a new XMPP client with STARTTLS transport and a specific DNS
    /// configuration.
    pub fn new_starttls(
        jid: jid::Jid,
        password: String,
        dns_config: DnsConfig,
        timeouts: Timeouts,
    ) -> Self {
        Self::new_with_connector(jid, password, StartTlsConnector::from(dns_config), timeouts)
    }

    /// Start a new XMPP client with a plaintext, unencrypted TCP connection.
    ///
    /// This should only ever be used against `localhost` or over a
    /// transport that is already secured some other way (e.g. a VPN).
    pub fn new_plaintext(
        jid: jid::Jid,
        password: String,
        dns_config: DnsConfig,
        timeouts: Timeouts,
    ) -> Self {
        Self::new_with_connector(jid, password, PlainTcpConnector::new(dns_config), timeouts)
    }

    /// Start a new XMPP client over a secure WebSocket (RFC 7395) transport.
    pub fn new_websocket(
        jid: jid::Jid,
        password: String,
        dns_config: DnsConfig,
        url: String,
        timeouts: Timeouts,
    ) -> Self {
        Self::new_with_connector(
            jid,
            password,
            WebSocketConnector::new(dns_config, url),
            timeouts,
        )
    }

    /// Start a new client given an already-configured [`ServerConnector`].
    pub fn new_with_connector<C: ServerConnector>(
        jid: jid::Jid,
        password: String,
        connector: C,
        timeouts: Timeouts,
    ) -> Self {
        Self::new_with_connector_and_queue_depth(jid, password, connector, timeouts, 16)
    }

    /// Like [`Client::new_with_connector`], but with an explicit stanza
    /// queue depth (see [`crate::stanzastream::StanzaStream::new`]).
    pub(crate) fn new_with_connector_and_queue_depth<C: ServerConnector>(
        jid: jid::Jid,
        password: String,
        connector: C,
        timeouts: Timeouts,
        queue_depth: usize,
    ) -> Self {
        Self::new_full(
            jid,
            password,
            connector,
            timeouts,
            queue_depth,
            false,
            Some(IQ_RESPONSE_TIMEOUT),
        )
    }

    /// Fully-parameterised constructor backing [`crate::ClientConfig`].
    pub(crate) fn new_full<C: ServerConnector>(
        jid: jid::Jid,
        password: String,
        connector: C,
        timeouts: Timeouts,
        queue_depth: usize,
        enable_carbons: bool,
        default_iq_timeout: Option<Duration>,
    ) -> Self {
        let mut extensions = ExtensionRegistry::new();
        extensions.register(Box::new(PingResponder::new()));
        extensions.register(Box::new(DiscoResponder::default()));
        Self {
            stream: StanzaStream::new_c2s(
                connector,
                jid,
                password,
                timeouts,
                queue_depth,
                enable_carbons,
            ),
            bound_jid: None,
            features: None,
            iq_response_tracker: IqResponseTracker::new(),
            extensions,
            default_iq_timeout,
        }
    }
}
