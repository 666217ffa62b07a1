// Copyright (c) 2019 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Declarative client configuration, for callers who would rather assemble a
//! [`ClientConfig`] up front than pick between [`Client`]'s constructors.

use std::time::Duration;

use crate::connect::{
    proxy::ProxyConfig, starttls::StartTlsConnector, tcp::PlainTcpConnector,
    websocket::WebSocketConnector, DnsConfig,
};
use crate::xmlstream::Timeouts;
use crate::Client;

/// Default depth of the incoming/outgoing stanza queues; see
/// [`ClientBuilder::queue_depth`].
const DEFAULT_QUEUE_DEPTH: usize = 16;

/// Default timeout for [`Client::send_iq`]; see [`ClientBuilder::iq_timeout`].
const DEFAULT_IQ_TIMEOUT: Duration = Duration::from_secs(30);

/// Which transport to use to reach the server.
#[derive(Clone, Debug)]
enum Transport {
    StartTls { dns: DnsConfig },
    Plaintext { dns: DnsConfig },
    WebSocket { dns: DnsConfig, url: String },
}

/// Declarative description of how to connect and authenticate a [`Client`].
///
/// Build one with [`ClientBuilder`], then call [`ClientConfig::connect`] to
/// get a running [`Client`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    jid: jid::Jid,
    password: String,
    transport: Transport,
    proxy: Option<ProxyConfig>,
    timeouts: Timeouts,
    queue_depth: usize,
    enable_carbons: bool,
    iq_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Start building a configuration for `jid`/`password` connecting via
    /// STARTTLS to `host:port`.
    pub fn new(jid: jid::Jid, password: String, host: &str, port: u16) -> ClientBuilder {
        ClientBuilder {
            jid,
            password,
            transport: Transport::StartTls {
                dns: DnsConfig::host(host, port),
            },
            proxy: None,
            timeouts: Timeouts::default(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            enable_carbons: false,
            iq_timeout: Some(DEFAULT_IQ_TIMEOUT),
        }
    }

    /// Spin up the [`Client`] described by this configuration.
    ///
    /// This never blocks on network I/O: connection establishment happens
    /// lazily in the background, the same way [`Client::new`] works.
    pub fn connect(self) -> Client {
        match self.transport {
            Transport::StartTls { dns } => {
                let connector = match self.proxy {
                    Some(proxy) => StartTlsConnector::with_proxy(dns, proxy),
                    None => StartTlsConnector::from(dns),
                };
                Client::new_full(
                    self.jid,
                    self.password,
                    connector,
                    self.timeouts,
                    self.queue_depth,
                    self.enable_carbons,
                    self.iq_timeout,
                )
            }
            Transport::Plaintext { dns } => {
                let connector = match self.proxy {
                    Some(proxy) => PlainTcpConnector::with_proxy(dns, proxy),
                    None => PlainTcpConnector::new(dns),
                };
                Client::new_full(
                    self.jid,
                    self.password,
                    connector,
                    self.timeouts,
                    self.queue_depth,
                    self.enable_carbons,
                    self.iq_timeout,
                )
            }
            Transport::WebSocket { dns, url } => {
                let connector = WebSocketConnector::new(dns, url);
                Client::new_full(
                    self.jid,
                    self.password,
                    connector,
                    self.timeouts,
                    self.queue_depth,
                    self.enable_carbons,
                    self.iq_timeout,
                )
            }
        }
    }
}

/// Fluent builder for [`ClientConfig`].
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    jid: jid::Jid,
    password: String,
    transport: Transport,
    proxy: Option<ProxyConfig>,
    timeouts: Timeouts,
    queue_depth: usize,
    enable_carbons: bool,
    iq_timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Use a plaintext, unencrypted TCP connection instead of STARTTLS.
    ///
    /// This should only ever be used against `localhost` or over a
    /// transport that is already secured some other way (e.g. a VPN).
    pub fn plaintext(mut self, dns: DnsConfig) -> Self {
        self.transport = Transport::Plaintext { dns };
        self
    }

    /// Use a secure WebSocket (RFC 7395) connection to `url` instead of
    /// STARTTLS.
    pub fn websocket(mut self, dns: DnsConfig, url: String) -> Self {
        self.transport = Transport::WebSocket { dns, url };
        self
    }

    /// Route the connection through an HTTP CONNECT proxy.
    ///
    /// Has no effect when combined with [`ClientBuilder::websocket`], which
    /// has no proxy support.
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Override the default read/response timeouts.
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Override the depth of the incoming/outgoing stanza queues.
    ///
    /// See [`crate::stanzastream::StanzaStream::new`] for what this
    /// controls.
    pub fn queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth;
        self
    }

    /// Enable XEP-0280 Message Carbons during post-bind setup.
    ///
    /// Off by default: carbons change how messages are routed to other
    /// resources of the same account, which not every client expects.
    pub fn enable_carbons(mut self, enable: bool) -> Self {
        self.enable_carbons = enable;
        self
    }

    /// Override the default timeout for [`Client::send_iq`].
    ///
    /// `None` means [`Client::send_iq`] waits indefinitely for a response
    /// (a timeout can still be imposed per-call via
    /// [`Client::send_iq_timeout`]).
    pub fn iq_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.iq_timeout = timeout;
        self
    }

    /// Finish the configuration.
    pub fn build(self) -> ClientConfig {
        ClientConfig {
            jid: self.jid,
            password: self.password,
            transport: self.transport,
            proxy: self.proxy,
            timeouts: self.timeouts,
            queue_depth: self.queue_depth,
            enable_carbons: self.enable_carbons,
            iq_timeout: self.iq_timeout,
        }
    }

    /// Finish the configuration and immediately spin up the [`Client`].
    pub fn connect(self) -> Client {
        self.build().connect()
    }
}
