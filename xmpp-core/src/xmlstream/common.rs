// Copyright (c) 2024 Jonas Schäfer <jonas@zombofant.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use core::time::Duration;

/// Configuration for timeouts on an XML stream.
///
/// The defaults are tuned toward common desktop/laptop use and may not hold
/// up to extreme conditions (arctic satellite link, mobile internet on a
/// train in Brandenburg, Germany, and similar) and may be inefficient in
/// other conditions (stable server link, localhost communication).
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Maximum silence time before a soft timeout is signalled to the
    /// caller. Soft timeouts are not fatal; the caller is expected to send
    /// a keepalive (whitespace ping or XEP-0199 ping) in response.
    pub read_timeout: Duration,

    /// Maximum silence after a soft timeout has been signalled before the
    /// connection is considered dead and torn down.
    pub response_timeout: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read_timeout: Duration::new(300, 0),
            response_timeout: Duration::new(300, 0),
        }
    }
}

impl Timeouts {
    /// Tight timeouts suitable for communicating on a fast LAN or localhost.
    pub fn tight() -> Self {
        Self {
            read_timeout: Duration::new(60, 0),
            response_timeout: Duration::new(15, 0),
        }
    }
}

/// The opening `<stream:stream>` tag exchanged by both peers at the start
/// (and, after STARTTLS or SASL success, restart) of an XMPP connection.
#[derive(Debug, Clone)]
pub struct StreamHeader {
    /// `from='...'`, the identity of the sender of the header.
    pub from: Option<jid::Jid>,
    /// `to='...'`, the identity the header is addressed to.
    pub to: Option<jid::Jid>,
    /// `id='...'`, the stream ID assigned by the server (empty when sent
    /// by the initiating client).
    pub id: String,
    /// `version='...'`, normally `"1.0"`.
    pub version: String,
    /// `xml:lang='...'`.
    pub lang: Option<String>,
}

impl StreamHeader {
    /// Build the client-to-server opening header for `to`.
    pub fn client_to_server(to: jid::Jid) -> Self {
        Self {
            from: None,
            to: Some(to),
            id: String::new(),
            version: "1.0".to_owned(),
            lang: Some("en".to_owned()),
        }
    }
}
