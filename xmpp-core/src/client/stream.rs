// Copyright (c) 2019 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use core::ops::ControlFlow;
use core::{pin::Pin, task::Context};
use futures::{ready, task::Poll, Stream};

use crate::{
    client::Client,
    extensions,
    stanza::StanzaError,
    stanzastream::{Event as StanzaStreamEvent, StreamEvent},
    Event, Stanza,
};

/// Incoming XMPP events
///
/// In an `async fn` you may want to use this with `use
/// futures::stream::StreamExt;`
impl Stream for Client {
    type Item = Event;

    /// Low-level read on the XMPP stream, allowing the underlying
    /// machinery to:
    ///
    /// * connect,
    /// * starttls,
    /// * authenticate,
    /// * bind a session, and finally
    /// * receive stanzas
    ///
    /// ...for your client
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        loop {
            return Poll::Ready(match ready!(Pin::new(&mut self.stream).poll_next(cx)) {
                None => None,
                Some(StanzaStreamEvent::Stanza(st)) => match st {
                    Stanza::Iq(iq) => match self.iq_response_tracker.handle_iq(iq) {
                        ControlFlow::Break(()) => continue,
                        ControlFlow::Continue(iq) if iq.is_request() => {
                            let response = self
                                .extensions
                                .dispatch(&iq)
                                .unwrap_or_else(|| {
                                    crate::client::IqResponse::Error(
                                        StanzaError::feature_not_implemented(),
                                    )
                                });
                            let reply = extensions::reply(&iq, response);
                            if let Err(dropped) =
                                self.stream.try_send_untracked(Stanza::Iq(reply))
                            {
                                log::warn!(
                                    "dropped auto-reply to IQ {:?}: outgoing queue full or stream gone",
                                    dropped
                                );
                            }
                            continue;
                        }
                        ControlFlow::Continue(iq) => Some(Event::Stanza(Stanza::Iq(iq))),
                    },
                    other => Some(Event::Stanza(other)),
                },
                Some(StanzaStreamEvent::Stream(StreamEvent::Reset {
                    bound_jid,
                    features,
                })) => {
                    self.features = Some(features);
                    self.bound_jid = Some(bound_jid.clone());
                    Some(Event::Online { bound_jid })
                }
                Some(StanzaStreamEvent::Stream(StreamEvent::Resumed)) => {
                    Some(Event::StreamManagementResumed)
                }
                Some(StanzaStreamEvent::Stream(StreamEvent::SmFailed { criticity, reason })) => {
                    Some(Event::StreamManagementFailed { criticity, reason })
                }
                Some(StanzaStreamEvent::Stream(StreamEvent::FullyConnected)) => {
                    Some(Event::FullyConnected)
                }
                Some(StanzaStreamEvent::Stream(StreamEvent::ProtocolError {
                    criticity,
                    reason,
                    details,
                })) => Some(Event::ConnectionStatus {
                    connected: false,
                    criticity,
                    reason,
                    details,
                }),
                Some(StanzaStreamEvent::Stream(StreamEvent::ReadError { reason })) => Some(
                    Event::Error(crate::error::Error::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        reason,
                    ))),
                ),
                Some(StanzaStreamEvent::Stream(StreamEvent::Suspended)) => {
                    Some(Event::ConnectionStatus {
                        connected: false,
                        criticity: crate::Criticity::Transient,
                        reason: "connection lost, attempting to resume".to_owned(),
                        details: None,
                    })
                }
            });
        }
    }
}
