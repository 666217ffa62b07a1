// Copyright (c) 2019 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use core::time::Duration;

use rand::{thread_rng, Rng};

use tokio::sync::{mpsc, oneshot};

use crate::connect::AsyncReadAndWrite;
use crate::stanza::{ns, Iq};
use crate::xmlstream::{StreamFeatures, Timeouts, XmlStream};
use crate::{Criticity, Stanza};

use super::negotiation;
use super::queue::{OpaqueIoError, QueueEntry, StanzaState, TransmitQueue};
use super::stream_management::{self, SmState};
use super::{Event, StreamEvent};

/// Convenience alias for the boxed [`XmlStream`][`crate::xmlstream::XmlStream`]
/// used by [`StanzaStream`][`super::StanzaStream`] across reconnects.
pub type XmppStream = XmlStream<Box<dyn AsyncReadAndWrite>>;

/// Underlying connection for a [`StanzaStream`][`super::StanzaStream`].
pub struct Connection {
    /// The stream to use to send and receive XMPP data, authenticated but
    /// not yet bound to a resource.
    pub stream: XmppStream,

    /// The stream features offered by the peer.
    pub features: StreamFeatures,

    /// The identity this stream authenticated as.
    ///
    /// If `identity` is a bare JID, the peer will assign the resource
    /// during binding; a full JID requests (without guarantee) a specific
    /// resource.
    pub identity: jid::Jid,
}

pub(super) static PING_PROBE_ID_PREFIX: &str = "xmpp-rs-stanzastream-liveness-probe";

/// Worker loop for a [`StanzaStream`][`super::StanzaStream`].
///
/// Unlike the lower-level [`XmlStream`], this drives reconnection, resource
/// binding and XEP-0198 bookkeeping as a plain `async` task, looping
/// between "acquire a connection" and "pump it until it breaks".
pub(super) struct StanzaStreamWorker {
    reconnector: Box<dyn FnMut(oneshot::Sender<Connection>) + Send + 'static>,
    frontend_tx: mpsc::Sender<Event>,
    transmit_queue: TransmitQueue<QueueEntry>,
    timeouts: Timeouts,
    enable_carbons: bool,
}

impl StanzaStreamWorker {
    pub fn spawn(
        mut reconnector: Box<dyn FnMut(oneshot::Sender<Connection>) + Send + 'static>,
        timeouts: Timeouts,
        queue_depth: usize,
        enable_carbons: bool,
    ) -> (mpsc::Sender<QueueEntry>, mpsc::Receiver<Event>) {
        let (conn_tx, conn_rx) = oneshot::channel();
        reconnector(conn_tx);
        let (c2f_tx, c2f_rx) = mpsc::channel(queue_depth);
        let (f2c_tx, transmit_queue) = TransmitQueue::channel(queue_depth);
        let mut worker = StanzaStreamWorker {
            reconnector,
            frontend_tx: c2f_tx,
            transmit_queue,
            timeouts,
            enable_carbons,
        };
        tokio::spawn(async move { worker.run(conn_rx).await });
        (f2c_tx, c2f_rx)
    }

    /// Send an event to the frontend, returning `false` if it has hung up.
    async fn emit(&self, ev: Event) -> bool {
        self.frontend_tx.send(ev).await.is_ok()
    }

    pub async fn run(&mut self, mut next_conn: oneshot::Receiver<Connection>) {
        let mut sm_state: Option<SmState> = None;

        loop {
            let Connection {
                mut stream,
                features,
                identity,
            } = match next_conn.await {
                Ok(conn) => conn,
                Err(_) => {
                    log::error!("reconnector dropped its connection channel; giving up");
                    return;
                }
            };

            let requested_resource = identity.resource().map(str::to_owned);
            let negotiated = match negotiation::negotiate(
                &mut stream,
                requested_resource.as_deref(),
                &features,
                sm_state.take(),
                self.enable_carbons,
            )
            .await
            {
                Ok(n) => n,
                Err(e) => {
                    log::error!("stream negotiation failed: {e}; reconnecting");
                    let (tx, rx) = oneshot::channel();
                    next_conn = rx;
                    (self.reconnector)(tx);
                    continue;
                }
            };

            if self.transmit_queue.is_closed() {
                return;
            }

            if !negotiated.retransmit.is_empty() {
                self.transmit_queue.requeue_all(negotiated.retransmit);
            }

            let fresh_bind = !negotiated.resumed;
            let ev = if negotiated.resumed {
                Event::Stream(StreamEvent::Resumed)
            } else {
                Event::Stream(StreamEvent::Reset {
                    bound_jid: negotiated.bound_jid.unwrap_or(identity),
                    features: features.clone(),
                })
            };
            if !self.emit(ev).await {
                return;
            }
            if let Some((criticity, reason)) = negotiated.sm_failed {
                if !self
                    .emit(Event::Stream(StreamEvent::SmFailed { criticity, reason }))
                    .await
                {
                    return;
                }
            }
            if fresh_bind && !self.emit(Event::Stream(StreamEvent::FullyConnected)).await {
                return;
            }

            let mut sm = negotiated.sm_state;
            let outcome = self.drive_connected(&mut stream, &mut sm).await;
            sm_state = sm;

            match outcome {
                ConnectedOutcome::LocalShutdown => {
                    if let Some(sm) = sm_state.as_mut() {
                        sm.fail_all(&OpaqueIoError::from(std::io::Error::new(
                            std::io::ErrorKind::NotConnected,
                            "stream closed locally",
                        )));
                    }
                    let _ = tokio::time::timeout(LOCAL_SHUTDOWN_TIMEOUT, stream.send_close()).await;
                    return;
                }
                ConnectedOutcome::Broken(error) => {
                    log::debug!("stream broke: {error}; attempting reconnect");
                    if !self.emit(Event::Stream(StreamEvent::Suspended)).await {
                        return;
                    }
                    if self.transmit_queue.is_closed() {
                        return;
                    }
                    let (tx, rx) = oneshot::channel();
                    next_conn = rx;
                    (self.reconnector)(tx);
                }
            }
        }
    }

    /// Pump a negotiated stream until it breaks or the frontend asks us to
    /// stop (by dropping the transmit queue's sender).
    async fn drive_connected<S: AsyncReadAndWrite>(
        &mut self,
        stream: &mut XmlStream<S>,
        sm: &mut Option<SmState>,
    ) -> ConnectedOutcome {
        let mut ping_ctr: u64 = thread_rng().gen();

        loop {
            let read_fut = tokio::time::timeout(self.timeouts.read_timeout, stream.read_element());
            tokio::select! {
                entry = self.transmit_queue.recv() => {
                    let Some(entry) = entry else {
                        return ConnectedOutcome::LocalShutdown;
                    };
                    let el = minidom::Element::from((*entry.stanza).clone());
                    match stream.send_element(&el).await {
                        Ok(()) => {
                            entry.token.send_replace(StanzaState::Sent {});
                            if let Some(sm) = sm.as_mut() {
                                sm.enqueue(entry);
                            }
                        }
                        Err(e) => {
                            let opaque = OpaqueIoError::from(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
                            entry.token.send_replace(StanzaState::Failed { error: opaque.clone() });
                            if let Some(sm) = sm.as_mut() {
                                sm.fail_all(&opaque);
                            }
                            return ConnectedOutcome::Broken(opaque.to_io_error());
                        }
                    }
                }
                result = read_fut => {
                    match result {
                        Err(_elapsed) => {
                            if let Err(e) = self.on_soft_timeout(stream, sm, &mut ping_ctr).await {
                                return ConnectedOutcome::Broken(e);
                            }
                        }
                        Ok(Ok(Some(el))) => {
                            match self.handle_incoming(stream, el, sm).await {
                                Ok(true) => (),
                                Ok(false) => continue,
                                Err(e) => return ConnectedOutcome::Broken(e),
                            }
                        }
                        Ok(Ok(None)) => {
                            log::debug!("peer closed the stream");
                            return ConnectedOutcome::Broken(std::io::Error::new(
                                std::io::ErrorKind::ConnectionAborted,
                                "peer closed the XML stream",
                            ));
                        }
                        Ok(Err(e)) => {
                            let reason = e.to_string();
                            if !self
                                .emit(Event::Stream(StreamEvent::ReadError { reason: reason.clone() }))
                                .await
                            {
                                return ConnectedOutcome::Broken(std::io::Error::new(
                                    std::io::ErrorKind::NotConnected,
                                    "frontend hung up",
                                ));
                            }
                            return ConnectedOutcome::Broken(std::io::Error::new(std::io::ErrorKind::Other, reason));
                        }
                    }
                }
            }
        }
    }

    async fn on_soft_timeout<S: AsyncReadAndWrite>(
        &self,
        stream: &mut XmlStream<S>,
        sm: &mut Option<SmState>,
        ping_ctr: &mut u64,
    ) -> Result<(), std::io::Error> {
        if sm.is_some() {
            log::debug!("soft timeout tripped: requesting <sm:r/>");
            stream
                .send_element(&stream_management::request_ack())
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        } else {
            log::debug!("soft timeout tripped: no stream management, sending liveness ping");
            *ping_ctr = ping_ctr.wrapping_add(1);
            let ping = minidom::Element::builder("ping", ns::PING).build();
            let id = format!("{PING_PROBE_ID_PREFIX}-{ping_ctr}");
            let iq_el: minidom::Element = Iq {
                from: None,
                to: None,
                id,
                payload: crate::stanza::IqType::Get(ping),
            }
            .into();
            stream
                .send_element(&iq_el)
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        }
        Ok(())
    }

    /// Handle one incoming element. Returns `Ok(true)` if a stanza event
    /// was forwarded (or should be considered handled), `Ok(false)` if it
    /// was a nonza consumed internally.
    async fn handle_incoming<S: AsyncReadAndWrite>(
        &mut self,
        stream: &mut XmlStream<S>,
        el: minidom::Element,
        sm: &mut Option<SmState>,
    ) -> Result<bool, std::io::Error> {
        if el.is("a", crate::xmlstream::SM_NS) {
            if let Some(sm) = sm.as_mut() {
                if let Ok(h) = el.attr("h").unwrap_or_default().parse::<u32>() {
                    if let Err(e) = sm.remote_acked(h) {
                        log::warn!("stream management counter desync: {e}");
                    }
                }
            }
            return Ok(false);
        }
        if el.is("r", crate::xmlstream::SM_NS) {
            if let Some(sm) = sm.as_mut() {
                stream
                    .send_element(&stream_management::ack(sm.inbound_ctr()))
                    .await
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
            }
            return Ok(false);
        }
        if el.is("close", crate::xmlstream::FRAMING_NS) {
            log::debug!("peer sent RFC 7395 <close/> nonza");
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "peer sent <close/> nonza",
            ));
        }
        if el.is("error", crate::xmlstream::STREAM_NS) {
            let (criticity, reason, details) = classify_stream_error(&el);
            log::warn!("peer sent <stream:error/>: {reason} ({criticity:?}){}", details.as_deref().map(|d| format!(": {d}")).unwrap_or_default());
            if criticity == Criticity::Fatal {
                *sm = None;
            }
            if !self
                .emit(Event::Stream(StreamEvent::ProtocolError {
                    criticity,
                    reason: reason.clone(),
                    details,
                }))
                .await
            {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "frontend hung up",
                ));
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("peer sent <stream:error/>: {reason}"),
            ));
        }
        if el.name() != "iq" && el.name() != "message" && el.name() != "presence" {
            log::debug!("ignoring unrecognised top-level element <{}/>", el.name());
            return Ok(false);
        }
        if el.ns() != ns::JABBER_CLIENT {
            return Ok(false);
        }
        if let Some(sm) = sm.as_mut() {
            sm.note_inbound();
        }
        match Stanza::try_from(el) {
            Ok(stanza) => {
                if !self.emit(Event::Stanza(stanza)).await {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::NotConnected,
                        "frontend hung up",
                    ));
                }
                Ok(true)
            }
            Err(e) => {
                log::warn!("dropping unparseable stanza: {e}");
                Ok(false)
            }
        }
    }
}

/// Classify a `<stream:error/>` element (RFC 6120 §4.9.3) into a severity,
/// the defined-condition name (or a generic reason if none was
/// recognised), and the optional human-readable `<text/>` child.
pub(super) fn classify_stream_error(el: &minidom::Element) -> (Criticity, String, Option<String>) {
    const FATAL: &[&str] = &[
        "bad-format",
        "bad-namespace-prefix",
        "conflict",
        "host-unknown",
        "improper-addressing",
        "invalid-from",
        "invalid-namespace",
        "invalid-xml",
        "not-authorized",
        "policy-violation",
        "restricted-xml",
        "undefined-condition",
        "unsupported-encoding",
        "unsupported-stanza-type",
        "unsupported-version",
    ];
    const TRANSIENT: &[&str] = &[
        "connection-timeout",
        "host-gone",
        "internal-server-error",
        "remote-connection-failed",
        "reset",
        "resource-constraint",
        "system-shutdown",
    ];
    const INFORMATIONAL: &[&str] = &["see-other-host"];

    let condition = el
        .children()
        .find(|child| child.ns() == crate::xmlstream::STREAM_ERROR_NS && child.name() != "text")
        .map(|child| child.name().to_owned());
    let details = el
        .children()
        .find(|child| child.is("text", crate::xmlstream::STREAM_ERROR_NS))
        .map(|child| child.text())
        .filter(|text| !text.is_empty());

    let Some(condition) = condition else {
        return (
            Criticity::Fatal,
            "unrecognised-stream-error".to_owned(),
            details,
        );
    };

    let criticity = if FATAL.contains(&condition.as_str()) {
        Criticity::Fatal
    } else if TRANSIENT.contains(&condition.as_str()) {
        Criticity::Transient
    } else if INFORMATIONAL.contains(&condition.as_str()) {
        Criticity::Informational
    } else {
        Criticity::Transient
    };
    (criticity, condition, details)
}

enum ConnectedOutcome {
    /// The frontend closed the transmit queue; shut down gracefully.
    LocalShutdown,
    /// The connection broke and should be retried.
    Broken(std::io::Error),
}

pub(super) static LOCAL_SHUTDOWN_TIMEOUT: Duration = Duration::new(10, 0);

#[cfg(test)]
mod tests {
    use super::classify_stream_error;
    use crate::xmlstream::{STREAM_ERROR_NS, STREAM_NS};
    use crate::Criticity;
    use minidom::Element;

    fn stream_error(condition: Option<&str>, text: Option<&str>) -> Element {
        let mut builder = Element::builder("error", STREAM_NS);
        if let Some(condition) = condition {
            builder = builder.append(Element::bare(condition, STREAM_ERROR_NS));
        }
        if let Some(text) = text {
            builder = builder.append(
                Element::builder("text", STREAM_ERROR_NS)
                    .append(crate::stanza::text_node(text.to_owned()))
                    .build(),
            );
        }
        builder.build()
    }

    #[test]
    fn classifies_fatal_condition() {
        let el = stream_error(Some("not-authorized"), None);
        let (criticity, reason, details) = classify_stream_error(&el);
        assert_eq!(criticity, Criticity::Fatal);
        assert_eq!(reason, "not-authorized");
        assert_eq!(details, None);
    }

    #[test]
    fn classifies_transient_condition() {
        let el = stream_error(Some("internal-server-error"), None);
        let (criticity, reason, _) = classify_stream_error(&el);
        assert_eq!(criticity, Criticity::Transient);
        assert_eq!(reason, "internal-server-error");
    }

    #[test]
    fn classifies_informational_condition() {
        let el = stream_error(Some("see-other-host"), None);
        let (criticity, reason, _) = classify_stream_error(&el);
        assert_eq!(criticity, Criticity::Informational);
        assert_eq!(reason, "see-other-host");
    }

    #[test]
    fn unrecognised_condition_defaults_to_transient() {
        let el = stream_error(Some("some-future-condition"), None);
        let (criticity, reason, _) = classify_stream_error(&el);
        assert_eq!(criticity, Criticity::Transient);
        assert_eq!(reason, "some-future-condition");
    }

    #[test]
    fn missing_condition_defaults_to_fatal() {
        let el = stream_error(None, None);
        let (criticity, reason, _) = classify_stream_error(&el);
        assert_eq!(criticity, Criticity::Fatal);
        assert_eq!(reason, "unrecognised-stream-error");
    }

    #[test]
    fn extracts_text_details() {
        let el = stream_error(Some("conflict"), Some("replaced by new session"));
        let (_, _, details) = classify_stream_error(&el);
        assert_eq!(details.as_deref(), Some("replaced by new session"));
    }

    #[test]
    fn empty_text_yields_no_details() {
        let el = stream_error(Some("conflict"), Some(""));
        let (_, _, details) = classify_stream_error(&el);
        assert_eq!(details, None);
    }
}
