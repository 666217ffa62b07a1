// Copyright (c) 2019 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! # Resilient stanza stream
//!
//! This module provides the [`StanzaStream`], which is the next level up from
//! the low-level [`XmlStream`][`crate::xmlstream::XmlStream`].
//!
//! The stanza stream knows about XMPP and it most importantly knows how to
//! fix a broken connection with a reconnect and how to do this smoothly using
//! [XEP-0198 (Stream Management)](https://xmpp.org/extensions/xep-0198.html).
//! XEP-0198 is only used if the peer supports it. If the peer does not
//! support XEP-0198, automatic reconnects are still done, but with more
//! undetectable data loss.
//!
//! The main API entrypoint for the stanza stream is, unsurprisingly,
//! [`StanzaStream`].

use core::pin::Pin;
use core::task::{Context, Poll};
use core::time::Duration;

use futures::Stream;

use tokio::sync::{mpsc, oneshot};

use crate::connect::ServerConnector;
use crate::xmlstream::{StreamFeatures, Timeouts};
use crate::{Criticity, Stanza};

mod negotiation;
mod queue;
mod stream_management;
mod worker;

use self::queue::QueueEntry;
pub use self::queue::{StanzaStage, StanzaState, StanzaToken};
pub use self::worker::{Connection, XmppStream};
use self::worker::StanzaStreamWorker;

/// Event informing about the change of the [`StanzaStream`]'s status.
#[derive(Debug)]
pub enum StreamEvent {
    /// The stream was (re-)established **with** loss of state.
    Reset {
        /// The new JID to which the stream is bound.
        bound_jid: jid::Jid,

        /// The features reported by the stream.
        features: StreamFeatures,
    },

    /// The stream is currently inactive because a connection was lost.
    ///
    /// Resumption without loss of state is still possible. This event is
    /// merely informative and may be used to prolong timeouts or inform the
    /// user that the connection is currently unstable.
    Suspended,

    /// The stream was reestablished **without** loss of state.
    ///
    /// This is merely informative. Potentially useful to prolong timeouts.
    Resumed,

    /// XEP-0198 resumption (or, on a fresh bind, the initial enable
    /// request) was rejected by the peer.
    SmFailed {
        /// Severity of the rejection.
        criticity: Criticity,
        /// Human-readable reason.
        reason: String,
    },

    /// A peer-sent `<stream:error/>` was classified and the stream is
    /// being torn down because of it.
    ProtocolError {
        /// Severity, per [`super::worker::classify_stream_error`].
        criticity: Criticity,
        /// The defined-condition name (e.g. `"not-authorized"`), or a
        /// generic reason if the peer sent no recognisable condition.
        reason: String,
        /// The optional human-readable `<text/>` child, if present.
        details: Option<String>,
    },

    /// Post-bind setup (session establishment, disco probe, optional
    /// carbons enable, roster fetch) has finished for a fresh bind.
    FullyConnected,

    /// The stream reader hit an I/O or XML-parse failure that wasn't a
    /// peer-sent `<stream:error/>` (e.g. a TLS reset or malformed XML). The
    /// connection is being torn down and a reconnect will follow.
    ReadError {
        /// Human-readable description of the failure.
        reason: String,
    },
}

/// Event emitted by the [`StanzaStream`].
///
/// Note that stream closure is not an explicit event, but the end of the
/// event stream itself.
#[derive(Debug)]
pub enum Event {
    /// The streams connectivity status has changed.
    Stream(StreamEvent),

    /// A stanza was received over the stream.
    Stanza(Stanza),
}

/// Frontend interface to a reliable, always-online stanza stream.
pub struct StanzaStream {
    rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<QueueEntry>,
}

impl StanzaStream {
    /// Establish a new client-to-server stream using the given
    /// [`ServerConnector`].
    ///
    /// `jid` and `password` must be the user account's credentials. `jid` may
    /// either be a bare JID (to let the server choose a resource) or a full
    /// JID (to request a specific resource from the server, with no guarantee
    /// of succcess).
    ///
    /// `timeouts` controls the responsiveness to connection interruptions
    /// on the underlying transports. Please see the [`Timeouts`] struct's
    /// documentation for hints on how to correctly configure this.
    ///
    /// The `queue_depth` controls the sizes for the incoming and outgoing
    /// stanza queues. If the size is exceeded, the corresponding direction
    /// will block until the queues can be flushed. Note that the respective
    /// reverse direction is not affected (i.e. if your outgoing queue is
    /// full for example because of a slow server, you can still receive
    /// data).
    pub fn new_c2s<C: ServerConnector>(
        server: C,
        jid: jid::Jid,
        password: String,
        timeouts: Timeouts,
        queue_depth: usize,
        enable_carbons: bool,
    ) -> Self {
        let reconnector = Box::new(move |slot: oneshot::Sender<Connection>| {
            let jid = jid.clone();
            let server = server.clone();
            let password = password.clone();
            tokio::spawn(async move {
                const MAX_DELAY: Duration = Duration::new(30, 0);
                let mut delay = Duration::new(1, 0);
                loop {
                    log::debug!("starting new connection as {jid}");
                    match crate::client::login::client_auth(
                        server.clone(),
                        jid.clone(),
                        password.clone(),
                        timeouts,
                    )
                    .await
                    {
                        Ok((stream, features)) => {
                            log::debug!("connection as {jid} authenticated");
                            let stream = stream.box_stream();
                            if slot
                                .send(Connection {
                                    stream,
                                    features,
                                    identity: jid,
                                })
                                .is_err()
                            {
                                log::debug!(
                                    "StanzaStream dropped before reconnect completed; discarding fresh stream"
                                );
                            }
                            return;
                        }
                        Err(e) => {
                            log::error!("failed to connect: {e}. retrying in {delay:?}");
                            tokio::time::sleep(delay).await;
                            delay = core::cmp::min(delay * 2, MAX_DELAY);
                        }
                    }
                }
            });
        });
        Self::new(reconnector, timeouts, queue_depth, enable_carbons)
    }

    /// Create a new stanza stream.
    ///
    /// Stanza streams operate using a `connector` which is responsible for
    /// producing a new, authenticated (but not yet resource-bound) stream
    /// whenever necessary. It is the connector's responsibility that:
    ///
    /// - It never fails to send to the channel it is given. If the connector
    ///   drops the channel, the `StanzaStream` will consider this fatal and
    ///   fail the stream.
    ///
    /// - All streams are authenticated and secured as necessary.
    ///
    /// - All streams are authenticated for the same entity. If the connector
    ///   were to provide streams for different identities, information leaks
    ///   could occur as queues from previous sessions are being flushed on
    ///   the new stream on a reconnect.
    ///
    /// Most notably, the `connector` is **not** responsible for performing
    /// resource binding: Resource binding is handled by the `StanzaStream`.
    ///
    /// `connector` will be called soon after `new()` was called to establish
    /// the first underlying stream for the `StanzaStream`.
    ///
    /// The `queue_depth` controls the sizes for the incoming and outgoing
    /// stanza queues. If the size is exceeded, the corresponding direction
    /// will block until the queues can be flushed. Note that the respective
    /// reverse direction is not affected (i.e. if your outgoing queue is
    /// full for example because of a slow server, you can still receive
    /// data).
    pub fn new(
        connector: Box<dyn FnMut(oneshot::Sender<Connection>) + Send + 'static>,
        timeouts: Timeouts,
        queue_depth: usize,
        enable_carbons: bool,
    ) -> Self {
        let (f2c_tx, c2f_rx) =
            StanzaStreamWorker::spawn(connector, timeouts, queue_depth, enable_carbons);
        Self {
            tx: f2c_tx,
            rx: c2f_rx,
        }
    }

    async fn assert_send(&self, cmd: QueueEntry) {
        match self.tx.send(cmd).await {
            Ok(()) => (),
            Err(_) => panic!("Stream closed or the stream's background workers have crashed."),
        }
    }

    /// Close the stream.
    ///
    /// This will initiate a clean shutdown of the stream and will prevent and
    /// cancel any more reconnection attempts.
    pub async fn close(mut self) {
        drop(self.tx); // closes stream.
        while let Some(ev) = self.rx.recv().await {
            log::trace!("discarding event {:?} after stream closure", ev);
        }
    }

    /// Send a stanza via the stream.
    ///
    /// Note that completion of this function merely signals that the stanza
    /// has been enqueued successfully: it may be stuck in the transmission
    /// queue for quite a while if the stream is currently disconnected. The
    /// transmission progress can be observed via the returned
    /// [`StanzaToken`].
    ///
    /// # Panics
    ///
    /// If the stream has failed catastrophically (i.e. due to a software
    /// bug), this function may panic.
    pub async fn send(&self, stanza: Box<Stanza>) -> StanzaToken {
        let (queue_entry, token) = QueueEntry::tracked(stanza);
        self.assert_send(queue_entry).await;
        token
    }

    /// Fire-and-forget enqueue of `stanza`, without awaiting queue space.
    ///
    /// Used to send automatic replies (extension responses,
    /// `feature-not-implemented` errors) from contexts that cannot
    /// `.await`, such as [`futures::Stream::poll_next`]. Returns the
    /// stanza back on failure (queue full or the worker gone) so the
    /// caller can decide whether to log or drop it.
    pub(crate) fn try_send_untracked(&self, stanza: Stanza) -> Result<(), Stanza> {
        match self.tx.try_send(QueueEntry::untracked(Box::new(stanza))) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(entry)) => Err(*entry.stanza),
            Err(mpsc::error::TrySendError::Closed(entry)) => Err(*entry.stanza),
        }
    }
}

impl Stream for StanzaStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
