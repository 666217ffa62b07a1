// Copyright (c) 2019 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! XEP-0198 Stream Management: the `<enable/>`/`<enabled/>`,
//! `<resume/>`/`<resumed/>`/`<failed/>` and `<r/>`/`<a/>` nonzas, and the
//! counter bookkeeping ([`SmState`]) needed to replay unacked stanzas
//! across a resumed stream.

use core::fmt;
use std::collections::{vec_deque, VecDeque};

use minidom::Element;

use crate::error::ProtocolError;
use crate::xmlstream::SM_NS;

use super::queue::{QueueEntry, StanzaState};

/// `<enable/>`, sent to request stream management.
pub(super) struct Enable {
    pub resume: bool,
}

impl From<Enable> for Element {
    fn from(e: Enable) -> Element {
        Element::builder("enable", SM_NS)
            .attr("resume", if e.resume { Some("true") } else { None })
            .build()
    }
}

/// `<resume/>`, sent to request resumption of a previous session.
pub(super) struct Resume {
    pub h: u32,
    pub previd: String,
}

impl From<Resume> for Element {
    fn from(r: Resume) -> Element {
        Element::builder("resume", SM_NS)
            .attr("h", r.h.to_string())
            .attr("previd", r.previd)
            .build()
    }
}

/// `<enabled/>`, the peer's response to `<enable/>`.
pub(super) struct Enabled {
    pub id: Option<String>,
    pub resume: bool,
    pub location: Option<String>,
}

impl TryFrom<&Element> for Enabled {
    type Error = ProtocolError;

    fn try_from(el: &Element) -> Result<Self, Self::Error> {
        Ok(Self {
            id: el.attr("id").map(str::to_owned),
            resume: el.attr("resume") == Some("true"),
            location: el.attr("location").map(str::to_owned),
        })
    }
}

/// `<resumed/>`, the peer's confirmation that a session was resumed.
pub(super) struct Resumed {
    pub h: u32,
}

impl TryFrom<&Element> for Resumed {
    type Error = ProtocolError;

    fn try_from(el: &Element) -> Result<Self, Self::Error> {
        let h = el
            .attr("h")
            .ok_or_else(|| ProtocolError::InvalidStanza("<resumed/> missing h=".into()))?
            .parse()
            .map_err(|_| ProtocolError::InvalidStanza("<resumed/> has non-numeric h=".into()))?;
        Ok(Self { h })
    }
}

/// `<failed/>`, sent when resumption or enabling failed.
pub(super) struct Failed {
    pub h: Option<u32>,
}

impl TryFrom<&Element> for Failed {
    type Error = ProtocolError;

    fn try_from(el: &Element) -> Result<Self, Self::Error> {
        Ok(Self {
            h: el.attr("h").and_then(|v| v.parse().ok()),
        })
    }
}

/// Build a `<r/>` stanza acknowledgement request.
pub(super) fn request_ack() -> Element {
    Element::bare("r", SM_NS)
}

/// Build an `<a h='...'/>` acknowledgement.
pub(super) fn ack(h: u32) -> Element {
    Element::builder("a", SM_NS).attr("h", h.to_string()).build()
}

#[derive(Debug)]
pub(super) enum SmResumeInfo {
    NotResumable,
    Resumable {
        /// XEP-0198 stream ID.
        id: String,
        /// Preferred IP and port for resumption as indicated by the peer.
        #[allow(dead_code)]
        location: Option<String>,
    },
}

/// State for stream management.
pub(super) struct SmState {
    /// Last value seen from the remote stanza counter.
    outbound_base: u32,
    /// Counter for received stanzas.
    inbound_ctr: u32,
    /// Information about resumability of the stream.
    resumption: SmResumeInfo,
    /// Unacked stanzas in the order they were sent.
    unacked_stanzas: VecDeque<QueueEntry>,
}

impl fmt::Debug for SmState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SmState")
            .field("outbound_base", &self.outbound_base)
            .field("inbound_ctr", &self.inbound_ctr)
            .field("resumption", &self.resumption)
            .field("len(unacked_stanzas)", &self.unacked_stanzas.len())
            .finish()
    }
}

#[derive(Debug)]
pub(super) enum SmError {
    RemoteAckedMoreStanzas {
        local_base: u32,
        queue_len: u32,
        remote_ctr: u32,
    },
    RemoteAckWentBackwards {
        local_base: u32,
        remote_ctr: u32,
    },
}

impl From<SmError> for ProtocolError {
    fn from(e: SmError) -> Self {
        ProtocolError::StreamError(e.to_string())
    }
}

impl fmt::Display for SmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::RemoteAckedMoreStanzas {
                local_base,
                queue_len,
                remote_ctr,
            } => {
                let local_tip = local_base.wrapping_add(*queue_len);
                write!(f, "remote acked more stanzas than we sent: remote counter = {remote_ctr}. queue covers range {local_base}..<{local_tip}")
            }
            Self::RemoteAckWentBackwards {
                local_base,
                remote_ctr,
            } => {
                write!(f, "remote acked less stanzas than before: remote counter = {remote_ctr}, local queue starts at {local_base}")
            }
        }
    }
}

impl SmState {
    pub fn fresh() -> Self {
        Self {
            outbound_base: 0,
            inbound_ctr: 0,
            resumption: SmResumeInfo::NotResumable,
            unacked_stanzas: VecDeque::new(),
        }
    }

    /// Mark a stanza as sent and keep it in the stream management queue.
    pub fn enqueue(&mut self, entry: QueueEntry) {
        // The SM counters are mod 2^32 (RFC 1982 "Serial Number
        // Arithmetic"): the wrapped difference between two counters is
        // ambiguous once it exceeds half the number space, so the queue is
        // bounded well below that to keep resumption unambiguous.
        const MAX_QUEUE_SIZE: usize = (u32::MAX / 2 - 1) as usize;
        if self.unacked_stanzas.len() >= MAX_QUEUE_SIZE {
            panic!("Too many pending stanzas.");
        }
        self.unacked_stanzas.push_back(entry);
    }

    /// Process resumption: apply the remote ack, then return the stanzas
    /// that must be retransmitted.
    pub fn resume(&mut self, h: u32) -> Result<vec_deque::Drain<'_, QueueEntry>, SmError> {
        self.remote_acked(h)?;
        Ok(self.unacked_stanzas.drain(..))
    }

    /// Process a remote `<a/>`.
    pub fn remote_acked(&mut self, h: u32) -> Result<(), SmError> {
        let to_drop = h.wrapping_sub(self.outbound_base) as usize;
        if to_drop == 0 {
            return Ok(());
        }
        if to_drop > self.unacked_stanzas.len() {
            if to_drop as u32 > u32::MAX / 2 {
                return Err(SmError::RemoteAckWentBackwards {
                    local_base: self.outbound_base,
                    remote_ctr: h,
                });
            }
            return Err(SmError::RemoteAckedMoreStanzas {
                local_base: self.outbound_base,
                queue_len: self.unacked_stanzas.len() as u32,
                remote_ctr: h,
            });
        }
        for entry in self.unacked_stanzas.drain(..to_drop) {
            entry.token.send_replace(StanzaState::Acked {});
        }
        self.outbound_base = h;
        Ok(())
    }

    /// Record that a stanza was received, for the inbound counter.
    pub fn note_inbound(&mut self) {
        self.inbound_ctr = self.inbound_ctr.wrapping_add(1);
    }

    /// Get the current inbound counter.
    pub fn inbound_ctr(&self) -> u32 {
        self.inbound_ctr
    }

    /// Get the info necessary for resumption: the stream ID and the
    /// current inbound counter, if resumption is available.
    pub fn resume_info(&self) -> Option<(&str, u32)> {
        match self.resumption {
            SmResumeInfo::Resumable { ref id, .. } => Some((id, self.inbound_ctr)),
            SmResumeInfo::NotResumable => None,
        }
    }

    /// Fail every currently unacked stanza with the given error.
    pub fn fail_all(&mut self, error: &super::queue::OpaqueIoError) {
        for entry in self.unacked_stanzas.drain(..) {
            entry.token.send_replace(StanzaState::Failed {
                error: error.clone(),
            });
        }
    }
}

impl From<Enabled> for SmState {
    fn from(other: Enabled) -> Self {
        let resumption = if other.resume {
            match other.id {
                Some(id) => SmResumeInfo::Resumable {
                    location: other.location,
                    id,
                },
                None => {
                    log::warn!("peer replied with <enabled resume='true'/>, but without an ID! cannot make this stream resumable.");
                    SmResumeInfo::NotResumable
                }
            }
        } else {
            SmResumeInfo::NotResumable
        };

        Self {
            outbound_base: 0,
            inbound_ctr: 0,
            resumption,
            unacked_stanzas: VecDeque::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_entry() -> QueueEntry {
        QueueEntry::untracked(Box::new(crate::Stanza::Message(
            crate::stanza::Message::chat("user@example.com".parse().unwrap(), "hi".into()),
        )))
    }

    #[test]
    fn remote_ack_drains_acked_stanzas() {
        let mut sm = SmState::fresh();
        sm.enqueue(dummy_entry());
        sm.enqueue(dummy_entry());
        sm.remote_acked(1).unwrap();
        assert_eq!(sm.unacked_stanzas.len(), 1);
    }

    #[test]
    fn remote_ack_going_backwards_is_rejected() {
        let mut sm = SmState::fresh();
        sm.enqueue(dummy_entry());
        sm.remote_acked(1).unwrap();
        sm.outbound_base = u32::MAX - 2;
        let err = sm.remote_acked(u32::MAX - 100);
        assert!(matches!(err, Err(SmError::RemoteAckWentBackwards { .. })));
    }

    #[test]
    fn inbound_counter_wraps() {
        let mut sm = SmState::fresh();
        for _ in 0..3 {
            sm.note_inbound();
        }
        assert_eq!(sm.inbound_ctr(), 3);
    }
}
