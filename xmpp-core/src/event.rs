use rand::Rng;

use crate::stanza::{Iq, IqType, Message, Presence};
use crate::Error;

pub(crate) fn make_id() -> String {
    let id: u64 = rand::thread_rng().gen();
    format!("{id}")
}

/// A stanza sent/received over the stream.
#[derive(Debug, Clone)]
pub enum Stanza {
    /// `<iq/>` stanza.
    Iq(Iq),
    /// `<message/>` stanza.
    Message(Message),
    /// `<presence/>` stanza.
    Presence(Presence),
}

impl Stanza {
    /// Assign a random ID to the stanza, if no ID has been assigned yet.
    pub fn ensure_id(&mut self) -> &str {
        match self {
            Self::Iq(iq) => {
                if iq.id.is_empty() {
                    iq.id = make_id();
                }
                &iq.id
            }
            Self::Message(message) => message.id.get_or_insert_with(make_id),
            Self::Presence(presence) => presence.id.get_or_insert_with(make_id),
        }
    }

    /// True for `<iq type='get'/>` and `<iq type='set'/>`, i.e. stanzas that
    /// expect a reply.
    pub fn is_iq_request(&self) -> bool {
        matches!(
            self,
            Self::Iq(Iq {
                payload: IqType::Get(_) | IqType::Set(_),
                ..
            })
        )
    }
}

impl From<Iq> for Stanza {
    fn from(other: Iq) -> Self {
        Self::Iq(other)
    }
}

impl From<Presence> for Stanza {
    fn from(other: Presence) -> Self {
        Self::Presence(other)
    }
}

impl From<Message> for Stanza {
    fn from(other: Message) -> Self {
        Self::Message(other)
    }
}

impl TryFrom<Stanza> for Message {
    type Error = Stanza;

    fn try_from(other: Stanza) -> Result<Self, Self::Error> {
        match other {
            Stanza::Message(st) => Ok(st),
            other => Err(other),
        }
    }
}

impl TryFrom<Stanza> for Presence {
    type Error = Stanza;

    fn try_from(other: Stanza) -> Result<Self, Self::Error> {
        match other {
            Stanza::Presence(st) => Ok(st),
            other => Err(other),
        }
    }
}

impl TryFrom<Stanza> for Iq {
    type Error = Stanza;

    fn try_from(other: Stanza) -> Result<Self, Self::Error> {
        match other {
            Stanza::Iq(st) => Ok(st),
            other => Err(other),
        }
    }
}

impl From<Stanza> for minidom::Element {
    fn from(other: Stanza) -> Self {
        match other {
            Stanza::Iq(st) => st.into(),
            Stanza::Message(st) => st.into(),
            Stanza::Presence(st) => st.into(),
        }
    }
}

impl TryFrom<minidom::Element> for Stanza {
    type Error = crate::error::ProtocolError;

    fn try_from(el: minidom::Element) -> Result<Self, Self::Error> {
        match el.name() {
            "iq" => Ok(Stanza::Iq(Iq::try_from(el)?)),
            "message" => Ok(Stanza::Message(Message::try_from(el)?)),
            "presence" => Ok(Stanza::Presence(Presence::try_from(el)?)),
            other => Err(crate::error::ProtocolError::InvalidStanza(format!(
                "unknown top-level stanza <{other}/>"
            ))),
        }
    }
}

/// How severe a connection-status change is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticity {
    /// The condition is expected to resolve itself; the client is already
    /// retrying (or will).
    Transient,
    /// The condition will not resolve itself without outside intervention
    /// (bad credentials, policy violation, unsupported protocol version).
    /// The client will still retry, per its usual reconnect policy, but
    /// that retry is unlikely to succeed.
    Fatal,
    /// Not an error: a status change worth surfacing but with no bearing
    /// on whether the connection is healthy.
    Informational,
}

/// High-level event on the stream, as produced by [`crate::Client`].
#[derive(Debug)]
pub enum Event {
    /// A resource was freshly bound (fresh login, or a stream resumption
    /// window expired and a new session had to be established).
    Online {
        /// Server-set Jabber ID for your session.
        ///
        /// This may turn out to be a different JID resource than
        /// expected, so use this one instead of the JID with which
        /// the connection was set up.
        bound_jid: jid::Jid,
    },

    /// The underlying connection's health changed.
    ConnectionStatus {
        /// Whether a usable connection currently exists.
        connected: bool,
        /// How severe this status change is.
        criticity: Criticity,
        /// Short, stable machine-readable reason (e.g. a stream error
        /// condition name).
        reason: String,
        /// Optional human-readable elaboration, if the peer provided one.
        details: Option<String>,
    },

    /// XEP-0198 stream resumption succeeded: the session picked back up
    /// without loss of state, under the same [`Event::Online`] JID as
    /// before.
    StreamManagementResumed,

    /// XEP-0198 stream resumption (or, on a fresh bind, the initial
    /// enable request) was rejected by the peer.
    StreamManagementFailed {
        /// How severe this is: a rejected resume is usually
        /// [`Criticity::Transient`] (a fresh bind follows immediately),
        /// while a rejected enable is closer to
        /// [`Criticity::Informational`] (no previous session existed to
        /// lose).
        criticity: Criticity,
        /// Why stream management isn't active.
        reason: String,
    },

    /// Post-bind setup (session establishment, discovery probe, optional
    /// carbons enable, roster fetch) has finished. Emitted once per fresh
    /// [`Event::Online`]; not re-emitted on a bare resumption.
    FullyConnected,

    /// A reader-level failure (I/O, parsing) broke the stream, distinct
    /// from a peer-sent `<stream:error/>` (see [`Event::ConnectionStatus`]).
    Error(Error),

    /// Received stanza.
    Stanza(Stanza),
}

impl Event {
    /// `Online` event?
    pub fn is_online(&self) -> bool {
        matches!(self, Event::Online { .. })
    }

    /// Get the server-assigned JID for the `Online` event.
    pub fn get_jid(&self) -> Option<&jid::Jid> {
        match self {
            Event::Online { bound_jid, .. } => Some(bound_jid),
            _ => None,
        }
    }

    /// If this is a `Stanza` event, get its data.
    pub fn as_stanza(&self) -> Option<&Stanza> {
        match self {
            Event::Stanza(stanza) => Some(stanza),
            _ => None,
        }
    }

    /// If this is a `Stanza` event, unwrap into its data.
    pub fn into_stanza(self) -> Option<Stanza> {
        match self {
            Event::Stanza(stanza) => Some(stanza),
            _ => None,
        }
    }
}
