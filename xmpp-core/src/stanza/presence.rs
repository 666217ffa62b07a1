//! The `<presence/>` stanza (RFC 6120 §8.2.2).

use minidom::Element;

use crate::error::ProtocolError;
use crate::stanza::ns;

/// The `type='...'` attribute of a `<presence/>`. Absent means "available".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceType {
    /// No `type=` attribute: the entity is online.
    Available,
    /// Request subscription to presence.
    Subscribe,
    /// Grant a subscription request.
    Subscribed,
    /// Cancel a subscription request/grant.
    Unsubscribe,
    /// Withdraw an existing subscription.
    Unsubscribed,
    /// Signal becoming unavailable.
    Unavailable,
    /// Request current presence of all contacts/MUC occupants.
    Probe,
    /// Error reply to an earlier presence stanza.
    Error,
}

impl PresenceType {
    fn as_str(self) -> Option<&'static str> {
        match self {
            PresenceType::Available => None,
            PresenceType::Subscribe => Some("subscribe"),
            PresenceType::Subscribed => Some("subscribed"),
            PresenceType::Unsubscribe => Some("unsubscribe"),
            PresenceType::Unsubscribed => Some("unsubscribed"),
            PresenceType::Unavailable => Some("unavailable"),
            PresenceType::Probe => Some("probe"),
            PresenceType::Error => Some("error"),
        }
    }

    fn from_str(s: Option<&str>) -> Self {
        match s {
            None => PresenceType::Available,
            Some("subscribe") => PresenceType::Subscribe,
            Some("subscribed") => PresenceType::Subscribed,
            Some("unsubscribe") => PresenceType::Unsubscribe,
            Some("unsubscribed") => PresenceType::Unsubscribed,
            Some("unavailable") => PresenceType::Unavailable,
            Some("probe") => PresenceType::Probe,
            Some("error") => PresenceType::Error,
            Some(_) => PresenceType::Available,
        }
    }
}

/// A `<presence/>` stanza.
#[derive(Debug, Clone)]
pub struct Presence {
    /// The sender, if present.
    pub from: Option<jid::Jid>,
    /// The intended recipient, if directed (absent means broadcast).
    pub to: Option<jid::Jid>,
    /// The stanza ID.
    pub id: Option<String>,
    /// The presence type.
    pub type_: PresenceType,
    /// The full element, including `<show/>`/`<status/>`/`<priority/>` and
    /// any extension payloads (e.g. MUC `<x/>`).
    pub payload: Element,
}

impl From<Presence> for Element {
    fn from(presence: Presence) -> Element {
        let mut el = presence.payload;
        el.set_attr("type", presence.type_.as_str().map(str::to_owned));
        if let Some(from) = presence.from {
            el.set_attr("from", Some(from.to_string()));
        }
        if let Some(to) = presence.to {
            el.set_attr("to", Some(to.to_string()));
        }
        if let Some(id) = presence.id {
            el.set_attr("id", Some(id));
        }
        el
    }
}

impl TryFrom<Element> for Presence {
    type Error = ProtocolError;

    fn try_from(el: Element) -> Result<Self, Self::Error> {
        if !el.is("presence", ns::JABBER_CLIENT) {
            return Err(ProtocolError::InvalidStanza(format!(
                "expected <presence/> in {}, got <{}/> in {}",
                ns::JABBER_CLIENT,
                el.name(),
                el.ns()
            )));
        }
        let from = el.attr("from").map(|s| s.parse()).transpose().map_err(|e| {
            ProtocolError::InvalidStanza(format!("invalid from= on <presence/>: {e}"))
        })?;
        let to = el.attr("to").map(|s| s.parse()).transpose().map_err(|e| {
            ProtocolError::InvalidStanza(format!("invalid to= on <presence/>: {e}"))
        })?;
        let id = el.attr("id").map(str::to_owned);
        let type_ = PresenceType::from_str(el.attr("type"));
        Ok(Presence {
            from,
            to,
            id,
            type_,
            payload: el,
        })
    }
}

impl Presence {
    /// Build a plain "available" broadcast presence.
    pub fn available() -> Self {
        Presence {
            from: None,
            to: None,
            id: None,
            type_: PresenceType::Available,
            payload: Element::bare("presence", ns::JABBER_CLIENT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_available_presence() {
        let p = Presence::available();
        let el: Element = p.into();
        let back = Presence::try_from(el).unwrap();
        assert_eq!(back.type_, PresenceType::Available);
    }
}
