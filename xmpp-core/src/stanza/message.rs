//! The `<message/>` stanza (RFC 6120 §8.2.1).

use minidom::Element;

use crate::error::ProtocolError;
use crate::stanza::ns;

/// The `type='...'` attribute of a `<message/>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// One-to-one chat message (the default when no type is given).
    Chat,
    /// Multi-user chat message.
    Groupchat,
    /// Alert, usually shown to the user regardless of UI state.
    Headline,
    /// Single, standalone message (the RFC default if the attribute is
    /// entirely absent; we still parse/emit it explicitly).
    Normal,
    /// Error reply to an earlier message.
    Error,
}

impl MessageType {
    fn as_str(self) -> &'static str {
        match self {
            MessageType::Chat => "chat",
            MessageType::Groupchat => "groupchat",
            MessageType::Headline => "headline",
            MessageType::Normal => "normal",
            MessageType::Error => "error",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "chat" => MessageType::Chat,
            "groupchat" => MessageType::Groupchat,
            "headline" => MessageType::Headline,
            "error" => MessageType::Error,
            _ => MessageType::Normal,
        }
    }
}

/// A `<message/>` stanza.
#[derive(Debug, Clone)]
pub struct Message {
    /// The sender, if present.
    pub from: Option<jid::Jid>,
    /// The intended recipient.
    pub to: Option<jid::Jid>,
    /// The stanza ID.
    pub id: Option<String>,
    /// The message type.
    pub type_: MessageType,
    /// The `<body/>` text, if any.
    pub body: Option<String>,
    /// The full element, including any extension payloads not otherwise
    /// modeled (e.g. chat markers, carbons wrappers).
    pub payload: Element,
}

impl From<Message> for Element {
    fn from(msg: Message) -> Element {
        let mut el = msg.payload;
        el.set_attr("type", Some(msg.type_.as_str().to_owned()));
        if let Some(from) = msg.from {
            el.set_attr("from", Some(from.to_string()));
        }
        if let Some(to) = msg.to {
            el.set_attr("to", Some(to.to_string()));
        }
        if let Some(id) = msg.id {
            el.set_attr("id", Some(id));
        }
        el
    }
}

impl TryFrom<Element> for Message {
    type Error = ProtocolError;

    fn try_from(el: Element) -> Result<Self, Self::Error> {
        if !el.is("message", ns::JABBER_CLIENT) {
            return Err(ProtocolError::InvalidStanza(format!(
                "expected <message/> in {}, got <{}/> in {}",
                ns::JABBER_CLIENT,
                el.name(),
                el.ns()
            )));
        }
        let from = el.attr("from").map(|s| s.parse()).transpose().map_err(|e| {
            ProtocolError::InvalidStanza(format!("invalid from= on <message/>: {e}"))
        })?;
        let to = el.attr("to").map(|s| s.parse()).transpose().map_err(|e| {
            ProtocolError::InvalidStanza(format!("invalid to= on <message/>: {e}"))
        })?;
        let id = el.attr("id").map(str::to_owned);
        let type_ = el.attr("type").map(MessageType::from_str).unwrap_or(MessageType::Normal);
        let body = el.get_child("body", ns::JABBER_CLIENT).map(Element::text);
        Ok(Message {
            from,
            to,
            id,
            type_,
            body,
            payload: el,
        })
    }
}

impl Message {
    /// Build a simple chat message with a `<body/>`.
    pub fn chat<T: Into<jid::Jid>, S: Into<String>>(to: T, body: S) -> Self {
        let body = body.into();
        let payload = Element::builder("message", ns::JABBER_CLIENT)
            .append(
                Element::builder("body", ns::JABBER_CLIENT)
                    .append(crate::stanza::text_node(body.clone()))
                    .build(),
            )
            .build();
        Message {
            from: None,
            to: Some(to.into()),
            id: None,
            type_: MessageType::Chat,
            body: Some(body),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_chat_message() {
        let msg = Message::chat("user@example.com".parse::<jid::Jid>().unwrap(), "hi");
        let el: Element = msg.into();
        let back = Message::try_from(el).unwrap();
        assert_eq!(back.type_, MessageType::Chat);
        assert_eq!(back.body.as_deref(), Some("hi"));
    }
}
