//! The `<iq/>` stanza (RFC 6120 §8.2.3).

use minidom::Element;

use crate::error::ProtocolError;
use crate::stanza::error::StanzaError;
use crate::stanza::ns;

/// The payload carried by an `<iq/>`, keyed by its `type='...'` attribute.
#[derive(Debug, Clone)]
pub enum IqType {
    /// `type='get'`, carrying exactly one child element: the query.
    Get(Element),
    /// `type='set'`, carrying exactly one child element: the request.
    Set(Element),
    /// `type='result'`, carrying at most one child element: the reply.
    Result(Option<Element>),
    /// `type='error'`.
    Error(StanzaError),
}

impl IqType {
    fn attr_value(&self) -> &'static str {
        match self {
            IqType::Get(_) => "get",
            IqType::Set(_) => "set",
            IqType::Result(_) => "result",
            IqType::Error(_) => "error",
        }
    }
}

/// An `<iq/>` stanza.
#[derive(Debug, Clone)]
pub struct Iq {
    /// The sender, if present (usually only on received stanzas).
    pub from: Option<jid::Jid>,
    /// The intended recipient.
    pub to: Option<jid::Jid>,
    /// The stanza ID, used to correlate a `result`/`error` with its `get`/`set`.
    pub id: String,
    /// The request/response payload.
    pub payload: IqType,
}

impl Iq {
    /// Build a `get` request addressed to `to`, with a freshly generated ID.
    pub fn get<T: Into<jid::Jid>>(id: String, to: T, query: Element) -> Self {
        Self {
            from: None,
            to: Some(to.into()),
            id,
            payload: IqType::Get(query),
        }
    }

    /// Build a `set` request addressed to `to`, with a freshly generated ID.
    pub fn set<T: Into<jid::Jid>>(id: String, to: T, query: Element) -> Self {
        Self {
            from: None,
            to: Some(to.into()),
            id,
            payload: IqType::Set(query),
        }
    }

    /// Build a `result` reply to a request received from `to`, matching its ID.
    pub fn result(id: String, to: Option<jid::Jid>, payload: Option<Element>) -> Self {
        Self {
            from: None,
            to,
            id,
            payload: IqType::Result(payload),
        }
    }

    /// Build an `error` reply to a request received from `to`, matching its ID.
    pub fn error(id: String, to: Option<jid::Jid>, error: StanzaError) -> Self {
        Self {
            from: None,
            to,
            id,
            payload: IqType::Error(error),
        }
    }

    /// True if this is a request (`get` or `set`) that expects a reply.
    pub fn is_request(&self) -> bool {
        matches!(self.payload, IqType::Get(_) | IqType::Set(_))
    }
}

impl From<Iq> for Element {
    fn from(iq: Iq) -> Element {
        let mut builder = Element::builder("iq", ns::JABBER_CLIENT).attr("id", iq.id);
        builder = builder.attr("type", iq.payload.attr_value());
        if let Some(from) = iq.from {
            builder = builder.attr("from", from.to_string());
        }
        if let Some(to) = iq.to {
            builder = builder.attr("to", to.to_string());
        }
        match iq.payload {
            IqType::Get(el) | IqType::Set(el) => builder.append(el).build(),
            IqType::Result(Some(el)) => builder.append(el).build(),
            IqType::Result(None) => builder.build(),
            IqType::Error(err) => builder.append(Element::from(err)).build(),
        }
    }
}

impl TryFrom<Element> for Iq {
    type Error = ProtocolError;

    fn try_from(el: Element) -> Result<Self, Self::Error> {
        if !el.is("iq", ns::JABBER_CLIENT) {
            return Err(ProtocolError::InvalidStanza(format!(
                "expected <iq/> in {}, got <{}/> in {}",
                ns::JABBER_CLIENT,
                el.name(),
                el.ns()
            )));
        }
        let id = el
            .attr("id")
            .ok_or_else(|| ProtocolError::InvalidStanza("<iq/> missing id".into()))?
            .to_owned();
        let from = el.attr("from").map(|s| s.parse()).transpose().map_err(|e| {
            ProtocolError::InvalidStanza(format!("invalid from= on <iq/>: {e}"))
        })?;
        let to = el.attr("to").map(|s| s.parse()).transpose().map_err(|e| {
            ProtocolError::InvalidStanza(format!("invalid to= on <iq/>: {e}"))
        })?;
        let type_ = el
            .attr("type")
            .ok_or_else(|| ProtocolError::InvalidStanza("<iq/> missing type".into()))?;
        let payload = match type_ {
            "get" => IqType::Get(
                el.children()
                    .next()
                    .cloned()
                    .ok_or_else(|| ProtocolError::InvalidStanza("<iq type='get'/> has no payload".into()))?,
            ),
            "set" => IqType::Set(
                el.children()
                    .next()
                    .cloned()
                    .ok_or_else(|| ProtocolError::InvalidStanza("<iq type='set'/> has no payload".into()))?,
            ),
            "result" => IqType::Result(el.children().next().cloned()),
            "error" => {
                let error_el = el
                    .get_child("error", ns::JABBER_CLIENT)
                    .ok_or_else(|| ProtocolError::InvalidStanza("<iq type='error'/> has no <error/>".into()))?;
                IqType::Error(StanzaError::try_from(error_el.clone())?)
            }
            other => {
                return Err(ProtocolError::InvalidStanza(format!(
                    "unknown iq type '{other}'"
                )))
            }
        };
        Ok(Iq {
            from,
            to,
            id,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_get_request() {
        let query = Element::bare("query", "jabber:iq:roster");
        let iq = Iq::get("1".to_owned(), "user@example.com".parse::<jid::Jid>().unwrap(), query);
        let el: Element = iq.into();
        let back = Iq::try_from(el).unwrap();
        assert_eq!(back.id, "1");
        assert!(matches!(back.payload, IqType::Get(_)));
    }

    #[test]
    fn rejects_missing_type() {
        let el = Element::builder("iq", ns::JABBER_CLIENT).attr("id", "1").build();
        assert!(Iq::try_from(el).is_err());
    }
}
