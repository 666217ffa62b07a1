//! XEP-0199: XMPP Ping.

use crate::client::IqResponse;
use crate::extensions::Extension;
use crate::stanza::{Iq, IqType};

/// Answer an incoming `<ping xmlns='urn:xmpp:ping'/>` IQ request, if `iq` is
/// one.
///
/// A successful ping reply is simply an empty `result`, so this never
/// fails: any correctly-formed ping yields `Some`.
pub fn respond(iq: &Iq) -> Option<IqResponse> {
    let IqType::Get(payload) = &iq.payload else {
        return None;
    };
    if !payload.is("ping", crate::stanza::ns::PING) {
        return None;
    }
    Some(IqResponse::Result(None))
}

/// [`Extension`] that answers XEP-0199 ping requests.
///
/// Registered by default on every [`crate::Client`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PingResponder;

impl PingResponder {
    /// Build a new ping responder. Stateless; any number can exist.
    pub fn new() -> Self {
        Self
    }
}

impl Extension for PingResponder {
    fn name(&self) -> &str {
        "ping"
    }

    fn namespace(&self) -> &str {
        crate::stanza::ns::PING
    }

    fn handle_iq(&mut self, iq: &Iq) -> Option<IqResponse> {
        respond(iq)
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minidom::Element;

    fn ping_request() -> Iq {
        Iq::get(
            "ping1".into(),
            "example.com".parse::<jid::Jid>().unwrap(),
            Element::bare("ping", crate::stanza::ns::PING),
        )
    }

    #[test]
    fn answers_ping() {
        let iq = ping_request();
        let response = respond(&iq).expect("ping should be answered");
        assert!(matches!(response, IqResponse::Result(None)));
    }

    #[test]
    fn ignores_unrelated_get() {
        let iq = Iq::get(
            "q1".into(),
            "example.com".parse::<jid::Jid>().unwrap(),
            Element::bare("query", "jabber:iq:version"),
        );
        assert!(respond(&iq).is_none());
    }

    #[test]
    fn extension_impl_delegates_to_respond() {
        let mut ext = PingResponder::new();
        assert_eq!(ext.name(), "ping");
        assert_eq!(ext.namespace(), crate::stanza::ns::PING);
        let response = ext.handle_iq(&ping_request());
        assert!(matches!(response, Some(IqResponse::Result(None))));
    }
}
