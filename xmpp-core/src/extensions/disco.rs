//! XEP-0030: Service Discovery (the `disco#info` query only).

use minidom::Element;

use crate::client::IqResponse;
use crate::extensions::Extension;
use crate::stanza::{Iq, IqType};

/// A single `<identity/>` element, as category/type/name.
#[derive(Debug, Clone)]
pub struct Identity {
    /// E.g. `"client"`.
    pub category: String,
    /// E.g. `"bot"`.
    pub type_: String,
    /// Human-readable display name.
    pub name: String,
}

/// The identities and feature namespaces this entity advertises in reply to
/// a `disco#info` query.
#[derive(Debug, Clone, Default)]
pub struct Info {
    /// Advertised identities. RFC requires at least one for a well-formed
    /// reply; an empty list here will still build a (spec-violating, but
    /// harmless) reply rather than panic.
    pub identities: Vec<Identity>,
    /// Advertised feature namespaces, e.g. `crate::stanza::ns::PING`.
    pub features: Vec<String>,
}

impl Info {
    fn to_query(&self) -> Element {
        let mut builder = Element::builder("query", crate::stanza::ns::DISCO_INFO);
        for identity in &self.identities {
            builder = builder.append(
                Element::builder("identity", crate::stanza::ns::DISCO_INFO)
                    .attr("category", identity.category.as_str())
                    .attr("type", identity.type_.as_str())
                    .attr("name", identity.name.as_str())
                    .build(),
            );
        }
        for feature in &self.features {
            builder = builder.append(
                Element::builder("feature", crate::stanza::ns::DISCO_INFO)
                    .attr("var", feature.as_str())
                    .build(),
            );
        }
        builder.build()
    }
}

/// Answer an incoming `<query xmlns='http://jabber.org/protocol/disco#info'/>`
/// IQ request with `info`, if `iq` is one.
pub fn respond(iq: &Iq, info: &Info) -> Option<IqResponse> {
    let IqType::Get(payload) = &iq.payload else {
        return None;
    };
    if !payload.is("query", crate::stanza::ns::DISCO_INFO) {
        return None;
    }
    Some(IqResponse::Result(Some(info.to_query())))
}

/// [`Extension`] that answers XEP-0030 `disco#info` queries with a fixed
/// set of identities/features.
///
/// Registered by default on every [`crate::Client`] with an empty [`Info`];
/// use [`crate::Client::get_extension_mut`] to reach in and populate it.
#[derive(Debug, Clone, Default)]
pub struct DiscoResponder {
    /// The identities/features advertised in replies.
    pub info: Info,
}

impl DiscoResponder {
    /// Build a responder advertising `info`.
    pub fn new(info: Info) -> Self {
        Self { info }
    }
}

impl Extension for DiscoResponder {
    fn name(&self) -> &str {
        "disco"
    }

    fn namespace(&self) -> &str {
        crate::stanza::ns::DISCO_INFO
    }

    fn handle_iq(&mut self, iq: &Iq) -> Option<IqResponse> {
        respond(iq, &self.info)
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

    fn sample_info() -> Info {
        Info {
            identities: vec![Identity {
                category: "client".into(),
                type_: "bot".into(),
                name: "example".into(),
            }],
            features: vec![crate::stanza::ns::PING.to_owned()],
        }
    }

    #[test]
    fn answers_disco_info() {
        let iq = Iq::get(
            "disco1".into(),
            "example.com".parse::<jid::Jid>().unwrap(),
            Element::bare("query", crate::stanza::ns::DISCO_INFO),
        );
        let info = sample_info();
        let response = respond(&iq, &info).expect("disco#info should be answered");
        let IqResponse::Result(Some(query)) = response else {
            panic!("expected a populated result");
        };
        assert!(query.is("query", crate::stanza::ns::DISCO_INFO));
        assert_eq!(query.children().count(), 2);
    }

    #[test]
    fn ignores_unrelated_get() {
        let iq = Iq::get(
            "q1".into(),
            "example.com".parse::<jid::Jid>().unwrap(),
            Element::bare("ping", crate::stanza::ns::PING),
        );
        assert!(respond(&iq, &sample_info()).is_none());
    }

    #[test]
    fn extension_impl_delegates_to_respond() {
        let mut ext = DiscoResponder::new(sample_info());
        assert_eq!(ext.name(), "disco");
        assert_eq!(ext.namespace(), crate::stanza::ns::DISCO_INFO);
        let iq = Iq::get(
            "disco1".into(),
            "example.com".parse::<jid::Jid>().unwrap(),
            Element::bare("query", crate::stanza::ns::DISCO_INFO),
        );
        assert!(ext.handle_iq(&iq).is_some());
    }
}
