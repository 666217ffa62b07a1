// Copyright (c) 2019 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Post-authentication stream negotiation: resource binding and, if the
//! peer offers it, XEP-0198 stream management enable/resume.

use minidom::Element;

use crate::connect::AsyncReadAndWrite;
use crate::error::{Error, ProtocolError};
use crate::stanza::{ns, Iq, IqType};
use crate::xmlstream::{StreamFeatures, XmlStream, BIND_NS};
use crate::Criticity;

use super::queue::QueueEntry;
use super::stream_management::{self, Enabled, Failed, Resumed, SmState};

static BIND_REQ_ID: &str = "_xmpp-bind1";
static SESSION_REQ_ID: &str = "_xmpp-session1";
static DISCO_REQ_ID: &str = "_xmpp-disco1";
static CARBONS_REQ_ID: &str = "_xmpp-carbons1";
static ROSTER_REQ_ID: &str = "_xmpp-roster1";

/// The outcome of a successful negotiation.
pub(super) struct Negotiated {
    /// The bound JID, if this negotiation performed fresh resource
    /// binding. `None` on a successful resume, since the JID bound by the
    /// original session is still in effect and the caller already knows
    /// it.
    pub bound_jid: Option<jid::Jid>,
    pub sm_state: Option<SmState>,
    pub resumed: bool,
    /// Stanzas the peer never acked on the previous stream; only
    /// populated on a successful resume, and must be retransmitted.
    pub retransmit: Vec<QueueEntry>,
    /// Set if resumption or enabling of XEP-0198 was rejected by the peer.
    pub sm_failed: Option<(Criticity, String)>,
}

fn bind_request(resource: Option<&str>) -> Element {
    let mut bind = Element::builder("bind", BIND_NS);
    if let Some(resource) = resource {
        bind = bind.append(
            Element::builder("resource", BIND_NS)
                .append(crate::stanza::text_node(resource.to_owned()))
                .build(),
        );
    }
    Element::builder("iq", ns::JABBER_CLIENT)
        .attr("id", BIND_REQ_ID)
        .attr("type", "set")
        .append(bind.build())
        .build()
}

fn parse_bind_response(el: &Element) -> Result<jid::Jid, ProtocolError> {
    let jid_el = el
        .get_child("jid", BIND_NS)
        .ok_or(ProtocolError::InvalidBindResponse)?;
    jid_el
        .text()
        .parse()
        .map_err(|_| ProtocolError::InvalidBindResponse)
}

/// Run resource binding and, if applicable, stream management
/// enable/resume, over a freshly authenticated stream.
///
/// `requested_resource` is the resource part of the JID the caller
/// connected with, if any (servers are free to ignore it).
pub(super) async fn negotiate<S: AsyncReadAndWrite>(
    stream: &mut XmlStream<S>,
    requested_resource: Option<&str>,
    features: &StreamFeatures,
    resumable: Option<SmState>,
    enable_carbons: bool,
) -> Result<Negotiated, Error> {
    if let (Some(sm_state), true) = (&resumable, features.can_sm) {
        if let Some((id, h)) = sm_state.resume_info() {
            let previd = id.to_owned();
            stream
                .send_element(&stream_management::Resume { h, previd }.into())
                .await?;
            loop {
                let el = stream.read_element().await?.ok_or(Error::Disconnected)?;
                if el.is("resumed", crate::xmlstream::SM_NS) {
                    let Resumed { h } = Resumed::try_from(&el)?;
                    let mut sm_state = resumable.unwrap();
                    let retransmit: Vec<QueueEntry> =
                        sm_state.resume(h).map_err(ProtocolError::from)?.collect();
                    return Ok(Negotiated {
                        bound_jid: None,
                        sm_state: Some(sm_state),
                        resumed: true,
                        retransmit,
                        sm_failed: None,
                    });
                } else if el.is("failed", crate::xmlstream::SM_NS) {
                    log::debug!("stream resumption rejected by peer, rebinding fresh session");
                    break;
                }
            }
        }
    }

    if !features.can_bind {
        return Err(ProtocolError::InvalidStanza(
            "peer does not offer resource binding".into(),
        )
        .into());
    }

    // A previous resumption attempt (if any) having fallen through to here
    // means it was rejected; surface that to the caller alongside whatever
    // this fresh bind produces.
    let mut sm_failed = resumable.as_ref().map(|_| {
        (
            Criticity::Transient,
            "stream resumption rejected by peer, rebinding fresh session".to_owned(),
        )
    });

    stream.send_element(&bind_request(requested_resource)).await?;
    let bound_jid = loop {
        let el = stream.read_element().await?.ok_or(Error::Disconnected)?;
        if !el.is("iq", ns::JABBER_CLIENT) {
            continue;
        }
        let iq = Iq::try_from(el)?;
        if iq.id != BIND_REQ_ID {
            continue;
        }
        match iq.payload {
            IqType::Result(Some(payload)) => break parse_bind_response(&payload)?,
            _ => return Err(ProtocolError::InvalidBindResponse.into()),
        }
    };

    if features.can_session {
        negotiate_legacy_session(stream).await?;
    }

    let sm_state = if features.can_sm {
        stream
            .send_element(&stream_management::Enable { resume: true }.into())
            .await?;
        loop {
            let el = stream.read_element().await?.ok_or(Error::Disconnected)?;
            if el.is("enabled", crate::xmlstream::SM_NS) {
                break Some(SmState::from(Enabled::try_from(&el)?));
            } else if el.is("failed", crate::xmlstream::SM_NS) {
                let Failed { .. } = Failed::try_from(&el)?;
                log::debug!("peer declined to enable stream management");
                sm_failed = Some((
                    Criticity::Informational,
                    "peer declined to enable stream management".to_owned(),
                ));
                break None;
            }
        }
    } else {
        None
    };

    after_bound(stream, &bound_jid, enable_carbons).await?;

    Ok(Negotiated {
        bound_jid: Some(bound_jid),
        sm_state,
        resumed: false,
        retransmit: Vec::new(),
        sm_failed,
    })
}

/// RFC 3921 §3 legacy session establishment, required only by servers that
/// still advertise it (RFC 6121 made it obsolete).
async fn negotiate_legacy_session<S: AsyncReadAndWrite>(
    stream: &mut XmlStream<S>,
) -> Result<(), Error> {
    let session = Element::builder("session", ns::SESSION).build();
    let request = Element::builder("iq", ns::JABBER_CLIENT)
        .attr("id", SESSION_REQ_ID)
        .attr("type", "set")
        .append(session)
        .build();
    stream.send_element(&request).await?;
    loop {
        let el = stream.read_element().await?.ok_or(Error::Disconnected)?;
        if !el.is("iq", ns::JABBER_CLIENT) {
            continue;
        }
        let iq = Iq::try_from(el)?;
        if iq.id != SESSION_REQ_ID {
            continue;
        }
        match iq.payload {
            IqType::Result(_) => return Ok(()),
            IqType::Error(e) => {
                log::warn!("legacy session establishment rejected: {e:?}; continuing anyway");
                return Ok(());
            }
            _ => continue,
        }
    }
}

/// Runs once per fresh resource bind: a discovery probe of the server, an
/// optional XEP-0280 carbons enable, and a roster fetch. Failures here are
/// logged, not propagated: a server that declines one of these features is
/// not a reason to drop the connection.
async fn after_bound<S: AsyncReadAndWrite>(
    stream: &mut XmlStream<S>,
    bound_jid: &jid::Jid,
    enable_carbons: bool,
) -> Result<(), Error> {
    let server = jid::Jid::from_parts(None, bound_jid.domain(), None)?;

    send_iq_set_or_get(
        stream,
        DISCO_REQ_ID,
        Some(server.clone()),
        "get",
        Element::builder("query", ns::DISCO_INFO).build(),
    )
    .await?;

    if enable_carbons {
        send_iq_set_or_get(
            stream,
            CARBONS_REQ_ID,
            None,
            "set",
            Element::builder("enable", ns::CARBONS).build(),
        )
        .await?;
    }

    send_iq_set_or_get(
        stream,
        ROSTER_REQ_ID,
        None,
        "get",
        Element::builder("query", ns::ROSTER).build(),
    )
    .await?;

    Ok(())
}

/// Send one IQ as part of [`after_bound`] and wait for the matching
/// response, logging but swallowing whatever it says.
async fn send_iq_set_or_get<S: AsyncReadAndWrite>(
    stream: &mut XmlStream<S>,
    id: &str,
    to: Option<jid::Jid>,
    type_: &str,
    payload: Element,
) -> Result<(), Error> {
    let mut builder = Element::builder("iq", ns::JABBER_CLIENT)
        .attr("id", id)
        .attr("type", type_);
    if let Some(to) = &to {
        builder = builder.attr("to", to.to_string());
    }
    stream.send_element(&builder.append(payload).build()).await?;
    loop {
        let el = stream.read_element().await?.ok_or(Error::Disconnected)?;
        if !el.is("iq", ns::JABBER_CLIENT) {
            continue;
        }
        let iq = Iq::try_from(el)?;
        if iq.id != id {
            continue;
        }
        match iq.payload {
            IqType::Result(_) => return Ok(()),
            IqType::Error(e) => {
                log::debug!("post-bind request {id} declined by peer: {e:?}");
                return Ok(());
            }
            _ => continue,
        }
    }
}
