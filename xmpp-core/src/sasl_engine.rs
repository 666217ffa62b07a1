// Copyright (c) 2019 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Drives SASL mechanism negotiation (RFC 6120 §6) over an already
//! transport-secured [`XmlStream`].

use base64::engine::general_purpose::STANDARD as base64_engine;
use base64::Engine as _;
use minidom::Element;

use sasl::client::mechanisms::{Anonymous, Plain, Scram};
use sasl::client::Mechanism;
use sasl::common::scram::{Sha1, Sha256, Sha512};
use sasl::common::{ChannelBinding, Credentials};

use crate::connect::AsyncReadAndWrite;
use crate::error::{AuthError, Error};
use crate::xmlstream::{StreamFeatures, XmlStream, SASL_NS};

/// Mechanisms are attempted in this order, strongest first. `PLAIN` is
/// deliberately last and is only ever offered when the transport reports
/// channel-binding-capable encryption, so it is never attempted over a
/// plaintext link.
fn select_mechanism(
    offered: &[String],
    credentials: &Credentials,
) -> Result<Box<dyn Mechanism>, AuthError> {
    let has = |name: &str| offered.iter().any(|m| m == name);

    if has("SCRAM-SHA-512-PLUS") || has("SCRAM-SHA-512") {
        return Ok(Box::new(
            Scram::<Sha512>::from_credentials(credentials.clone())
                .map_err(AuthError::from)?,
        ));
    }
    if has("SCRAM-SHA-256-PLUS") || has("SCRAM-SHA-256") {
        return Ok(Box::new(
            Scram::<Sha256>::from_credentials(credentials.clone())
                .map_err(AuthError::from)?,
        ));
    }
    if has("SCRAM-SHA-1-PLUS") || has("SCRAM-SHA-1") {
        return Ok(Box::new(
            Scram::<Sha1>::from_credentials(credentials.clone())
                .map_err(AuthError::from)?,
        ));
    }
    if credentials.channel_binding.is_present() && has("PLAIN") {
        return Ok(Box::new(
            Plain::from_credentials(credentials.clone()).map_err(AuthError::from)?,
        ));
    }
    if has("ANONYMOUS") {
        return Ok(Box::new(
            Anonymous::from_credentials(credentials.clone()).map_err(AuthError::from)?,
        ));
    }
    Err(AuthError::NoMechanism)
}

/// Authenticate `stream` using the best mechanism both sides support.
///
/// `channel_binding` must reflect the transport's actual, currently active
/// encryption (`ChannelBinding::None` if the transport is plaintext or
/// doesn't expose exporter keying material). On success, the caller must
/// restart the XML stream (new `<stream:stream>` header) and read the new
/// `<stream:features>`, per RFC 6120 §6.2.
pub async fn authenticate<S: AsyncReadAndWrite>(
    stream: &mut XmlStream<S>,
    username: &str,
    password: &str,
    features: &StreamFeatures,
    channel_binding: ChannelBinding,
) -> Result<(), Error> {
    let credentials = Credentials::new(username, password).with_channel_binding(channel_binding);
    let mut mechanism = select_mechanism(&features.mechanisms, &credentials)?;

    let initial = mechanism.initial();
    stream
        .send_element(&auth_element(mechanism.name(), &initial))
        .await?;

    loop {
        let el = stream.read_element().await?.ok_or(Error::Disconnected)?;
        if el.is("challenge", SASL_NS) {
            let challenge = base64_engine
                .decode(el.text())
                .map_err(|e| AuthError::Sasl(sasl::MechanismError::Base64(e)))?;
            let response = mechanism
                .response(&challenge)
                .map_err(AuthError::from)?;
            stream
                .send_element(&response_element(&response))
                .await?;
        } else if el.is("success", SASL_NS) {
            let data = base64_engine
                .decode(el.text())
                .unwrap_or_default();
            mechanism.success(&data).map_err(AuthError::from)?;
            return Ok(());
        } else if el.is("failure", SASL_NS) {
            let condition = el
                .children()
                .next()
                .map(|c| c.name().to_owned())
                .unwrap_or_else(|| "unknown".to_owned());
            return Err(AuthError::Fail(condition).into());
        }
    }
}

fn auth_element(mechanism: &str, initial: &[u8]) -> Element {
    let payload = if initial.is_empty() {
        "=".to_owned()
    } else {
        base64_engine.encode(initial)
    };
    Element::builder("auth", SASL_NS)
        .attr("mechanism", mechanism)
        .append(crate::stanza::text_node(payload))
        .build()
}

fn response_element(data: &[u8]) -> Element {
    let payload = if data.is_empty() {
        "=".to_owned()
    } else {
        base64_engine.encode(data)
    };
    Element::builder("response", SASL_NS)
        .append(crate::stanza::text_node(payload))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offered(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn creds(channel_binding: ChannelBinding) -> Credentials {
        Credentials::new("juliet", "r0m30myr0m30").with_channel_binding(channel_binding)
    }

    #[test]
    fn prefers_scram_sha_512_over_weaker_scrams() {
        let offered = offered(&["SCRAM-SHA-1", "SCRAM-SHA-256", "SCRAM-SHA-512", "PLAIN"]);
        let mechanism = select_mechanism(&offered, &creds(ChannelBinding::None)).unwrap();
        assert_eq!(mechanism.name(), "SCRAM-SHA-512");
    }

    #[test]
    fn prefers_channel_bound_variant_when_offered() {
        let offered = offered(&["SCRAM-SHA-256", "SCRAM-SHA-256-PLUS"]);
        let binding = ChannelBinding::TlsExporter(vec![0u8; 32]);
        let mechanism = select_mechanism(&offered, &creds(binding)).unwrap();
        assert_eq!(mechanism.name(), "SCRAM-SHA-256-PLUS");
    }

    #[test]
    fn never_offers_plain_without_channel_binding() {
        let offered = offered(&["PLAIN", "ANONYMOUS"]);
        let mechanism = select_mechanism(&offered, &creds(ChannelBinding::None)).unwrap();
        assert_eq!(mechanism.name(), "ANONYMOUS");
    }

    #[test]
    fn falls_back_to_plain_when_channel_bound() {
        let offered = offered(&["PLAIN"]);
        let binding = ChannelBinding::TlsExporter(vec![0u8; 32]);
        let mechanism = select_mechanism(&offered, &creds(binding)).unwrap();
        assert_eq!(mechanism.name(), "PLAIN");
    }

    #[test]
    fn errors_when_nothing_is_usable() {
        let offered = offered(&["DIGEST-MD5"]);
        let err = select_mechanism(&offered, &creds(ChannelBinding::None)).unwrap_err();
        assert!(matches!(err, AuthError::NoMechanism));
    }
}
