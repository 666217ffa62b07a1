// Copyright (c) 2019 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Establish a fresh, authenticated stream: transport connection, SASL,
//! and the post-auth stream restart (RFC 6120 §6.2).

use crate::connect::ServerConnector;
use crate::error::Error;
use crate::sasl_engine;
use crate::xmlstream::{StreamFeatures, StreamHeader, Timeouts, XmlStream};

/// Connect to the server identified by `jid` and authenticate as it,
/// using `password`.
///
/// On success, the returned stream has completed SASL and is positioned
/// right after the post-auth `<stream:features>`; it is not yet bound to
/// a resource.
pub(crate) async fn client_auth<C: ServerConnector>(
    connector: C,
    jid: jid::Jid,
    password: String,
    _timeouts: Timeouts,
) -> Result<(XmlStream<C::Stream>, StreamFeatures), Error> {
    let (mut stream, features) = connector.connect(&jid).await?;

    let channel_binding = C::channel_binding(stream.inner())?;
    let username = jid.node().unwrap_or("");
    sasl_engine::authenticate(&mut stream, username, &password, &features, channel_binding).await?;

    let header = StreamHeader::client_to_server(jid.to_bare());
    let (mut stream, _id) = stream.restart(&header).await?;
    let features_el = stream.read_element().await?.ok_or(Error::Disconnected)?;
    let features = StreamFeatures::from_element(&features_el);

    Ok((stream, features))
}
