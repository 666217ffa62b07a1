//! Namespace constants used throughout the stanza and extension modules.

/// `jabber:client`, the default namespace of client-to-server stanzas.
pub const JABBER_CLIENT: &str = "jabber:client";

/// XEP-0199: XMPP Ping.
pub const PING: &str = "urn:xmpp:ping";

/// XEP-0030: Service Discovery (info).
pub const DISCO_INFO: &str = "http://jabber.org/protocol/disco#info";

/// `urn:ietf:params:xml:ns:xmpp-stanzas`, the stanza-error condition
/// namespace.
pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

/// RFC 3921 `urn:ietf:session`, the legacy session-establishment IQ.
/// Deprecated by RFC 6121, but some deployed servers still advertise and
/// require it.
pub const SESSION: &str = "urn:ietf:session";

/// XEP-0280: Message Carbons.
pub const CARBONS: &str = "urn:xmpp:carbons:2";

/// `jabber:iq:roster`, the roster query/result namespace.
pub const ROSTER: &str = "jabber:iq:roster";
