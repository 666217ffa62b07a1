//! Typed wrappers around the three core stanza kinds.
//!
//! These are thin `TryFrom<minidom::Element>`/`Into<minidom::Element>`
//! views rather than a full schema layer: extension payloads a caller
//! doesn't otherwise model are preserved on `payload`/via `Element`
//! children rather than being dropped.

pub mod error;
pub mod iq;
pub mod message;
pub mod ns;
pub mod presence;

pub use error::StanzaError;
pub use iq::{Iq, IqType};
pub use message::{Message, MessageType};
pub use presence::{Presence, PresenceType};

pub(crate) fn text_node(text: String) -> minidom::Node {
    minidom::Node::Text(text)
}
