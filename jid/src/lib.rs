//! A crate which provides a `Jid` struct for Jabber IDs.
//!
//! A JID looks like `node@domain/resource`, where both the `node@` and
//! the `/resource` parts are optional.

#![deny(missing_docs)]

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An error that occurs when parsing a Jid from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Happens when the node identifier contains the `@` character.
    NodeContainsAt,

    /// Happens when the resource identifier contains the `/` character.
    ResourceContainsSlash,

    /// Happens when parsing an empty string, an empty domain, an empty node
    /// or an empty resource.
    EmptyString,

    /// Happens when the domain is invalid according to `stringprep`'s
    /// nameprep profile.
    NodeprepFailed,

    /// Happens when the resource fails `stringprep`'s resourceprep profile.
    ResourceprepFailed,

    /// Happens when the node fails `stringprep`'s nodeprep profile.
    DomainInvalid,
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NodeContainsAt => write!(fmt, "node identifier must not contain '@'"),
            Error::ResourceContainsSlash => {
                write!(fmt, "resource identifier must not contain '/'")
            }
            Error::EmptyString => write!(fmt, "jid, node, domain or resource is empty"),
            Error::NodeprepFailed => write!(fmt, "node failed nodeprep validation"),
            Error::ResourceprepFailed => write!(fmt, "resource failed resourceprep validation"),
            Error::DomainInvalid => write!(fmt, "domain is invalid"),
        }
    }
}

impl std::error::Error for Error {}

/// A parsed Jabber ID, as specified in RFC 6122 / RFC 7622.
///
/// A `Jid` can either be a *bare* JID (`node@domain`, or just `domain`) or a
/// *full* JID (`node@domain/resource`, or `domain/resource`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Jid {
    node: Option<String>,
    domain: String,
    resource: Option<String>,
}

impl Jid {
    /// Build a new `Jid` from its parts.
    ///
    /// Every part goes through `stringprep` (nodeprep / nameprep /
    /// resourceprep) before being accepted. This is stricter than mere
    /// syntactic parsing and will reject, for example, node or resource
    /// identifiers with uppercase letters that don't fold cleanly.
    pub fn from_parts(
        node: Option<&str>,
        domain: &str,
        resource: Option<&str>,
    ) -> Result<Jid, Error> {
        let node = match node {
            Some(node) => {
                if node.is_empty() {
                    return Err(Error::EmptyString);
                }
                Some(nodeprep(node)?)
            }
            None => None,
        };
        if domain.is_empty() {
            return Err(Error::EmptyString);
        }
        let domain = nameprep(domain)?;
        let resource = match resource {
            Some(resource) => {
                if resource.is_empty() {
                    return Err(Error::EmptyString);
                }
                Some(resourceprep(resource)?)
            }
            None => None,
        };
        Ok(Jid {
            node,
            domain,
            resource,
        })
    }

    /// Return the node part of this JID, if any, without the trailing `@`.
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// Return the domain part of this JID.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Return the resource part of this JID, if any, without the leading
    /// `/`.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// True if this JID has no resource part.
    pub fn is_bare(&self) -> bool {
        self.resource.is_none()
    }

    /// True if this JID has a resource part.
    pub fn is_full(&self) -> bool {
        self.resource.is_some()
    }

    /// Return a new `Jid` with the resource part stripped off.
    pub fn to_bare(&self) -> Jid {
        Jid {
            node: self.node.clone(),
            domain: self.domain.clone(),
            resource: None,
        }
    }

    /// Return a new `Jid` with the given resource attached (replacing any
    /// existing one).
    pub fn with_resource(&self, resource: &str) -> Result<Jid, Error> {
        Jid::from_parts(self.node(), &self.domain, Some(resource))
    }
}

/// Apply RFC 3491 nameprep to a domain label.
///
/// XMPP domains are not full IDNA hostnames in our scope (no DNS, no
/// punycode), but servers still expect nameprep-folded comparisons.
fn nameprep(s: &str) -> Result<String, Error> {
    stringprep::nameprep(s).map(|cow| cow.into_owned()).map_err(|_| Error::DomainInvalid)
}

fn nodeprep(s: &str) -> Result<String, Error> {
    stringprep::nodeprep(s).map(|cow| cow.into_owned()).map_err(|_| Error::NodeprepFailed)
}

fn resourceprep(s: &str) -> Result<String, Error> {
    stringprep::resourceprep(s).map(|cow| cow.into_owned()).map_err(|_| Error::ResourceprepFailed)
}

impl FromStr for Jid {
    type Err = Error;

    /// Parse a string into a JID.
    ///
    /// This splits on the first `@` before the first `/` for the node, and
    /// on the first `/` for the resource, syntactically, and then applies
    /// stringprep to each part.
    fn from_str(s: &str) -> Result<Jid, Error> {
        if s.is_empty() {
            return Err(Error::EmptyString);
        }

        let (rest, resource) = match memchr::memchr(b'/', s.as_bytes()) {
            Some(idx) => (&s[..idx], Some(&s[idx + 1..])),
            None => (s, None),
        };

        let (node, domain) = match memchr::memchr(b'@', rest.as_bytes()) {
            // An `@` that comes after a literal IPv6-style `[` isn't part of
            // our use case (no literal IP JIDs), so a plain search is fine.
            Some(idx) => (Some(&rest[..idx]), &rest[idx + 1..]),
            None => (None, rest),
        };

        if node.map(|n| n.contains('@')).unwrap_or(false) {
            return Err(Error::NodeContainsAt);
        }
        if resource.map(|r| r.contains('/')).unwrap_or(false) {
            return Err(Error::ResourceContainsSlash);
        }

        Jid::from_parts(node, domain, resource)
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref node) = self.node {
            write!(fmt, "{}@", node)?;
        }
        write!(fmt, "{}", self.domain)?;
        if let Some(ref resource) = self.resource {
            write!(fmt, "/{}", resource)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Jid {
    type Error = Error;

    fn try_from(s: String) -> Result<Jid, Error> {
        s.parse()
    }
}

impl TryFrom<&str> for Jid {
    type Error = Error;

    fn try_from(s: &str) -> Result<Jid, Error> {
        s.parse()
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> String {
        jid.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_jid() {
        let jid: Jid = "user@example.com/resource".parse().unwrap();
        assert_eq!(jid.node(), Some("user"));
        assert_eq!(jid.domain(), "example.com");
        assert_eq!(jid.resource(), Some("resource"));
        assert!(jid.is_full());
    }

    #[test]
    fn parses_bare_jid() {
        let jid: Jid = "user@example.com".parse().unwrap();
        assert_eq!(jid.node(), Some("user"));
        assert_eq!(jid.resource(), None);
        assert!(jid.is_bare());
    }

    #[test]
    fn parses_domain_only() {
        let jid: Jid = "example.com".parse().unwrap();
        assert_eq!(jid.node(), None);
        assert_eq!(jid.domain(), "example.com");
    }

    #[test]
    fn rejects_empty() {
        assert_eq!("".parse::<Jid>(), Err(Error::EmptyString));
        assert_eq!("@example.com".parse::<Jid>(), Err(Error::EmptyString));
        assert_eq!("example.com/".parse::<Jid>(), Err(Error::EmptyString));
    }

    #[test]
    fn round_trips_to_string() {
        let jid: Jid = "user@example.com/resource".parse().unwrap();
        assert_eq!(jid.to_string(), "user@example.com/resource");
    }

    #[test]
    fn to_bare_strips_resource() {
        let jid: Jid = "user@example.com/resource".parse().unwrap();
        assert_eq!(jid.to_bare().to_string(), "user@example.com");
    }

    #[test]
    fn nodeprep_folds_case() {
        let jid: Jid = "User@Example.com".parse().unwrap();
        assert_eq!(jid.node(), Some("user"));
    }
}
