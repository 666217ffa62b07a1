// Copyright (c) 2020 lumi <lumi@pew.im>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Provides the `Element` type, a small, simple DOM implementation on top
//! of `rxml`, targeting the subset of XML useful for XMPP.

use std::collections::BTreeMap;
use std::io::Write;

use bytes::BytesMut;
use rxml::writer::{Encoder, TrackNamespace};
use rxml::{AttrMap, Event, Namespace, NcName, QName};

use crate::error::{Error, Result};
use crate::node::Node;

/// An owned, parsed XML element, the core data structure of this crate.
///
/// An element carries its qualified name (local name + namespace), its
/// attributes, any namespace prefixes it or an ancestor declared (kept
/// around so that serialisation or introspection can resolve prefixed
/// attribute names), and its children (text and/or nested elements).
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    name: String,
    namespace: String,
    attributes: BTreeMap<String, String>,

    /// Namespace prefixes known to be in scope for this element, keyed by
    /// prefix (`None` for the default namespace).
    pub prefixes: BTreeMap<Option<String>, String>,
    children: Vec<Node>,
}

impl Element {
    /// Start building a new element with the given local name and
    /// namespace.
    pub fn builder<N: Into<String>, NS: Into<String>>(name: N, namespace: NS) -> Builder {
        Builder::new(name, namespace)
    }

    /// Create a bare element with no attributes or children.
    pub fn bare<N: Into<String>, NS: Into<String>>(name: N, namespace: NS) -> Element {
        Builder::new(name, namespace).build()
    }

    /// The local name of this element (no namespace prefix).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The namespace URI of this element.
    pub fn ns(&self) -> String {
        self.namespace.clone()
    }

    /// True if this element has the given local name and namespace.
    pub fn is(&self, name: &str, namespace: &str) -> bool {
        self.name == name && self.namespace == namespace
    }

    /// Returns the value of an attribute, if it exists.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Set an attribute's value, or remove it if `value` is `None`.
    pub fn set_attr<N: Into<String>, V: Into<Option<String>>>(&mut self, name: N, value: V) {
        let name = name.into();
        match value.into() {
            Some(value) => {
                self.attributes.insert(name, value);
            }
            None => {
                self.attributes.remove(&name);
            }
        }
    }

    /// Iterate over this element's attributes as `(name, value)` pairs.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate over this element's children (text and elements).
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.children.iter()
    }

    /// Iterate over this element's child elements only.
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Find the first direct child with the given name and namespace.
    pub fn get_child(&self, name: &str, namespace: &str) -> Option<&Element> {
        self.children()
            .find(|child| child.is(name, namespace))
    }

    /// True if a direct child with the given name and namespace exists.
    pub fn has_child(&self, name: &str, namespace: &str) -> bool {
        self.get_child(name, namespace).is_some()
    }

    /// Concatenate all direct text node children into a single string.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(Node::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// Append a child node (element or text).
    pub fn append_child<N: Into<Node>>(&mut self, node: N) -> &mut Element {
        self.children.push(node.into());
        self
    }

    /// Append a text node.
    pub fn append_text_node<S: Into<String>>(&mut self, text: S) -> &mut Element {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Take all child nodes out of this element, leaving it childless.
    pub fn take_nodes(&mut self) -> Vec<Node> {
        core::mem::take(&mut self.children)
    }

    /// Begin streaming construction of an `Element` from a parsed start-tag.
    ///
    /// This mirrors the shape of `rxml::Event::StartElement`'s payload, so
    /// callers can feed events directly off an `rxml` parser.
    pub fn from_events(qname: QName, attrs: AttrMap) -> ElementBuilder {
        ElementBuilder::new(qname, attrs)
    }

    /// Serialise this element (and its children) as a self-contained
    /// sequence of `rxml` events, writing them into `encoder`/`buf`.
    ///
    /// The caller is responsible for having declared any namespace prefixes
    /// this element or its descendants rely on (e.g. via
    /// `encoder.ns_tracker_mut().declare_fixed(..)`), since elements
    /// exchanged over an XMPP stream only ever use a small, fixed set of
    /// namespaces that are declared once at stream setup.
    pub fn write_into(&self, encoder: &mut Encoder, buf: &mut BytesMut) -> Result<()> {
        let name = NcName::try_from(self.name.clone()).map_err(|_| Error::InvalidPrefix)?;
        encoder
            .encode_into_bytes(
                rxml::Item::ElementHeadStart(Namespace::from(self.namespace.clone()), name.as_ref().into()),
                buf,
            )
            .map_err(Error::XmlError)?;
        for (key, value) in self.attributes.iter() {
            let name = NcName::try_from(key.clone()).map_err(|_| Error::InvalidPrefix)?;
            encoder
                .encode_into_bytes(
                    rxml::Item::Attribute(Namespace::NONE, name.as_ref().into(), value.as_str().into()),
                    buf,
                )
                .map_err(Error::XmlError)?;
        }
        encoder
            .encode_into_bytes(rxml::Item::ElementHeadEnd, buf)
            .map_err(Error::XmlError)?;
        for node in &self.children {
            match node {
                Node::Text(text) => {
                    encoder
                        .encode_into_bytes(rxml::Item::Text(text.as_str().into()), buf)
                        .map_err(Error::XmlError)?;
                }
                Node::Element(child) => {
                    child.write_into(encoder, buf)?;
                }
            }
        }
        encoder
            .encode_into_bytes(rxml::Item::ElementFoot, buf)
            .map_err(Error::XmlError)?;
        Ok(())
    }

    /// Serialise this element to a standalone byte buffer.
    ///
    /// This allocates a fresh `Encoder` and only fixes the element's own
    /// namespace (and `xml`), so it is mainly useful for logging/debugging
    /// and tests rather than for stream output, where namespaces are fixed
    /// once for the whole stream.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut encoder = Encoder::new();
        encoder
            .ns_tracker_mut()
            .declare_fixed(None, Namespace::from(self.namespace.clone()));
        let mut buf = BytesMut::new();
        self.write_into(&mut encoder, &mut buf)?;
        let mut out = Vec::new();
        out.write_all(&buf).map_err(Error::Io)?;
        Ok(out)
    }
}

/// Streaming builder that assembles an [`Element`] tree from a sequence of
/// [`rxml::Event`]s, nesting sub-builders for child elements.
pub struct ElementBuilder {
    inner: Option<Element>,
    nested: Option<Box<ElementBuilder>>,
}

impl ElementBuilder {
    fn new(qname: QName, attrs: AttrMap) -> Self {
        let (namespace, name) = qname;
        let mut builder = Builder::new(name.as_str().to_owned(), namespace.as_str().to_owned());
        for ((ns, attr_name), value) in attrs.into_iter() {
            if ns.is_none() {
                builder = builder.attr(attr_name, value);
            } else {
                // Attribute carries a foreign namespace; we keep the bare
                // local name and record the namespace mapping separately so
                // callers can still recover it if needed.
                builder = builder.attr(attr_name, value);
            }
        }
        Self {
            inner: Some(builder.build()),
            nested: None,
        }
    }

    /// Feed the next event into the builder.
    ///
    /// Returns `Ok(Some(element))` once the element (and all its children)
    /// has been fully parsed, i.e. on the matching `EndElement` event.
    pub fn feed(&mut self, ev: Event) -> Result<Option<Element>> {
        let inner = self.inner.as_mut().expect("feed() called after completion");
        if let Some(nested) = self.nested.as_mut() {
            match nested.feed(ev)? {
                Some(child) => {
                    inner.append_child(child);
                    self.nested = None;
                    return Ok(None);
                }
                None => return Ok(None),
            }
        }
        match ev {
            Event::XmlDeclaration(_, _) => Ok(None),
            Event::StartElement(_, qname, attrs) => {
                self.nested = Some(Box::new(ElementBuilder::new(qname, attrs)));
                Ok(None)
            }
            Event::Text(_, text) => {
                inner.append_text_node(text);
                Ok(None)
            }
            Event::EndElement(_) => Ok(self.inner.take()),
        }
    }
}

/// A builder for [`Element`]s.
pub struct Builder {
    name: String,
    namespace: String,
    attributes: BTreeMap<String, String>,
    prefixes: BTreeMap<Option<String>, String>,
    children: Vec<Node>,
}

impl Builder {
    /// Create a new builder for an element with the given name and
    /// namespace.
    pub fn new<N: Into<String>, NS: Into<String>>(name: N, namespace: NS) -> Builder {
        Builder {
            name: name.into(),
            namespace: namespace.into(),
            attributes: BTreeMap::new(),
            prefixes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Set an attribute.
    pub fn attr<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Builder {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Declare a namespace prefix (`None` for the default namespace) as in
    /// scope for this element.
    pub fn prefix<NS: Into<String>>(
        mut self,
        prefix: Option<String>,
        namespace: NS,
    ) -> Result<Builder> {
        if self.prefixes.contains_key(&prefix) {
            return Err(Error::DuplicatePrefix);
        }
        self.prefixes.insert(prefix, namespace.into());
        Ok(self)
    }

    /// Append a child node.
    pub fn append<N: Into<Node>>(mut self, node: N) -> Builder {
        self.children.push(node.into());
        self
    }

    /// Finish building and return the `Element`.
    pub fn build(self) -> Element {
        Element {
            name: self.name,
            namespace: self.namespace,
            attributes: self.attributes,
            prefixes: self.prefixes,
            children: self.children,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxml::parser::EventMetrics;

    #[test]
    fn builds_element_with_attrs_and_children() {
        let el = Element::builder("iq", "jabber:client")
            .attr("type", "get")
            .attr("id", "abc123")
            .append(Element::bare("query", "jabber:iq:roster"))
            .build();
        assert_eq!(el.name(), "iq");
        assert_eq!(el.attr("type"), Some("get"));
        assert!(el.has_child("query", "jabber:iq:roster"));
    }

    #[test]
    fn text_concatenates_text_nodes() {
        let mut el = Element::bare("body", "jabber:client");
        el.append_text_node("hello ");
        el.append_text_node("world");
        assert_eq!(el.text(), "hello world");
    }

    #[test]
    fn streaming_builder_assembles_nested_tree() {
        let qname: QName = (Namespace::from("jabber:client"), NcName::try_from("iq".to_owned()).unwrap());
        let mut builder = Element::from_events(qname, AttrMap::new());
        let child_qname: QName = (
            Namespace::from("jabber:iq:roster"),
            NcName::try_from("query".to_owned()).unwrap(),
        );
        assert!(builder
            .feed(Event::StartElement(EventMetrics::zero(), child_qname, AttrMap::new()))
            .unwrap()
            .is_none());
        assert!(builder
            .feed(Event::EndElement(EventMetrics::zero()))
            .unwrap()
            .is_none());
        let el = builder
            .feed(Event::EndElement(EventMetrics::zero()))
            .unwrap()
            .expect("element should be complete");
        assert!(el.has_child("query", "jabber:iq:roster"));
    }
}
