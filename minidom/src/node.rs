// Copyright (c) 2020 lumi <lumi@pew.im>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Provides the `Node` enum, which represents a child of an `Element`.

use crate::element::Element;

/// A node in an element tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A child element.
    Element(Element),

    /// A text node.
    Text(String),
}

impl Node {
    /// Returns a reference to the element contained in this node, if any.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(ref e) => Some(e),
            Node::Text(_) => None,
        }
    }

    /// Returns a mutable reference to the element contained in this node, if any.
    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(ref mut e) => Some(e),
            Node::Text(_) => None,
        }
    }

    /// Returns a reference to the text contained in this node, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Element(_) => None,
            Node::Text(ref s) => Some(s.as_str()),
        }
    }
}

impl From<Element> for Node {
    fn from(elem: Element) -> Node {
        Node::Element(elem)
    }
}

impl From<String> for Node {
    fn from(text: String) -> Node {
        Node::Text(text)
    }
}

impl<'a> From<&'a str> for Node {
    fn from(text: &'a str) -> Node {
        Node::Text(text.to_owned())
    }
}
