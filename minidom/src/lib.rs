// Copyright (c) 2020 lumi <lumi@pew.im>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A small, simple DOM implementation on top of `rxml`, targeting the
//! subset of XML useful for XMPP.

#![deny(missing_docs)]

pub mod element;
pub mod error;
pub mod node;

pub use crate::element::{Builder, Element, ElementBuilder};
pub use crate::error::{Error, Result};
pub use crate::node::Node;
