//! A crate for SASL authentication. Currently only does the client side.
//!
//! This implements the mechanisms needed by an XMPP client: `PLAIN` and
//! `SCRAM-SHA-1`/`SCRAM-SHA-256`/`SCRAM-SHA-512`, with optional support for
//! channel binding (`-PLUS` variants) via TLS exporter keying material.

#![deny(missing_docs)]

pub mod client;
pub mod common;
pub mod error;

pub use crate::error::MechanismError;
