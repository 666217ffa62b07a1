//! Low-level [XMPP](https://xmpp.org/) client session core, with
//! asynchronous I/O using [tokio](https://tokio.rs/).
//!
//! # Getting started
//!
//! Most users want [`Client`], which connects to a server over TCP with
//! STARTTLS (or plain WebSocket) and drives stream negotiation, SASL
//! authentication, resource binding and XEP-0198 stream management for you.
//! Build an event loop by calling the client's `next` method repeatedly; see
//! `examples/echo_bot.rs` for a complete example.
//!
//! # Features
//!
//! - Transports: plain TCP with STARTTLS, secure WebSocket (RFC 7395), and
//!   an HTTP CONNECT proxy tunnel in front of either.
//! - SASL: `SCRAM-SHA-1`, `SCRAM-SHA-256`, `SCRAM-SHA-512` (with `-PLUS`
//!   `tls-exporter` channel binding where the transport supports it),
//!   `PLAIN` and `ANONYMOUS`.
//! - XEP-0198 Stream Management: acking, resumption, unacked-stanza replay.
//! - IQ request/response correlation with timeout and a ping safety net.
//! - Reference extensions: XEP-0199 ping responder, XEP-0030 disco#info
//!   responder.

#![deny(unsafe_code, missing_docs, bare_trait_objects)]

extern crate alloc;

pub mod client;
pub mod config;
pub mod connect;
/// Detailed error types.
pub mod error;
mod event;
pub mod extensions;
pub mod sasl_engine;
pub mod stanza;
pub mod stanzastream;
pub mod xmlstream;

#[doc(inline)]
pub use crate::error::Error;
pub use client::Client;
pub use config::{ClientBuilder, ClientConfig};
pub use event::{Criticity, Event, Stanza};
