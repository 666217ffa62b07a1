//! Reference IQ responders for the handful of XEPs a bare session core is
//! expected to answer on its own, without help from the application, plus
//! the registry [`crate::Client`] dispatches inbound IQ requests through.
//!
//! Extensions register with [`crate::Client`] in construction order. On
//! each inbound IQ request, extensions are asked in that same order whether
//! they wish to claim it; the first to return `Some` wins and no further
//! extension is consulted. An IQ request nobody claims gets an automatic
//! `feature-not-implemented` error reply.

pub mod disco;
pub mod ping;

use crate::client::IqResponse;
use crate::stanza::Iq;

pub use disco::DiscoResponder;
pub use ping::PingResponder;

/// Something that can answer a subset of inbound IQ requests.
///
/// Implementations should be cheap to query: `handle_iq` is called, in
/// registration order, for every inbound IQ request until one of them
/// claims it.
pub trait Extension: Send {
    /// A short, stable name for this extension (e.g. `"ping"`), used by
    /// [`ExtensionRegistry::get_extension`].
    fn name(&self) -> &str;

    /// The primary XML namespace this extension answers queries in, used
    /// by [`ExtensionRegistry::get_extension_by_namespace`].
    fn namespace(&self) -> &str;

    /// Inspect `iq` and, if this extension recognises it, return the
    /// reply. Returning `None` lets the next-registered extension try.
    fn handle_iq(&mut self, iq: &Iq) -> Option<IqResponse>;

    /// Downcast support for retrieving a concrete extension back out of the
    /// registry (e.g. to update a [`DiscoResponder`]'s advertised
    /// features).
    fn as_any(&self) -> &dyn core::any::Any;

    /// Mutable counterpart of [`Extension::as_any`].
    fn as_any_mut(&mut self) -> &mut dyn core::any::Any;
}

/// Ordered collection of [`Extension`]s owned by [`crate::Client`].
///
/// Dispatch tries extensions in registration order and stops at the first
/// one that claims the stanza (invariant: once an extension claims a
/// stanza, no later extension is ever invoked for it).
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn Extension>>,
}

impl ExtensionRegistry {
    /// An empty registry, with no extensions registered.
    pub fn new() -> Self {
        Self {
            extensions: Vec::new(),
        }
    }

    /// Register `extension`, placing it after every extension already
    /// registered.
    pub fn register(&mut self, extension: Box<dyn Extension>) {
        self.extensions.push(extension);
    }

    /// Look up a registered extension by its [`Extension::name`].
    pub fn get_extension(&self, name: &str) -> Option<&dyn Extension> {
        self.extensions
            .iter()
            .map(|e| e.as_ref())
            .find(|e| e.name() == name)
    }

    /// Mutable counterpart of [`ExtensionRegistry::get_extension`].
    pub fn get_extension_mut(&mut self, name: &str) -> Option<&mut (dyn Extension + 'static)> {
        self.extensions
            .iter_mut()
            .map(|e| e.as_mut())
            .find(|e| e.name() == name)
    }

    /// Look up a registered extension by its [`Extension::namespace`].
    pub fn get_extension_by_namespace(&self, namespace: &str) -> Option<&dyn Extension> {
        self.extensions
            .iter()
            .map(|e| e.as_ref())
            .find(|e| e.namespace() == namespace)
    }

    /// Mutable counterpart of
    /// [`ExtensionRegistry::get_extension_by_namespace`].
    pub fn get_extension_by_namespace_mut(
        &mut self,
        namespace: &str,
    ) -> Option<&mut (dyn Extension + 'static)> {
        self.extensions
            .iter_mut()
            .map(|e| e.as_mut())
            .find(|e| e.namespace() == namespace)
    }

    /// Offer `iq` to every registered extension in order, stopping at the
    /// first one that claims it.
    pub fn dispatch(&mut self, iq: &Iq) -> Option<IqResponse> {
        for extension in self.extensions.iter_mut() {
            if let Some(response) = extension.handle_iq(iq) {
                return Some(response);
            }
        }
        None
    }
}

/// Build the `result`/`error` reply stanza for a `request` that one of this
/// module's responders has just answered.
pub fn reply(request: &Iq, response: IqResponse) -> Iq {
    match response {
        IqResponse::Result(payload) => Iq::result(request.id.clone(), request.from.clone(), payload),
        IqResponse::Error(error) => Iq::error(request.id.clone(), request.from.clone(), error),
    }
}
