//! `<error/>` payloads attached to `type='error'` stanzas (RFC 6120 §8.3).

use minidom::Element;

use crate::error::ProtocolError;
use crate::stanza::ns;

/// The RFC 6120-defined error type attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Retrying without change is likely to fail again.
    Cancel,
    /// Retry after providing credentials.
    Auth,
    /// Retry after fixing the request.
    Modify,
    /// Retry after waiting.
    Wait,
    /// Undefined condition, retry is unlikely to ever succeed.
    Continue,
}

impl ErrorType {
    fn as_str(self) -> &'static str {
        match self {
            ErrorType::Cancel => "cancel",
            ErrorType::Auth => "auth",
            ErrorType::Modify => "modify",
            ErrorType::Wait => "wait",
            ErrorType::Continue => "continue",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "cancel" => ErrorType::Cancel,
            "auth" => ErrorType::Auth,
            "modify" => ErrorType::Modify,
            "wait" => ErrorType::Wait,
            "continue" => ErrorType::Continue,
            _ => return None,
        })
    }
}

/// A stanza-level error.
#[derive(Debug, Clone)]
pub struct StanzaError {
    /// The `type='...'` attribute.
    pub error_type: ErrorType,
    /// The defined condition local name, e.g. `item-not-found`.
    pub condition: String,
    /// Human-readable text, if any.
    pub text: Option<String>,
}

impl StanzaError {
    /// Build a `cancel`-type error with the given condition and no text.
    pub fn cancel(condition: &str) -> Self {
        Self {
            error_type: ErrorType::Cancel,
            condition: condition.to_owned(),
            text: None,
        }
    }

    /// A `service-unavailable` error, used as the default reply to an IQ
    /// nobody is registered to handle.
    pub fn service_unavailable() -> Self {
        Self::cancel("service-unavailable")
    }

    /// An `item-not-found` error.
    pub fn item_not_found() -> Self {
        Self::cancel("item-not-found")
    }

    /// A `feature-not-implemented` error, used as the default reply to an
    /// IQ request no registered extension claims.
    pub fn feature_not_implemented() -> Self {
        Self::cancel("feature-not-implemented")
    }
}

impl From<StanzaError> for Element {
    fn from(err: StanzaError) -> Element {
        let mut builder = Element::builder("error", ns::JABBER_CLIENT)
            .attr("type", err.error_type.as_str())
            .append(Element::bare(err.condition.clone(), ns::STANZAS));
        if let Some(text) = err.text {
            builder = builder.append(
                Element::builder("text", ns::STANZAS)
                    .append(crate::stanza::text_node(text))
                    .build(),
            );
        }
        builder.build()
    }
}

impl TryFrom<Element> for StanzaError {
    type Error = ProtocolError;

    fn try_from(el: Element) -> Result<Self, Self::Error> {
        if !el.is("error", ns::JABBER_CLIENT) {
            return Err(ProtocolError::InvalidStanza("expected <error/>".into()));
        }
        let error_type = el
            .attr("type")
            .and_then(ErrorType::from_str)
            .ok_or_else(|| ProtocolError::InvalidStanza("<error/> missing or invalid type".into()))?;
        let condition = el
            .children()
            .find(|c| c.ns() == ns::STANZAS && c.name() != "text")
            .map(|c| c.name().to_owned())
            .ok_or_else(|| ProtocolError::InvalidStanza("<error/> missing defined condition".into()))?;
        let text = el
            .children()
            .find(|c| c.is("text", ns::STANZAS))
            .map(|c| c.text());
        Ok(StanzaError {
            error_type,
            condition,
            text,
        })
    }
}
