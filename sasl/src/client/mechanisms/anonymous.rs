//! The `ANONYMOUS` mechanism (RFC 4505).

use crate::client::Mechanism;
use crate::common::Credentials;
use crate::error::MechanismError;

/// The `ANONYMOUS` SASL mechanism.
///
/// Carries no credentials; the server assigns an identity. Only useful
/// against servers/services that explicitly support anonymous access.
#[derive(Debug, Default)]
pub struct Anonymous;

impl Anonymous {
    /// Create a new `ANONYMOUS` mechanism instance.
    pub fn new() -> Self {
        Self
    }
}

impl Mechanism for Anonymous {
    fn name(&self) -> &str {
        "ANONYMOUS"
    }

    fn from_credentials(_credentials: Credentials) -> Result<Self, MechanismError> {
        Ok(Self)
    }

    fn response(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        Ok(Vec::new())
    }
}
