//! The `PLAIN` mechanism (RFC 4616).

use crate::client::Mechanism;
use crate::common::Credentials;
use crate::error::MechanismError;

/// The `PLAIN` SASL mechanism.
///
/// Sends the username and password in the clear as the initial response,
/// so this must only ever be used over an already-encrypted channel.
pub struct Plain {
    authzid: String,
    authcid: String,
    password: String,
}

impl Mechanism for Plain {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn from_credentials(credentials: Credentials) -> Result<Self, MechanismError> {
        let password = credentials
            .password
            .ok_or(MechanismError::MissingCredential("password"))?;
        Ok(Self {
            authzid: String::new(),
            authcid: credentials.username,
            password,
        })
    }

    fn initial(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.authzid.len() + self.authcid.len() + self.password.len() + 2);
        out.extend_from_slice(self.authzid.as_bytes());
        out.push(0);
        out.extend_from_slice(self.authcid.as_bytes());
        out.push(0);
        out.extend_from_slice(self.password.as_bytes());
        out
    }

    fn response(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        Err(MechanismError::InvalidState)
    }
}
