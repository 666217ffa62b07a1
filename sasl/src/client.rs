//! Client-side SASL mechanisms.

use crate::common::Credentials;
use crate::error::MechanismError;

pub mod mechanisms;

/// A client-side SASL mechanism.
///
/// The typical flow is: `initial()` (sent as the `<auth/>` payload),
/// then `response()` once per `<challenge/>` received from the server,
/// and finally `success()` once the server sends `<success/>`, to verify
/// any final signature the mechanism requires.
pub trait Mechanism: Send {
    /// The mechanism name as advertised in `<mechanism/>` elements, e.g.
    /// `"PLAIN"` or `"SCRAM-SHA-256"`.
    fn name(&self) -> &str;

    /// Construct this mechanism from a set of credentials.
    fn from_credentials(credentials: Credentials) -> Result<Self, MechanismError>
    where
        Self: Sized;

    /// The initial response to send along with `<auth/>`, if any.
    fn initial(&mut self) -> Vec<u8> {
        Vec::new()
    }

    /// Compute the response to a server challenge.
    fn response(&mut self, challenge: &[u8]) -> Result<Vec<u8>, MechanismError>;

    /// Verify the server's final message, if the mechanism defines one.
    ///
    /// Called with the payload of `<success/>`. The default implementation
    /// accepts anything, which is correct for mechanisms without a final
    /// server signature (e.g. `PLAIN`, `ANONYMOUS`).
    fn success(&mut self, _data: &[u8]) -> Result<(), MechanismError> {
        Ok(())
    }
}
