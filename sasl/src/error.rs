//! Error type shared by all SASL mechanisms.

use core::fmt;

/// An error raised while driving a SASL mechanism.
#[derive(Debug)]
pub enum MechanismError {
    /// A required credential (e.g. a password) was not supplied.
    MissingCredential(&'static str),

    /// A method was called in a state it doesn't support, e.g. `response`
    /// called twice on a one-shot mechanism.
    InvalidState,

    /// The server sent a challenge or final message that doesn't follow the
    /// mechanism's wire format.
    MalformedChallenge(String),

    /// The server's final signature did not match what we computed, meaning
    /// either the server doesn't know the password or the channel is being
    /// tampered with.
    ServerSignatureMismatch,

    /// Challenge data was not valid base64.
    Base64(base64::DecodeError),

    /// Challenge data was not valid UTF-8.
    Utf8(core::str::Utf8Error),

    /// The server's nonce did not extend the client's own nonce.
    ///
    /// RFC 5802 §3 requires the server-first message's `r=` value to start
    /// with the nonce the client sent in its first message. A mismatch
    /// means either a broken server or a downgrade/replay attempt, and the
    /// exchange must be aborted rather than completed.
    NonceMismatch,
}

impl fmt::Display for MechanismError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MissingCredential(which) => write!(f, "missing required credential: {which}"),
            Self::InvalidState => write!(f, "mechanism used in an invalid state"),
            Self::MalformedChallenge(msg) => write!(f, "malformed server challenge: {msg}"),
            Self::ServerSignatureMismatch => {
                write!(f, "server signature does not match expected value")
            }
            Self::Base64(e) => write!(f, "invalid base64 in challenge: {e}"),
            Self::Utf8(e) => write!(f, "invalid utf-8 in challenge: {e}"),
            Self::NonceMismatch => write!(f, "server nonce does not extend the client nonce"),
        }
    }
}

impl std::error::Error for MechanismError {}

impl From<base64::DecodeError> for MechanismError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Base64(e)
    }
}

impl From<core::str::Utf8Error> for MechanismError {
    fn from(e: core::str::Utf8Error) -> Self {
        Self::Utf8(e)
    }
}
