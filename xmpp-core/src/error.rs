use sasl::error::MechanismError as SaslMechanismError;
use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;
use std::net::AddrParseError;
use std::str::Utf8Error;

use crate::connect::ServerConnectorError;

/// Top-level error type.
#[derive(Debug)]
pub enum Error {
    /// I/O error.
    Io(IoError),
    /// Error parsing a Jabber ID.
    JidParse(jid::Error),
    /// Protocol-level error.
    Protocol(ProtocolError),
    /// Authentication error.
    Auth(AuthError),
    /// Connection closed.
    Disconnected,
    /// Should never happen.
    InvalidState,
    /// Fmt error.
    Fmt(fmt::Error),
    /// Utf8 error.
    Utf8(Utf8Error),
    /// Error specific to a [`crate::connect::ServerConnector`] impl.
    Connection(Box<dyn ServerConnectorError>),
    /// DNS or socket address resolution error.
    Resolve(IoError),
    /// Invalid IP/port address.
    Addr(AddrParseError),
    /// HTTP CONNECT proxy tunnel setup failed.
    Proxy(String),
    /// A liveness probe confirmed the peer is unreachable after a request
    /// timed out; the underlying connection is being torn down and
    /// retried rather than the specific request being resent.
    ConnectionLost,
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(fmt, "IO error: {}", e),
            Error::Connection(e) => write!(fmt, "connection error: {}", e),
            Error::JidParse(e) => write!(fmt, "jid parse error: {}", e),
            Error::Protocol(e) => write!(fmt, "protocol error: {}", e),
            Error::Auth(e) => write!(fmt, "authentication error: {}", e),
            Error::Disconnected => write!(fmt, "disconnected"),
            Error::InvalidState => write!(fmt, "invalid state"),
            Error::Fmt(e) => write!(fmt, "fmt error: {}", e),
            Error::Utf8(e) => write!(fmt, "utf8 error: {}", e),
            Error::Resolve(e) => write!(fmt, "DNS resolution error: {}", e),
            Error::Addr(e) => write!(fmt, "wrong network address: {e}"),
            Error::Proxy(msg) => write!(fmt, "proxy tunnel error: {msg}"),
            Error::ConnectionLost => write!(fmt, "connection lost (liveness probe failed)"),
        }
    }
}

impl StdError for Error {}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

impl<T: ServerConnectorError + 'static> From<T> for Error {
    fn from(e: T) -> Self {
        Error::Connection(Box::new(e))
    }
}

impl From<jid::Error> for Error {
    fn from(e: jid::Error) -> Self {
        Error::JidParse(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        Error::Auth(e)
    }
}

impl From<fmt::Error> for Error {
    fn from(e: fmt::Error) -> Self {
        Error::Fmt(e)
    }
}

impl From<Utf8Error> for Error {
    fn from(e: Utf8Error) -> Self {
        Error::Utf8(e)
    }
}

impl From<AddrParseError> for Error {
    fn from(e: AddrParseError) -> Error {
        Error::Addr(e)
    }
}

/// XMPP protocol-level error.
#[derive(Debug)]
pub enum ProtocolError {
    /// XML parser or element-tree error.
    Parser(minidom::Error),
    /// A stanza did not have the shape we expected.
    InvalidStanza(String),
    /// No TLS available where one was required.
    NoTls,
    /// Invalid response to resource binding.
    InvalidBindResponse,
    /// No `xmlns` attribute on `<stream:stream>`.
    NoStreamNamespace,
    /// No `id` attribute on `<stream:stream>`.
    NoStreamId,
    /// Encountered an unexpected XML token.
    InvalidToken,
    /// Unexpected `<stream:stream>` (shouldn't occur mid-stream).
    InvalidStreamStart,
    /// The peer sent a fatal `<stream:error>`.
    StreamError(String),
    /// The peer closed the stream without a graceful `</stream:stream>`.
    UnexpectedEof,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolError::Parser(e) => write!(fmt, "XML parser error: {}", e),
            ProtocolError::InvalidStanza(msg) => write!(fmt, "invalid stanza: {msg}"),
            ProtocolError::NoTls => write!(fmt, "no TLS available"),
            ProtocolError::InvalidBindResponse => {
                write!(fmt, "invalid response to resource binding")
            }
            ProtocolError::NoStreamNamespace => {
                write!(fmt, "no xmlns attribute in <stream:stream>")
            }
            ProtocolError::NoStreamId => write!(fmt, "no id attribute in <stream:stream>"),
            ProtocolError::InvalidToken => write!(fmt, "encountered an unexpected XML token"),
            ProtocolError::InvalidStreamStart => write!(fmt, "unexpected <stream:stream>"),
            ProtocolError::StreamError(cond) => write!(fmt, "stream error: {cond}"),
            ProtocolError::UnexpectedEof => write!(fmt, "stream closed unexpectedly"),
        }
    }
}

impl StdError for ProtocolError {}

impl From<minidom::Error> for ProtocolError {
    fn from(e: minidom::Error) -> Self {
        ProtocolError::Parser(e)
    }
}

impl From<minidom::Error> for Error {
    fn from(e: minidom::Error) -> Self {
        ProtocolError::Parser(e).into()
    }
}

/// Authentication error.
#[derive(Debug)]
pub enum AuthError {
    /// No mechanism advertised by the server is implemented locally.
    NoMechanism,
    /// Local SASL implementation error.
    Sasl(SaslMechanismError),
    /// `<failure/>` from the server.
    Fail(String),
    /// Resource binding was rejected by the server.
    BindFailed(String),
}

impl StdError for AuthError {}

impl fmt::Display for AuthError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthError::NoMechanism => write!(fmt, "no matching SASL mechanism available"),
            AuthError::Sasl(s) => write!(fmt, "local SASL implementation error: {}", s),
            AuthError::Fail(c) => write!(fmt, "failure from the server: {c}"),
            AuthError::BindFailed(msg) => write!(fmt, "resource binding failed: {msg}"),
        }
    }
}

impl From<SaslMechanismError> for AuthError {
    fn from(e: SaslMechanismError) -> Self {
        AuthError::Sasl(e)
    }
}
