// Broker-level error type, distinct from the codec's own decode/encode
// errors. Carries enough context for the dispatch site to decide both a
// log line and a socket-close action.

use std::fmt;
use std::io;

use mossmq_codec::{DecodeError, EncodeError};

#[derive(Clone, Debug)]
pub enum ErrorKind {
    /// The peer violated MQTT 5 wire rules (spec §7 ProtocolError).
    Protocol,
    /// Socket-level I/O failure (spec §7 TransportError).
    Transport,
    /// A configured quota was exceeded (spec §7 ResourceError).
    Resource,
    /// Broker-state invariant violation (spec §7 InternalError); the
    /// offending connection is closed but the process stays up.
    Internal,
    /// Config file invalid or referenced paths missing.
    Config,
}

#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::new(ErrorKind::Transport, format!("io error: {err}"))
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::new(ErrorKind::Protocol, format!("decode error: {err}"))
    }
}

impl From<EncodeError> for Error {
    fn from(err: EncodeError) -> Self {
        Error::new(ErrorKind::Internal, format!("encode error: {err}"))
    }
}
