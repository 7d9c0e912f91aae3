// Shared identifiers threaded through the broker, session and net layers.

use std::fmt;

/// Client-supplied (or broker-assigned) session key. A newtype over
/// `String` rather than `mossmq_codec`'s wire-level representation, since
/// once decoded a ClientID is purely a lookup key.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    #[must_use]
    pub fn new(id: String) -> Self {
        ClientId(id)
    }

    #[must_use]
    pub fn generate() -> Self {
        ClientId(format!("mossmq-{}", uuid::Uuid::new_v4()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        ClientId(s)
    }
}

/// `mio::Token` wrapper identifying one registered socket (client, peer,
/// or the acceptor itself) inside the selector loop.
pub type Token = mio::Token;

/// Numeric id assigned to a cluster peer for loop-prevention tagging on
/// forwarded publishes.
pub type NodeId = u32;
