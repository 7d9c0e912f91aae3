// Selector-driven networking: one OS thread owns a `mio::Poll`, an
// acceptor per listener, and a `ClientConnection`/`ClusterConnection` per
// accepted socket (spec §4.3, §4.4, §9 "Selector attachment polymorphism").

pub mod cluster_conn;
pub mod connection;
pub mod listener;
pub mod selector;
pub mod transport;

pub use connection::ClientConnection;
pub use selector::Selector;
pub use transport::Transport;

use mossmq_codec::packet::ControlPacket;
use mossmq_codec::ReasonCode;

use crate::error::Error;

/// What a `Session` holds a weak handle to: the minimal surface the
/// broker core needs in order to push a packet at a connected client or
/// tear it down, without depending on `ClientConnection`'s concrete type.
pub trait ConnectionSink {
    /// Enqueues `packet` on the outbound buffer; does not block. Framing
    /// and partial-write handling happen on the next writable readiness
    /// event via `send_remaining`.
    fn enqueue(&mut self, packet: ControlPacket) -> Result<(), Error>;

    /// Enqueues a DISCONNECT with `reason` and transitions to
    /// `Disconnecting` so the socket closes once the buffer drains.
    fn begin_disconnect(&mut self, reason: ReasonCode);
}

/// Distinguishes what kind of attachment a `mio::Token` refers to, so the
/// selector's ready loop can dispatch with one match (spec §9).
pub enum Attachment {
    Acceptor(usize),
    Client,
    Peer,
}
