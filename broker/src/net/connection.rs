// Per-socket connection state (spec §4.3 "TCP Event Handler"). Owns
// framing/buffering/keep-alive/topic-alias bookkeeping; packet semantics
// live in `broker::BrokerCore`, which the selector hands decoded packets
// to after `ClientConnection` pulls them off the wire.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::Token;

use mossmq_codec::bytes::ByteReader;
use mossmq_codec::packet::ControlPacket;
use mossmq_codec::ReasonCode;

use crate::error::{Error, ErrorKind};
use crate::net::{Attachment, ConnectionSink, Transport};
use crate::types::ClientId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    AwaitingConnect,
    Connected,
    Disconnecting,
}

/// A single accepted socket plus the state the selector and broker core
/// need to drive it. Lives in the selector's connection table, keyed by
/// `mio::Token`; a `Session` reaches it only through the `ConnectionSink`
/// trait object via a weak handle.
pub struct ClientConnection {
    pub token: Token,
    pub attachment: Attachment,
    transport: Transport,
    peer_addr: Option<SocketAddr>,
    pub state: ConnState,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
    write_pos: usize,
    pub client_id: Option<ClientId>,
    connect_deadline: Instant,
    keep_alive: Option<Duration>,
    last_activity: Instant,
    /// Inbound aliases (client -> broker direction): alias id to topic.
    topic_alias_in: HashMap<u16, String>,
    /// Outbound aliases (broker -> client direction) already handed to
    /// this client: topic to alias id.
    topic_alias_out: HashMap<String, u16>,
    topic_alias_out_next: u16,
    topic_alias_out_maximum: u16,
}

impl ClientConnection {
    #[must_use]
    pub fn new(token: Token, transport: Transport, connect_timeout: Duration) -> Self {
        let peer_addr = transport.peer_addr();
        let now = Instant::now();
        ClientConnection {
            token,
            attachment: Attachment::Client,
            transport,
            peer_addr,
            state: ConnState::AwaitingConnect,
            read_buf: Vec::with_capacity(4096),
            write_buf: Vec::new(),
            write_pos: 0,
            client_id: None,
            connect_deadline: now + connect_timeout,
            keep_alive: None,
            last_activity: now,
            topic_alias_in: HashMap::new(),
            topic_alias_out: HashMap::new(),
            topic_alias_out_next: 1,
            topic_alias_out_maximum: 0,
        }
    }

    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn mark_connected(&mut self, keep_alive: Duration, topic_alias_out_maximum: u16) {
        self.state = ConnState::Connected;
        self.keep_alive = if keep_alive.is_zero() {
            None
        } else {
            Some(keep_alive)
        };
        self.topic_alias_out_maximum = topic_alias_out_maximum;
        self.last_activity = Instant::now();
    }

    /// Registration-worthy readiness: the raw socket mio polls on.
    pub fn raw_mut(&mut self) -> &mut mio::net::TcpStream {
        self.transport.raw_mut()
    }

    /// Reads available bytes and decodes as many complete control
    /// packets as are buffered, leaving any trailing partial packet for
    /// the next readable event.
    ///
    /// # Errors
    /// Returns an error on socket failure, clean EOF (`UnexpectedEof`),
    /// or a malformed packet.
    pub fn poll_read(&mut self) -> Result<Vec<ControlPacket>, Error> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.transport.read(&mut chunk) {
                Ok(0) => return Err(Error::new(ErrorKind::Transport, "connection closed by peer")),
                Ok(n) => {
                    self.read_buf.extend_from_slice(&chunk[..n]);
                    self.last_activity = Instant::now();
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err.into()),
            }
        }
        self.drain_packets()
    }

    fn drain_packets(&mut self) -> Result<Vec<ControlPacket>, Error> {
        let mut packets = Vec::new();
        loop {
            let mut header_reader = ByteReader::new(&self.read_buf);
            let header = match mossmq_codec::FixedHeader::decode(&mut header_reader) {
                Ok(header) => header,
                Err(_) => break, // not enough bytes buffered yet for even the fixed header
            };
            let total = header.total_len();
            if self.read_buf.len() < total {
                break;
            }
            let mut reader = ByteReader::new(&self.read_buf[..total]);
            let packet = ControlPacket::decode(&mut reader)?;
            self.read_buf.drain(..total);
            packets.push(packet);
        }
        Ok(packets)
    }

    /// Flushes as much of the pending write buffer as the socket accepts.
    ///
    /// # Errors
    /// Returns an error on socket failure other than `WouldBlock`.
    pub fn flush_writes(&mut self) -> Result<(), Error> {
        while self.write_pos < self.write_buf.len() {
            match self.transport.write(&self.write_buf[self.write_pos..]) {
                Ok(0) => break,
                Ok(n) => self.write_pos += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err.into()),
            }
        }
        if self.write_pos == self.write_buf.len() {
            self.write_buf.clear();
            self.write_pos = 0;
        }
        Ok(())
    }

    #[must_use]
    pub fn has_pending_writes(&self) -> bool {
        self.write_pos < self.write_buf.len()
    }

    #[must_use]
    pub fn connect_timed_out(&self, now: Instant) -> bool {
        self.state == ConnState::AwaitingConnect && now >= self.connect_deadline
    }

    /// True once 1.5x the negotiated keep-alive has elapsed with no
    /// inbound traffic (spec §4.3).
    #[must_use]
    pub fn keep_alive_expired(&self, now: Instant) -> bool {
        self.keep_alive.is_some_and(|interval| {
            let grace = interval + interval / 2;
            now.duration_since(self.last_activity) >= grace
        })
    }

    /// Resolves an inbound topic alias: a non-empty topic name
    /// (re)defines the alias, an empty one looks up the existing
    /// mapping. Returns the resolved topic name.
    pub fn resolve_incoming_alias(&mut self, alias: u16, topic: &str) -> Option<String> {
        if topic.is_empty() {
            self.topic_alias_in.get(&alias).cloned()
        } else {
            self.topic_alias_in.insert(alias, topic.to_string());
            Some(topic.to_string())
        }
    }

    /// Returns the alias to send for `topic` on an outbound PUBLISH:
    /// `(alias, already_known)`. `already_known = true` means the
    /// caller may omit the topic name, since the client already holds
    /// this mapping.
    pub fn assign_outgoing_alias(&mut self, topic: &str) -> Option<(u16, bool)> {
        if self.topic_alias_out_maximum == 0 {
            return None;
        }
        if let Some(&alias) = self.topic_alias_out.get(topic) {
            return Some((alias, true));
        }
        if self.topic_alias_out_next > self.topic_alias_out_maximum {
            return None;
        }
        let alias = self.topic_alias_out_next;
        self.topic_alias_out_next += 1;
        self.topic_alias_out.insert(topic.to_string(), alias);
        Some((alias, false))
    }

    /// Clears per-connection alias state; called on disconnect (spec
    /// design note: alias tables must be cleared, never carried across
    /// reconnects).
    pub fn clear_topic_aliases(&mut self) {
        self.topic_alias_in.clear();
        self.topic_alias_out.clear();
        self.topic_alias_out_next = 1;
    }
}

impl ConnectionSink for ClientConnection {
    fn enqueue(&mut self, packet: ControlPacket) -> Result<(), Error> {
        packet.encode(&mut self.write_buf)?;
        self.flush_writes()
    }

    fn begin_disconnect(&mut self, reason: ReasonCode) {
        use mossmq_codec::packet::DisconnectPacket;
        use mossmq_codec::Properties;
        let packet = ControlPacket::Disconnect(DisconnectPacket {
            reason_code: reason,
            properties: Properties::new(),
        });
        let _ = packet.encode(&mut self.write_buf);
        self.state = ConnState::Disconnecting;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn test_connection() -> ClientConnection {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        drop(client);
        server.set_nonblocking(true).unwrap();
        let stream = mio::net::TcpStream::from_std(server);
        ClientConnection::new(Token(0), Transport::plain(stream), Duration::from_secs(30))
    }

    #[test]
    fn outgoing_alias_is_assigned_then_reused() {
        let mut conn = test_connection();
        conn.topic_alias_out_maximum = 4;
        let (first, known) = conn.assign_outgoing_alias("room/1").unwrap();
        assert_eq!(first, 1);
        assert!(!known);
        let (second, known) = conn.assign_outgoing_alias("room/1").unwrap();
        assert_eq!(second, first);
        assert!(known);
    }

    #[test]
    fn outgoing_alias_exhausted_returns_none() {
        let mut conn = test_connection();
        conn.topic_alias_out_maximum = 1;
        conn.assign_outgoing_alias("a").unwrap();
        assert!(conn.assign_outgoing_alias("b").is_none());
    }

    #[test]
    fn incoming_alias_lookup_requires_prior_definition() {
        let mut conn = test_connection();
        assert_eq!(conn.resolve_incoming_alias(1, "room/1"), Some("room/1".to_string()));
        assert_eq!(conn.resolve_incoming_alias(1, ""), Some("room/1".to_string()));
        assert_eq!(conn.resolve_incoming_alias(2, ""), None);
    }

    #[test]
    fn keep_alive_not_expired_before_grace_period() {
        let mut conn = test_connection();
        conn.mark_connected(Duration::from_secs(10), 0);
        assert!(!conn.keep_alive_expired(Instant::now()));
    }
}
