// Per-client session state (spec §3, §4.3 delivery sub-state). Owned
// exclusively by the Broker Core; handlers hold only a back-reference.

pub mod subscription;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Weak;
use std::time::{Duration, Instant};

pub use subscription::Subscription;

use mossmq_codec::packet::{PublishPacket, Will};
use mossmq_codec::{Properties, QoS};

use crate::net::ConnectionSink;
use crate::types::ClientId;

/// A publish parked on an offline (or slow) session, replayed once the
/// client reconnects or drains its outbound buffer.
#[derive(Clone, Debug)]
pub struct QueuedPublish {
    pub topic_name: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    pub properties: Properties,
}

/// Outbound QoS 1/2 delivery phase, keyed by packet id in
/// [`Session::outbound_inflight`].
#[derive(Clone, Debug)]
pub enum OutboundFlight {
    AwaitingPubAck(QueuedPublish),
    AwaitingPubRec(QueuedPublish),
    AwaitingPubComp,
}

/// Allocates packet identifiers 1..=65535, wrapping and skipping any value
/// already present in either flight table (spec §3).
#[derive(Debug, Default)]
pub struct PacketIdAllocator {
    next: u16,
}

impl PacketIdAllocator {
    #[must_use]
    pub fn new() -> Self {
        PacketIdAllocator { next: 0 }
    }

    /// Returns `None` only when all 65535 ids are currently in flight.
    pub fn allocate(&mut self, in_use: &HashSet<u16>) -> Option<u16> {
        if in_use.len() >= 65535 {
            return None;
        }
        for _ in 0..65535 {
            self.next = if self.next == 65535 { 1 } else { self.next + 1 };
            if !in_use.contains(&self.next) {
                return Some(self.next);
            }
        }
        None
    }
}

pub struct Session {
    pub client_id: ClientId,
    /// Non-owning handle to the live connection, absent while the session
    /// is retained offline (spec §3: "weak, may be absent").
    pub handler: Option<Weak<RefCell<dyn ConnectionSink>>>,
    pub clean_start: bool,
    pub session_expiry_interval: u32,
    pub will: Option<Will>,
    pub will_delay_deadline: Option<Instant>,
    /// QoS 2 inbound: packet ids for which PUBREC has been sent and a
    /// PUBREL is still expected.
    pub inbound_inflight: HashSet<u16>,
    pub outbound_inflight: HashMap<u16, OutboundFlight>,
    pub packet_ids: PacketIdAllocator,
    pub subscriptions: Vec<Subscription>,
    pub receive_maximum: u16,
    pub maximum_packet_size: u32,
    pub offline_queue: VecDeque<QueuedPublish>,
    /// Deadline past which an offline session is discarded.
    pub expiry_deadline: Option<Instant>,
    /// Deadline past which a missed keep-alive closes the connection.
    pub keep_alive_deadline: Option<Instant>,
}

impl Session {
    #[must_use]
    pub fn new(client_id: ClientId, clean_start: bool, session_expiry_interval: u32) -> Self {
        Session {
            client_id,
            handler: None,
            clean_start,
            session_expiry_interval,
            will: None,
            will_delay_deadline: None,
            inbound_inflight: HashSet::new(),
            outbound_inflight: HashMap::new(),
            packet_ids: PacketIdAllocator::new(),
            subscriptions: Vec::new(),
            receive_maximum: 65535,
            maximum_packet_size: 0,
            offline_queue: VecDeque::new(),
            expiry_deadline: None,
            keep_alive_deadline: None,
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.handler
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some()
    }

    pub fn mark_offline(&mut self, now: Instant) {
        self.handler = None;
        self.expiry_deadline = Some(now + Duration::from_secs(u64::from(self.session_expiry_interval)));
    }

    #[must_use]
    pub fn has_expired(&self, now: Instant) -> bool {
        !self.is_online()
            && self
                .expiry_deadline
                .is_some_and(|deadline| now >= deadline)
    }

    /// Queues a message for later delivery (offline session, or QoS 1/2
    /// flow control) and, if currently online, attempts to flush it
    /// immediately through the caller-supplied send closure.
    pub fn queue_offline(&mut self, message: QueuedPublish) {
        self.offline_queue.push_back(message);
    }

    pub fn clear_in_flight(&mut self) {
        self.inbound_inflight.clear();
        self.outbound_inflight.clear();
    }

    pub fn add_subscription(&mut self, subscription: Subscription) -> bool {
        if let Some(existing) = self
            .subscriptions
            .iter_mut()
            .find(|s| s.filter == subscription.filter && s.share_name == subscription.share_name)
        {
            *existing = subscription;
            false
        } else {
            self.subscriptions.push(subscription);
            true
        }
    }

    pub fn remove_subscription(&mut self, filter: &str) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.filter != filter);
        self.subscriptions.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_id_allocator_skips_in_use_values() {
        let mut allocator = PacketIdAllocator::new();
        let mut in_use = HashSet::new();
        let first = allocator.allocate(&in_use).unwrap();
        assert_eq!(first, 1);
        in_use.insert(2);
        let second = allocator.allocate(&in_use).unwrap();
        assert_eq!(second, 3);
    }

    #[test]
    fn offline_session_expires_after_deadline() {
        let mut session = Session::new(ClientId::from("c1".to_string()), false, 60);
        let now = Instant::now();
        session.mark_offline(now);
        assert!(!session.has_expired(now));
        assert!(session.has_expired(now + Duration::from_secs(61)));
    }
}
