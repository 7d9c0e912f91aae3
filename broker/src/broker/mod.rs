// Broker Core (spec §4.5): owns the session registry, the subscription
// trie, the retained-message store and the cluster peer registry; drives
// per-tick cleanup. Everything else (selector, per-socket buffering) only
// moves bytes and calls in here.

pub mod cluster;
pub mod retained;
pub mod trie;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use mossmq_codec::packet::{
    AckPacket, ConnAckPacket, ControlPacket, PublishPacket, SubscribeFilter, SubscribePacket,
    UnsubscribePacket,
};
use mossmq_codec::{Properties, Property, PropertyType, QoS, ReasonCode};

use crate::auth::{AclBackend, AllowAllAcl, AuthBackend, AuthRequest, Decision};
use crate::config::General;
use crate::error::{Error, ErrorKind};
use crate::net::cluster_conn::{PeerFrame, PeerSink};
use crate::net::ConnectionSink;
use crate::session::subscription::Subscription;
use crate::session::{OutboundFlight, QueuedPublish, Session};
use crate::types::{ClientId, NodeId};

pub use cluster::ClusterRegistry;
pub use retained::{RetainedMessage, RetainedStore};
pub use trie::{SubscriberKey, SubscriptionTrie};

/// Who a `publish` call originated from, for no-local filtering and
/// cluster loop prevention (spec §4.5, §4.6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    Session(ClientId),
    Peer(NodeId),
    Server,
}

pub struct BrokerCore {
    node_id: NodeId,
    general: General,
    auth_backend: Box<dyn AuthBackend>,
    acl_backend: Box<dyn AclBackend>,
    sessions: HashMap<ClientId, Rc<RefCell<Session>>>,
    trie: SubscriptionTrie,
    retained: RetainedStore,
    cluster: ClusterRegistry,
    shared_round_robin: HashMap<String, usize>,
    started_at: Instant,
    last_sys_publish: Instant,
}

impl BrokerCore {
    #[must_use]
    pub fn new(node_id: NodeId, general: General, auth_backend: Box<dyn AuthBackend>) -> Self {
        BrokerCore {
            node_id,
            general,
            auth_backend,
            acl_backend: Box::new(AllowAllAcl),
            sessions: HashMap::new(),
            trie: SubscriptionTrie::new(),
            retained: RetainedStore::new(),
            cluster: ClusterRegistry::new(),
            shared_round_robin: HashMap::new(),
            started_at: Instant::now(),
            last_sys_publish: Instant::now(),
        }
    }

    pub fn set_acl_backend(&mut self, backend: Box<dyn AclBackend>) {
        self.acl_backend = backend;
    }

    /// Re-authenticates a connected client via an AUTH packet exchange
    /// (spec §6 authentication boundary: "invoked on CONNECT and on AUTH
    /// packets").
    #[must_use]
    pub fn authenticate(&self, request: &AuthRequest<'_>) -> Decision {
        self.auth_backend.authenticate(request)
    }

    #[must_use]
    pub fn session(&self, client_id: &ClientId) -> Option<Rc<RefCell<Session>>> {
        self.sessions.get(client_id).cloned()
    }

    #[must_use]
    pub fn cluster_mut(&mut self) -> &mut ClusterRegistry {
        &mut self.cluster
    }

    #[must_use]
    pub const fn general(&self) -> &General {
        &self.general
    }

    fn send_to_peer(&self, node_id: NodeId, frame: PeerFrame) {
        let Some(sink) = self.cluster.sink(node_id).and_then(|weak| weak.upgrade()) else {
            return;
        };
        if sink.borrow_mut().send_frame(frame).is_err() {
            warn!("failed to send frame to cluster peer {node_id}");
        }
    }

    fn broadcast_to_peers(&self, frame: PeerFrame) {
        for node_id in self.cluster.node_ids() {
            self.send_to_peer(node_id, frame.clone());
        }
    }

    // ---- connection lifecycle -------------------------------------------

    /// Handles an inbound CONNECT: authenticates, resumes or creates a
    /// session, and returns the CONNACK to send plus any queued offline
    /// messages now ready for delivery.
    ///
    /// # Errors
    /// Returns a `Protocol` error if the client id is empty and the
    /// listener disallows it.
    pub fn connect(
        &mut self,
        handler: Weak<RefCell<dyn ConnectionSink>>,
        packet: mossmq_codec::packet::ConnectPacket,
        allow_empty_client_id: bool,
    ) -> Result<(ClientId, ConnAckPacket), Error> {
        let client_id = if packet.client_id.is_empty() {
            if !allow_empty_client_id {
                return Err(Error::new(
                    ErrorKind::Protocol,
                    "empty ClientID not permitted by this listener",
                ));
            }
            ClientId::generate()
        } else {
            ClientId::new(packet.client_id.clone())
        };

        let decision = self.auth_backend.authenticate(&AuthRequest {
            client_id: client_id.as_str(),
            username: packet.username.as_deref(),
            password: packet.password.as_deref(),
            auth_method: None,
            auth_data: None,
        });
        if decision == Decision::Deny {
            return Err(Error::new(ErrorKind::Protocol, "authentication denied"));
        }

        // Any client already connected under this id is taken over.
        if let Some(existing) = self.sessions.get(&client_id) {
            if let Some(sink) = existing.borrow().handler.as_ref().and_then(Weak::upgrade) {
                sink.borrow_mut().begin_disconnect(ReasonCode::SessionTakenOver);
            }
        }

        let session_expiry = self
            .general
            .maximum_session_expiry_interval()
            .map_or(packet.session_expiry_interval(), |max| {
                packet.session_expiry_interval().min(max)
            });

        let resumed = !packet.clean_start
            && self
                .sessions
                .get(&client_id)
                .is_some_and(|s| !s.borrow().has_expired(Instant::now()));

        let session = if resumed {
            let session = self.sessions.get(&client_id).unwrap().clone();
            {
                let mut session_mut = session.borrow_mut();
                session_mut.handler = Some(handler);
                session_mut.expiry_deadline = None;
            }
            session
        } else {
            let mut session = Session::new(client_id.clone(), packet.clean_start, session_expiry);
            session.handler = Some(handler);
            session.receive_maximum = packet.receive_maximum().min(self.general.receive_maximum());
            session.maximum_packet_size = self.general.maximum_packet_size();
            session.will = packet.will.clone();
            Rc::new(RefCell::new(session))
        };
        self.sessions.insert(client_id.clone(), session);

        info!(
            "client {} connected (resumed session = {})",
            client_id, resumed
        );

        let mut connack_properties = Properties::new();
        connack_properties.push(Property::ReceiveMaximum(self.general.receive_maximum()));
        connack_properties.push(Property::MaximumQoS(self.general.maximum_qos() as u8));
        connack_properties.push(Property::RetainAvailable(self.general.retain_available()));
        connack_properties.push(Property::TopicAliasMaximum(self.general.topic_alias_maximum()));
        connack_properties.push(Property::WildcardSubscriptionAvailable(
            self.general.wildcard_subscription_available(),
        ));
        connack_properties.push(Property::SubscriptionIdentifierAvailable(
            self.general.subscription_identifier_available(),
        ));
        connack_properties.push(Property::SharedSubscriptionAvailable(
            self.general.shared_subscription_available(),
        ));
        if let Some(keep_alive) = self.general.server_keep_alive() {
            connack_properties.push(Property::ServerKeepAlive(keep_alive));
        }

        let connack = ConnAckPacket {
            session_present: resumed,
            reason_code: ReasonCode::Success,
            properties: connack_properties,
        };
        Ok((client_id, connack))
    }

    /// Flushes a just-reconnected session's offline queue through its
    /// (now live) handler.
    pub fn flush_offline_queue(&mut self, client_id: &ClientId) {
        let Some(session_rc) = self.sessions.get(client_id).cloned() else {
            return;
        };
        let queued: Vec<QueuedPublish> = {
            let mut session = session_rc.borrow_mut();
            std::mem::take(&mut session.offline_queue).into_iter().collect()
        };
        for message in queued {
            self.deliver_to_session(client_id, &message.topic_name, &message.payload, message.qos, message.retain, message.properties);
        }
    }

    // ---- publish ----------------------------------------------------------

    /// spec §4.5 `publish`.
    pub fn publish(
        &mut self,
        origin: Origin,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        properties: Properties,
    ) {
        if retain && self.general.retain_available() {
            let expires_at = message_expiry(&properties);
            self.retained.publish(
                topic,
                RetainedMessage {
                    payload: payload.to_vec(),
                    qos,
                    properties: properties.clone(),
                    expires_at,
                },
            );
        }

        let matched = self.trie.matches(topic);
        let mut delivered_groups: std::collections::HashSet<(String, String)> =
            std::collections::HashSet::new();

        for key in &matched {
            if let Some(share_name) = &key.share_name {
                let group_key = (share_name.clone(), topic.to_string());
                if delivered_groups.contains(&group_key) {
                    continue;
                }
                let members: Vec<&SubscriberKey> = matched
                    .iter()
                    .filter(|k| k.share_name.as_ref() == Some(share_name))
                    .collect();
                let idx = {
                    let counter = self
                        .shared_round_robin
                        .entry(format!("{share_name}\u{0}{topic}"))
                        .or_insert(0);
                    let idx = *counter % members.len();
                    *counter = counter.wrapping_add(1);
                    idx
                };
                let chosen = members[idx];
                delivered_groups.insert(group_key);
                self.deliver_matched(&origin, chosen, topic, payload, qos, retain, &properties);
            } else {
                self.deliver_matched(&origin, key, topic, payload, qos, retain, &properties);
            }
        }

        if !matches!(origin, Origin::Peer(_)) && self.general.cluster_enabled() {
            for node_id in self.cluster.peers_interested_in(topic) {
                self.send_to_peer(
                    node_id,
                    PeerFrame::Publish {
                        origin_node: self.node_id,
                        topic: topic.to_string(),
                        payload: payload.to_vec(),
                        qos,
                        retain,
                        properties: properties.clone(),
                    },
                );
            }
        }
    }

    fn deliver_matched(
        &mut self,
        origin: &Origin,
        key: &SubscriberKey,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        properties: &Properties,
    ) {
        if origin == &Origin::Session(key.client_id.clone()) {
            let Some(session_rc) = self.sessions.get(&key.client_id) else {
                return;
            };
            let no_local = session_rc
                .borrow()
                .subscriptions
                .iter()
                .find(|s| self.trie_subscription_matches(s, key))
                .is_some_and(|s| s.options.no_local);
            if no_local {
                return;
            }
        }
        let Some(session_rc) = self.sessions.get(&key.client_id).cloned() else {
            return;
        };
        let subscription = session_rc
            .borrow()
            .subscriptions
            .iter()
            .find(|s| self.trie_subscription_matches(s, key))
            .cloned();
        let Some(subscription) = subscription else {
            return;
        };
        let delivered_qos = qos.min(subscription.options.qos);
        let delivered_retain = retain && subscription.options.retain_as_published;
        self.deliver_to_session(
            &key.client_id,
            topic,
            payload,
            delivered_qos,
            delivered_retain,
            properties.clone(),
        );
    }

    fn trie_subscription_matches(&self, subscription: &Subscription, key: &SubscriberKey) -> bool {
        subscription.share_name == key.share_name
    }

    fn deliver_to_session(
        &mut self,
        client_id: &ClientId,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        properties: Properties,
    ) {
        let Some(session_rc) = self.sessions.get(client_id).cloned() else {
            return;
        };
        let sink = session_rc.borrow().handler.as_ref().and_then(Weak::upgrade);
        let Some(sink) = sink else {
            session_rc.borrow_mut().queue_offline(QueuedPublish {
                topic_name: topic.to_string(),
                payload: payload.to_vec(),
                qos,
                retain,
                properties,
            });
            return;
        };

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            let mut session = session_rc.borrow_mut();
            let in_use: std::collections::HashSet<u16> =
                session.outbound_inflight.keys().copied().collect();
            session.packet_ids.allocate(&in_use)
        };

        let publish = PublishPacket {
            dup: false,
            qos,
            retain,
            topic_name: topic.to_string(),
            packet_id,
            properties,
            payload: payload.to_vec(),
        };

        if qos != QoS::AtMostOnce {
            let Some(id) = packet_id else {
                session_rc.borrow_mut().queue_offline(QueuedPublish {
                    topic_name: publish.topic_name.clone(),
                    payload: publish.payload.clone(),
                    qos,
                    retain,
                    properties: publish.properties.clone(),
                });
                return;
            };
            let flight = if qos == QoS::AtLeastOnce {
                OutboundFlight::AwaitingPubAck(QueuedPublish {
                    topic_name: publish.topic_name.clone(),
                    payload: publish.payload.clone(),
                    qos,
                    retain,
                    properties: publish.properties.clone(),
                })
            } else {
                OutboundFlight::AwaitingPubRec(QueuedPublish {
                    topic_name: publish.topic_name.clone(),
                    payload: publish.payload.clone(),
                    qos,
                    retain,
                    properties: publish.properties.clone(),
                })
            };
            session_rc.borrow_mut().outbound_inflight.insert(id, flight);
        }

        if sink
            .borrow_mut()
            .enqueue(ControlPacket::Publish(publish))
            .is_err()
        {
            warn!("failed to enqueue PUBLISH to {client_id}");
        }
    }

    // ---- subscribe / unsubscribe -------------------------------------------

    /// spec §4.5 `subscribe`.
    pub fn subscribe(
        &mut self,
        client_id: &ClientId,
        packet: &SubscribePacket,
    ) -> Vec<ReasonCode> {
        let subscription_identifier = packet.subscription_identifier();
        let Some(session_rc) = self.sessions.get(client_id).cloned() else {
            return packet
                .filters
                .iter()
                .map(|_| ReasonCode::UnspecifiedError)
                .collect();
        };

        let mut reason_codes = Vec::with_capacity(packet.filters.len());
        for filter in &packet.filters {
            reason_codes.push(self.subscribe_one(client_id, &session_rc, filter, subscription_identifier));
        }
        reason_codes
    }

    fn subscribe_one(
        &mut self,
        client_id: &ClientId,
        session_rc: &Rc<RefCell<Session>>,
        filter: &SubscribeFilter,
        subscription_identifier: Option<u32>,
    ) -> ReasonCode {
        if !self.acl_backend.check(client_id.as_str(), &filter.filter, false) {
            return ReasonCode::NotAuthorized;
        }

        let subscription = Subscription::new(filter.filter.clone(), filter.options.clone(), subscription_identifier);
        if subscription.share_name.is_some() && !self.general.shared_subscription_available() {
            return ReasonCode::SharedSubscriptionsNotSupported;
        }
        if (subscription.filter.contains('+') || subscription.filter.contains('#'))
            && !self.general.wildcard_subscription_available()
        {
            return ReasonCode::WildcardSubscriptionsNotSupported;
        }

        let is_new = session_rc.borrow_mut().add_subscription(subscription.clone());
        let key = SubscriberKey {
            client_id: client_id.clone(),
            share_name: subscription.share_name.clone(),
        };
        self.trie.insert(&subscription.filter, key.clone());

        if is_new && self.general.cluster_enabled() {
            self.broadcast_to_peers(PeerFrame::InterestAdd(subscription.filter.clone()));
        }

        self.replay_retained(client_id, &subscription, is_new);

        match subscription.options.qos {
            QoS::AtMostOnce => ReasonCode::Success,
            QoS::AtLeastOnce => ReasonCode::GrantedQoS1,
            QoS::ExactlyOnce => ReasonCode::GrantedQoS2,
        }
    }

    fn replay_retained(&mut self, client_id: &ClientId, subscription: &Subscription, is_new: bool) {
        use mossmq_codec::packet::RetainHandling;
        let should_replay = match subscription.options.retain_handling {
            RetainHandling::SendAtSubscribe => true,
            RetainHandling::SendIfNewSubscription => is_new,
            RetainHandling::DoNotSend => false,
        };
        if !should_replay {
            return;
        }
        let filter = subscription.filter.clone();
        let matches: Vec<(String, RetainedMessage)> = self
            .retained
            .matching(|topic| mossmq_codec::topic::matches(&filter, topic))
            .into_iter()
            .map(|(topic, message)| (topic.to_string(), message.clone()))
            .collect();
        let delivered_qos_cap = subscription.options.qos;
        for (topic, message) in matches {
            let qos = message.qos.min(delivered_qos_cap);
            self.deliver_to_session(client_id, &topic, &message.payload, qos, true, message.properties);
        }
    }

    /// spec §4.5 `unsubscribe`.
    pub fn unsubscribe(&mut self, client_id: &ClientId, packet: &UnsubscribePacket) -> Vec<ReasonCode> {
        let Some(session_rc) = self.sessions.get(client_id).cloned() else {
            return packet
                .filters
                .iter()
                .map(|_| ReasonCode::UnspecifiedError)
                .collect();
        };
        packet
            .filters
            .iter()
            .map(|raw_filter| {
                let (share_name, filter) = split_share(raw_filter);
                let removed = session_rc.borrow_mut().remove_subscription(&filter);
                if removed {
                    let key = SubscriberKey {
                        client_id: client_id.clone(),
                        share_name,
                    };
                    self.trie.remove(&filter, &key);
                    if self.general.cluster_enabled() {
                        self.broadcast_to_peers(PeerFrame::InterestRemove(filter.clone()));
                    }
                    ReasonCode::Success
                } else {
                    ReasonCode::NoSubscriptionExisted
                }
            })
            .collect()
    }

    // ---- disconnect / cleanup -----------------------------------------------

    /// spec §4.5 `disconnect`.
    pub fn disconnect(&mut self, client_id: &ClientId, reason: ReasonCode) {
        let Some(session_rc) = self.sessions.get(client_id).cloned() else {
            return;
        };
        let now = Instant::now();
        let will = session_rc.borrow().will.clone();
        let schedule_will = will.is_some() && reason != ReasonCode::Success;
        {
            let mut session = session_rc.borrow_mut();
            if schedule_will {
                let delay = will.as_ref().map(Will::delay_interval).unwrap_or(0);
                session.will_delay_deadline = Some(now + Duration::from_secs(u64::from(delay)));
            } else {
                session.will = None;
            }
            session.clear_in_flight();
            session.mark_offline(now);
        }
        info!("client {client_id} disconnected ({reason:?})");
        if session_rc.borrow().session_expiry_interval == 0 && !schedule_will {
            self.sessions.remove(client_id);
        }
    }

    /// spec §4.5 `cleanup_operations`, called every outer tick.
    pub fn cleanup_operations(&mut self) {
        let now = Instant::now();
        self.deliver_due_wills(now);
        self.expire_offline_sessions(now);
        self.retained.expire(now);
        self.publish_sys_status(now);
    }

    fn deliver_due_wills(&mut self, now: Instant) {
        let due: Vec<(ClientId, Will)> = self
            .sessions
            .iter()
            .filter_map(|(id, session)| {
                let session = session.borrow();
                let deadline = session.will_delay_deadline?;
                if now >= deadline {
                    session.will.clone().map(|will| (id.clone(), will))
                } else {
                    None
                }
            })
            .collect();
        for (client_id, will) in due {
            if let Some(session_rc) = self.sessions.get(&client_id) {
                session_rc.borrow_mut().will_delay_deadline = None;
                session_rc.borrow_mut().will = None;
            }
            debug!("delivering will for {client_id}");
            self.publish(
                Origin::Server,
                &will.topic,
                &will.payload,
                will.qos,
                will.retain,
                will.properties,
            );
        }
    }

    fn expire_offline_sessions(&mut self, now: Instant) {
        let expired: Vec<ClientId> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.borrow().has_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for client_id in expired {
            trace!("session for {client_id} expired");
            if let Some(session_rc) = self.sessions.remove(&client_id) {
                for subscription in &session_rc.borrow().subscriptions {
                    let key = SubscriberKey {
                        client_id: client_id.clone(),
                        share_name: subscription.share_name.clone(),
                    };
                    self.trie.remove(&subscription.filter, &key);
                }
            }
        }
    }

    fn publish_sys_status(&mut self, now: Instant) {
        let interval = self.general.sys_interval_secs();
        if interval == 0 || now.duration_since(self.last_sys_publish) < Duration::from_secs(u64::from(interval)) {
            return;
        }
        self.last_sys_publish = now;
        let connected = self.sessions.values().filter(|s| s.borrow().is_online()).count();
        let uptime = now.duration_since(self.started_at).as_secs();
        self.publish(
            Origin::Server,
            "$SYS/broker/clients/connected",
            connected.to_string().as_bytes(),
            QoS::AtMostOnce,
            true,
            Properties::new(),
        );
        self.publish(
            Origin::Server,
            "$SYS/broker/uptime",
            uptime.to_string().as_bytes(),
            QoS::AtMostOnce,
            true,
            Properties::new(),
        );
    }

    // ---- inbound acks ------------------------------------------------------

    pub fn handle_puback(&mut self, client_id: &ClientId, ack: &AckPacket) {
        if let Some(session_rc) = self.sessions.get(client_id) {
            session_rc.borrow_mut().outbound_inflight.remove(&ack.packet_id);
        }
    }

    pub fn handle_pubrec(&mut self, client_id: &ClientId, ack: &AckPacket) -> Option<AckPacket> {
        let session_rc = self.sessions.get(client_id)?;
        let mut session = session_rc.borrow_mut();
        if session.outbound_inflight.contains_key(&ack.packet_id) {
            session
                .outbound_inflight
                .insert(ack.packet_id, OutboundFlight::AwaitingPubComp);
            Some(AckPacket {
                packet_id: ack.packet_id,
                reason_code: ReasonCode::Success,
                properties: Properties::new(),
            })
        } else {
            None
        }
    }

    pub fn handle_pubcomp(&mut self, client_id: &ClientId, ack: &AckPacket) {
        if let Some(session_rc) = self.sessions.get(client_id) {
            session_rc.borrow_mut().outbound_inflight.remove(&ack.packet_id);
        }
    }

    /// Inbound QoS 2 PUBLISH: records the packet id and returns whether this
    /// is a first delivery (the caller should dispatch to subscribers) or a
    /// duplicate that should only be re-acked.
    pub fn handle_qos2_publish(&mut self, client_id: &ClientId, packet_id: u16) -> bool {
        let Some(session_rc) = self.sessions.get(client_id) else {
            return true;
        };
        session_rc.borrow_mut().inbound_inflight.insert(packet_id)
    }

    pub fn handle_pubrel(&mut self, client_id: &ClientId, packet_id: u16) {
        if let Some(session_rc) = self.sessions.get(client_id) {
            session_rc.borrow_mut().inbound_inflight.remove(&packet_id);
        }
    }
}

use mossmq_codec::packet::Will;

fn split_share(raw: &str) -> (Option<String>, String) {
    if let Some(rest) = raw.strip_prefix("$share/") {
        if let Some((group, filter)) = rest.split_once('/') {
            return (Some(group.to_string()), filter.to_string());
        }
    }
    (None, raw.to_string())
}

fn message_expiry(properties: &Properties) -> Option<Instant> {
    match properties.find(PropertyType::MessageExpiryInterval) {
        Some(Property::MessageExpiryInterval(secs)) => {
            Some(Instant::now() + Duration::from_secs(u64::from(*secs)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AllowAllBackend;
    use crate::net::ConnectionSink;
    use mossmq_codec::packet::{SubscribeOptions, RetainHandling};
    use std::cell::RefCell;

    struct RecordingSink {
        received: Vec<ControlPacket>,
    }

    impl ConnectionSink for RecordingSink {
        fn enqueue(&mut self, packet: ControlPacket) -> Result<(), Error> {
            self.received.push(packet);
            Ok(())
        }

        fn begin_disconnect(&mut self, _reason: ReasonCode) {}
    }

    fn new_core() -> BrokerCore {
        BrokerCore::new(1, General::default(), Box::new(AllowAllBackend))
    }

    fn connect_client(core: &mut BrokerCore, id: &str) -> (ClientId, Rc<RefCell<RecordingSink>>) {
        let sink = Rc::new(RefCell::new(RecordingSink { received: Vec::new() }));
        let weak: Weak<RefCell<dyn ConnectionSink>> = Rc::downgrade(&(sink.clone() as Rc<RefCell<dyn ConnectionSink>>));
        let packet = mossmq_codec::packet::ConnectPacket {
            clean_start: true,
            keep_alive: 30,
            client_id: id.to_string(),
            will: None,
            username: None,
            password: None,
            properties: Properties::new(),
        };
        let (client_id, _connack) = core.connect(weak, packet, true).unwrap();
        (client_id, sink)
    }

    fn subscribe(core: &mut BrokerCore, client_id: &ClientId, filter: &str) {
        let packet = SubscribePacket {
            packet_id: 1,
            properties: Properties::new(),
            filters: vec![SubscribeFilter {
                filter: filter.to_string(),
                options: SubscribeOptions {
                    qos: QoS::AtMostOnce,
                    no_local: false,
                    retain_as_published: false,
                    retain_handling: RetainHandling::SendAtSubscribe,
                },
            }],
        };
        core.subscribe(client_id, &packet);
    }

    #[test]
    fn wildcard_subscription_receives_matching_publish() {
        let mut core = new_core();
        let (sub_id, sink) = connect_client(&mut core, "sub");
        subscribe(&mut core, &sub_id, "sport/+/score");

        core.publish(
            Origin::Server,
            "sport/tennis/score",
            b"15-love",
            QoS::AtMostOnce,
            false,
            Properties::new(),
        );
        core.publish(
            Origin::Server,
            "sport/tennis/player1",
            b"ignored",
            QoS::AtMostOnce,
            false,
            Properties::new(),
        );

        assert_eq!(sink.borrow().received.len(), 1);
    }

    #[test]
    fn no_local_subscription_skips_own_publish() {
        let mut core = new_core();
        let (client_id, sink) = connect_client(&mut core, "a");
        let packet = SubscribePacket {
            packet_id: 1,
            properties: Properties::new(),
            filters: vec![SubscribeFilter {
                filter: "room/1".to_string(),
                options: SubscribeOptions {
                    qos: QoS::AtMostOnce,
                    no_local: true,
                    retain_as_published: false,
                    retain_handling: RetainHandling::SendAtSubscribe,
                },
            }],
        };
        core.subscribe(&client_id, &packet);

        core.publish(
            Origin::Session(client_id.clone()),
            "room/1",
            b"hi",
            QoS::AtMostOnce,
            false,
            Properties::new(),
        );

        assert!(sink.borrow().received.is_empty());
    }

    #[test]
    fn empty_payload_retained_publish_clears_store() {
        let mut core = new_core();
        core.publish(Origin::Server, "t", b"hello", QoS::AtMostOnce, true, Properties::new());
        assert!(core.retained.get("t").is_some());
        core.publish(Origin::Server, "t", b"", QoS::AtMostOnce, true, Properties::new());
        assert!(core.retained.get("t").is_none());
    }

    /// Connects with `clean_start = false` and a non-zero
    /// `SessionExpiryInterval`, so the session (and its offline queue)
    /// survives a disconnect instead of being torn down immediately.
    fn connect_persistent_client(
        core: &mut BrokerCore,
        id: &str,
    ) -> (ClientId, Rc<RefCell<RecordingSink>>) {
        let sink = Rc::new(RefCell::new(RecordingSink { received: Vec::new() }));
        let weak: Weak<RefCell<dyn ConnectionSink>> =
            Rc::downgrade(&(sink.clone() as Rc<RefCell<dyn ConnectionSink>>));
        let mut properties = Properties::new();
        properties.push(Property::SessionExpiryInterval(3600));
        let packet = mossmq_codec::packet::ConnectPacket {
            clean_start: false,
            keep_alive: 30,
            client_id: id.to_string(),
            will: None,
            username: None,
            password: None,
            properties,
        };
        let (client_id, _connack) = core.connect(weak, packet, true).unwrap();
        (client_id, sink)
    }

    #[test]
    fn offline_session_queues_then_flushes_on_reconnect() {
        let mut core = new_core();
        let (client_id, _sink) = connect_persistent_client(&mut core, "offline-client");
        subscribe(&mut core, &client_id, "x");
        core.disconnect(&client_id, ReasonCode::Success);

        core.publish(Origin::Server, "x", b"queued", QoS::AtMostOnce, false, Properties::new());
        assert_eq!(core.sessions[&client_id].borrow().offline_queue.len(), 1);

        let (_resumed_id, new_sink) = connect_persistent_client(&mut core, "offline-client");
        core.flush_offline_queue(&client_id);
        assert_eq!(new_sink.borrow().received.len(), 1);
    }
}
