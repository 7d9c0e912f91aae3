// The selector loop (spec §4.4, §9 "Selector attachment polymorphism").
// One `mio::Poll` owns every registered socket: listeners, clients and
// cluster peers. Each tick drains ready sockets into decoded packets or
// frames, hands them to `BrokerCore`, then runs `cleanup_operations`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use mio::{Events, Interest, Poll, Token};

use mossmq_codec::packet::{
    AckPacket, AuthPacket, ConnAckPacket, ConnectPacket, ControlPacket, DisconnectPacket,
    PublishPacket, SubAckPacket, SubscribePacket, UnsubAckPacket, UnsubscribePacket,
};
use mossmq_codec::{Properties, Property, PropertyType, QoS, ReasonCode};

use crate::auth::{AuthBackend, AuthRequest, Decision};
use crate::broker::{BrokerCore, Origin};
use crate::config::Config;
use crate::error::Error;
use crate::net::cluster_conn::{ClusterConnection, PeerFrame, PeerSink};
use crate::net::connection::{ClientConnection, ConnState};
use crate::net::listener::Acceptor;
use crate::net::transport::Transport;
use crate::net::ConnectionSink;
use crate::types::{ClientId, NodeId};

struct ClientSlot {
    conn: Rc<RefCell<ClientConnection>>,
    acceptor_idx: usize,
    allow_empty_client_id: bool,
    /// Set once `BrokerCore::disconnect` has been called for this socket,
    /// so a subsequent teardown (write failure, EOF) doesn't double-fire
    /// will delivery / session bookkeeping.
    disconnected: bool,
}

/// Owns the event loop: registered sockets, their per-connection state and
/// the `BrokerCore` they feed. `run` never returns except on a fatal `Poll`
/// failure.
pub struct Selector {
    poll: Poll,
    events: Events,
    acceptors: Vec<Acceptor>,
    conn_counts: Vec<usize>,
    clients: HashMap<Token, ClientSlot>,
    peers: HashMap<Token, Rc<RefCell<ClusterConnection>>>,
    next_token_value: usize,
    tick: Duration,
    core: BrokerCore,
}

impl Selector {
    /// # Errors
    /// Returns an error if the poller can't be created or a configured
    /// listener address can't be bound.
    pub fn new(config: &Config, node_id: NodeId, auth_backend: Box<dyn AuthBackend>) -> Result<Self, Error> {
        let poll = Poll::new()?;
        let mut acceptors = Vec::with_capacity(config.listeners().len());
        for (idx, listener_cfg) in config.listeners().iter().enumerate() {
            let token = Token(idx);
            let mut acceptor = Acceptor::bind(token, listener_cfg)?;
            poll.registry()
                .register(&mut acceptor.listener, token, Interest::READABLE)?;
            info!("listening on {} ({:?})", listener_cfg.address(), listener_cfg.protocol());
            acceptors.push(acceptor);
        }
        let conn_counts = vec![0; acceptors.len()];
        let next_token_value = acceptors.len();
        let tick = Duration::from_millis(config.general().select_tick_ms());
        let core = BrokerCore::new(node_id, config.general().clone(), auth_backend);

        Ok(Selector {
            poll,
            events: Events::with_capacity(1024),
            acceptors,
            conn_counts,
            clients: HashMap::new(),
            peers: HashMap::new(),
            next_token_value,
            tick,
            core,
        })
    }

    #[must_use]
    pub fn core(&self) -> &BrokerCore {
        &self.core
    }

    /// Registers a socket already admitted as a cluster peer connection
    /// (spec §3: cluster node discovery is "a connection factory yielding
    /// peer sockets already admitted to the core's selector"). The caller
    /// is responsible for the handshake that established `node_id`.
    ///
    /// # Errors
    /// Returns an error if the socket can't be registered with the poller.
    pub fn attach_peer(&mut self, transport: Transport, node_id: NodeId) -> Result<(), Error> {
        let token = self.next_token();
        let mut conn = ClusterConnection::new(token, transport);
        self.poll
            .registry()
            .register(conn.raw_mut(), token, Interest::READABLE | Interest::WRITABLE)?;
        conn.node_id = Some(node_id);
        let conn_rc = Rc::new(RefCell::new(conn));
        let sink: Weak<RefCell<dyn PeerSink>> =
            Rc::downgrade(&(conn_rc.clone() as Rc<RefCell<dyn PeerSink>>));
        self.core.cluster_mut().add_peer(node_id, sink);
        self.peers.insert(token, conn_rc);
        info!("attached cluster peer {node_id}");
        Ok(())
    }

    /// Runs the event loop until `Poll::poll` returns a fatal error.
    ///
    /// # Errors
    /// Returns an error if the underlying `poll` syscall fails.
    pub fn run(&mut self) -> Result<(), Error> {
        loop {
            self.poll.poll(&mut self.events, Some(self.tick))?;

            let ready: Vec<(Token, bool, bool)> = self
                .events
                .iter()
                .map(|event| (event.token(), event.is_readable(), event.is_writable()))
                .collect();
            for (token, readable, writable) in ready {
                self.dispatch_ready(token, readable, writable)?;
            }

            self.sweep_timeouts();
            self.core.cleanup_operations();
        }
    }

    fn next_token(&mut self) -> Token {
        let token = Token(self.next_token_value);
        self.next_token_value += 1;
        token
    }

    fn dispatch_ready(&mut self, token: Token, readable: bool, writable: bool) -> Result<(), Error> {
        if token.0 < self.acceptors.len() {
            if readable {
                self.handle_acceptor_ready(token.0);
            }
        } else if self.clients.contains_key(&token) {
            self.handle_client_ready(token, readable, writable)?;
        } else if self.peers.contains_key(&token) {
            self.handle_peer_ready(token, readable, writable);
        }
        Ok(())
    }

    // ---- acceptor --------------------------------------------------------

    fn handle_acceptor_ready(&mut self, idx: usize) {
        let max = self.acceptors[idx].maximum_connections;
        if max != 0 && self.conn_counts[idx] >= max {
            debug!("listener {idx} at capacity, not accepting");
            return;
        }
        match self.acceptors[idx].accept() {
            Ok((transport, addr)) => {
                let token = self.next_token();
                let mut conn = ClientConnection::new(token, transport, self.acceptors[idx].connect_timeout);
                if let Err(err) =
                    self.poll
                        .registry()
                        .register(conn.raw_mut(), token, Interest::READABLE | Interest::WRITABLE)
                {
                    warn!("failed to register accepted connection from {addr}: {err}");
                    return;
                }
                info!("accepted connection from {addr} on listener {idx}");
                self.clients.insert(
                    token,
                    ClientSlot {
                        conn: Rc::new(RefCell::new(conn)),
                        acceptor_idx: idx,
                        allow_empty_client_id: self.acceptors[idx].allow_empty_client_id,
                        disconnected: false,
                    },
                );
                self.conn_counts[idx] += 1;
            }
            Err(err) => debug!("accept on listener {idx}: {err}"),
        }
    }

    // ---- client sockets ----------------------------------------------------

    fn handle_client_ready(&mut self, token: Token, readable: bool, writable: bool) -> Result<(), Error> {
        let Some(conn_rc) = self.clients.get(&token).map(|slot| slot.conn.clone()) else {
            return Ok(());
        };

        if writable && conn_rc.borrow_mut().flush_writes().is_err() {
            self.teardown_client(token);
            return Ok(());
        }

        if readable {
            // Read the packets out before dispatching any of them: dispatch can
            // turn around and enqueue a reply on this same connection, which
            // would deadlock against a `RefMut` still held by this match.
            let read_result = conn_rc.borrow_mut().poll_read();
            match read_result {
                Ok(packets) => {
                    for packet in packets {
                        self.dispatch_client_packet(token, packet);
                        if !self.clients.contains_key(&token) {
                            return Ok(());
                        }
                    }
                }
                Err(err) => {
                    debug!("client read failed: {err}");
                    self.teardown_client(token);
                    return Ok(());
                }
            }
        }

        let should_close = self.clients.get(&token).is_some_and(|slot| {
            let conn = slot.conn.borrow();
            conn.state == ConnState::Disconnecting && !conn.has_pending_writes()
        });
        if should_close {
            self.teardown_client(token);
        }
        Ok(())
    }

    fn dispatch_client_packet(&mut self, token: Token, packet: ControlPacket) {
        match packet {
            ControlPacket::Connect(connect) => self.handle_connect(token, connect),
            ControlPacket::Publish(publish) => self.handle_publish(token, publish),
            ControlPacket::PubAck(ack) => self.handle_puback(token, &ack),
            ControlPacket::PubRec(ack) => self.handle_pubrec(token, &ack),
            ControlPacket::PubRel(ack) => self.handle_pubrel(token, &ack),
            ControlPacket::PubComp(ack) => self.handle_pubcomp(token, &ack),
            ControlPacket::Subscribe(sub) => self.handle_subscribe(token, &sub),
            ControlPacket::Unsubscribe(unsub) => self.handle_unsubscribe(token, &unsub),
            ControlPacket::PingReq => self.send_to_client(token, ControlPacket::PingResp),
            ControlPacket::Disconnect(disconnect) => self.handle_disconnect(token, &disconnect),
            ControlPacket::Auth(auth) => {
                let method = match auth.properties.find(PropertyType::AuthenticationMethod) {
                    Some(Property::AuthenticationMethod(m)) => Some(m.clone()),
                    _ => None,
                };
                let data = match auth.properties.find(PropertyType::AuthenticationData) {
                    Some(Property::AuthenticationData(d)) => Some(d.clone()),
                    _ => None,
                };
                self.handle_auth(token, method, data);
            }
            other => {
                warn!("unexpected {:?} before CONNECT or out of sequence", other.packet_type());
                self.close_client(token, ReasonCode::ProtocolError);
            }
        }
    }

    fn handle_connect(&mut self, token: Token, connect: ConnectPacket) {
        let Some((conn_rc, allow_empty)) = self
            .clients
            .get(&token)
            .map(|slot| (slot.conn.clone(), slot.allow_empty_client_id))
        else {
            return;
        };

        if conn_rc.borrow().state != ConnState::AwaitingConnect {
            self.close_client(token, ReasonCode::ProtocolError);
            return;
        }

        let keep_alive_secs = connect.keep_alive;
        let weak: Weak<RefCell<dyn ConnectionSink>> =
            Rc::downgrade(&(conn_rc.clone() as Rc<RefCell<dyn ConnectionSink>>));

        match self.core.connect(weak, connect, allow_empty) {
            Ok((client_id, connack)) => {
                let topic_alias_out_maximum = self.core.general().topic_alias_maximum();
                let effective_keep_alive = self
                    .core
                    .general()
                    .server_keep_alive()
                    .unwrap_or(keep_alive_secs);
                {
                    let mut conn = conn_rc.borrow_mut();
                    conn.client_id = Some(client_id.clone());
                    conn.mark_connected(
                        Duration::from_secs(u64::from(effective_keep_alive)),
                        topic_alias_out_maximum,
                    );
                }
                info!("client {client_id} connected");
                self.send_to_client(token, ControlPacket::ConnAck(connack));
                self.core.flush_offline_queue(&client_id);
            }
            Err(err) => {
                warn!("CONNECT rejected: {err}");
                let connack = ConnAckPacket {
                    session_present: false,
                    reason_code: connect_failure_reason(&err),
                    properties: Properties::new(),
                };
                self.send_to_client(token, ControlPacket::ConnAck(connack));
                if let Some(slot) = self.clients.get_mut(&token) {
                    slot.disconnected = true;
                }
                conn_rc.borrow_mut().state = ConnState::Disconnecting;
            }
        }
    }

    fn handle_publish(&mut self, token: Token, publish: PublishPacket) {
        let Some(client_id) = self.connected_client_id(token) else {
            self.close_client(token, ReasonCode::ProtocolError);
            return;
        };

        let topic = {
            let Some(slot) = self.clients.get(&token) else { return };
            let mut conn = slot.conn.borrow_mut();
            match publish.topic_alias() {
                Some(alias) => conn.resolve_incoming_alias(alias, &publish.topic_name),
                None => Some(publish.topic_name.clone()),
            }
        };
        let Some(topic) = topic else {
            self.close_client(token, ReasonCode::TopicAliasInvalid);
            return;
        };

        match publish.qos {
            QoS::AtMostOnce => {
                self.core.publish(
                    Origin::Session(client_id),
                    &topic,
                    &publish.payload,
                    publish.qos,
                    publish.retain,
                    publish.properties,
                );
            }
            QoS::AtLeastOnce => {
                let Some(packet_id) = publish.packet_id else {
                    self.close_client(token, ReasonCode::ProtocolError);
                    return;
                };
                self.core.publish(
                    Origin::Session(client_id),
                    &topic,
                    &publish.payload,
                    publish.qos,
                    publish.retain,
                    publish.properties,
                );
                self.send_to_client(
                    token,
                    ControlPacket::PubAck(AckPacket {
                        packet_id,
                        reason_code: ReasonCode::Success,
                        properties: Properties::new(),
                    }),
                );
            }
            QoS::ExactlyOnce => {
                let Some(packet_id) = publish.packet_id else {
                    self.close_client(token, ReasonCode::ProtocolError);
                    return;
                };
                let first_delivery = self.core.handle_qos2_publish(&client_id, packet_id);
                if first_delivery {
                    self.core.publish(
                        Origin::Session(client_id),
                        &topic,
                        &publish.payload,
                        publish.qos,
                        publish.retain,
                        publish.properties,
                    );
                }
                self.send_to_client(
                    token,
                    ControlPacket::PubRec(AckPacket {
                        packet_id,
                        reason_code: ReasonCode::Success,
                        properties: Properties::new(),
                    }),
                );
            }
        }
    }

    fn handle_subscribe(&mut self, token: Token, packet: &SubscribePacket) {
        let Some(client_id) = self.connected_client_id(token) else {
            self.close_client(token, ReasonCode::ProtocolError);
            return;
        };
        let reason_codes = self.core.subscribe(&client_id, packet);
        self.send_to_client(
            token,
            ControlPacket::SubAck(SubAckPacket {
                packet_id: packet.packet_id,
                properties: Properties::new(),
                reason_codes,
            }),
        );
    }

    fn handle_unsubscribe(&mut self, token: Token, packet: &UnsubscribePacket) {
        let Some(client_id) = self.connected_client_id(token) else {
            self.close_client(token, ReasonCode::ProtocolError);
            return;
        };
        let reason_codes = self.core.unsubscribe(&client_id, packet);
        self.send_to_client(
            token,
            ControlPacket::UnsubAck(UnsubAckPacket {
                packet_id: packet.packet_id,
                properties: Properties::new(),
                reason_codes,
            }),
        );
    }

    fn handle_puback(&mut self, token: Token, ack: &AckPacket) {
        if let Some(client_id) = self.connected_client_id(token) {
            self.core.handle_puback(&client_id, ack);
        }
    }

    fn handle_pubrec(&mut self, token: Token, ack: &AckPacket) {
        let Some(client_id) = self.connected_client_id(token) else { return };
        if let Some(pubrel) = self.core.handle_pubrec(&client_id, ack) {
            self.send_to_client(token, ControlPacket::PubRel(pubrel));
        }
    }

    fn handle_pubrel(&mut self, token: Token, ack: &AckPacket) {
        let Some(client_id) = self.connected_client_id(token) else { return };
        self.core.handle_pubrel(&client_id, ack.packet_id);
        self.send_to_client(
            token,
            ControlPacket::PubComp(AckPacket {
                packet_id: ack.packet_id,
                reason_code: ReasonCode::Success,
                properties: Properties::new(),
            }),
        );
    }

    fn handle_pubcomp(&mut self, token: Token, ack: &AckPacket) {
        if let Some(client_id) = self.connected_client_id(token) {
            self.core.handle_pubcomp(&client_id, ack);
        }
    }

    fn handle_auth(&mut self, token: Token, method: Option<String>, data: Option<Vec<u8>>) {
        let Some(client_id) = self.connected_client_id(token) else {
            self.close_client(token, ReasonCode::ProtocolError);
            return;
        };
        let decision = self.core.authenticate(&AuthRequest {
            client_id: client_id.as_str(),
            username: None,
            password: None,
            auth_method: method.as_deref(),
            auth_data: data.as_deref(),
        });
        match decision {
            Decision::Accept => {
                self.send_to_client(
                    token,
                    ControlPacket::Auth(AuthPacket {
                        reason_code: ReasonCode::Success,
                        properties: Properties::new(),
                    }),
                );
            }
            Decision::AcceptWithChallenge(challenge) => {
                let mut properties = Properties::new();
                if let Some(method) = method {
                    properties.push(Property::AuthenticationMethod(method));
                }
                properties.push(Property::AuthenticationData(challenge));
                self.send_to_client(
                    token,
                    ControlPacket::Auth(AuthPacket {
                        reason_code: ReasonCode::ContinueAuthentication,
                        properties,
                    }),
                );
            }
            Decision::Deny => self.close_client(token, ReasonCode::NotAuthorized),
        }
    }

    fn handle_disconnect(&mut self, token: Token, packet: &DisconnectPacket) {
        if let Some(client_id) = self.connected_client_id(token) {
            self.core.disconnect(&client_id, packet.reason_code);
        }
        if let Some(slot) = self.clients.get_mut(&token) {
            slot.disconnected = true;
        }
        self.teardown_client(token);
    }

    fn connected_client_id(&self, token: Token) -> Option<ClientId> {
        self.clients.get(&token).and_then(|slot| {
            let conn = slot.conn.borrow();
            if conn.state == ConnState::Connected {
                conn.client_id.clone()
            } else {
                None
            }
        })
    }

    fn send_to_client(&mut self, token: Token, packet: ControlPacket) {
        let Some(slot) = self.clients.get(&token) else { return };
        if slot.conn.borrow_mut().enqueue(packet).is_err() {
            warn!("failed to enqueue packet (token {token:?})");
        }
    }

    fn close_client(&mut self, token: Token, reason: ReasonCode) {
        let Some(conn_rc) = self.clients.get(&token).map(|slot| slot.conn.clone()) else {
            return;
        };
        let client_id = conn_rc.borrow().client_id.clone();
        if let Some(client_id) = &client_id {
            self.core.disconnect(client_id, reason);
        }
        if let Some(slot) = self.clients.get_mut(&token) {
            slot.disconnected = true;
        }
        {
            let mut conn = conn_rc.borrow_mut();
            conn.begin_disconnect(reason);
            let _ = conn.flush_writes();
        }
        if !conn_rc.borrow().has_pending_writes() {
            self.teardown_client(token);
        }
    }

    fn teardown_client(&mut self, token: Token) {
        let Some(slot) = self.clients.remove(&token) else { return };
        if !slot.disconnected {
            if let Some(client_id) = slot.conn.borrow().client_id.clone() {
                self.core.disconnect(&client_id, ReasonCode::UnspecifiedError);
            }
        }
        let _ = self.poll.registry().deregister(slot.conn.borrow_mut().raw_mut());
        if let Some(count) = self.conn_counts.get_mut(slot.acceptor_idx) {
            *count = count.saturating_sub(1);
        }
        debug!("closed connection (token {token:?})");
    }

    // ---- cluster peer sockets -----------------------------------------------

    fn handle_peer_ready(&mut self, token: Token, readable: bool, writable: bool) {
        let Some(conn_rc) = self.peers.get(&token).cloned() else { return };

        if writable && conn_rc.borrow_mut().flush_writes().is_err() {
            self.teardown_peer(token);
            return;
        }

        if readable {
            let read_result = conn_rc.borrow_mut().poll_read();
            match read_result {
                Ok(frames) => {
                    let node_id = conn_rc.borrow().node_id;
                    for frame in frames {
                        self.dispatch_peer_frame(node_id, frame);
                    }
                }
                Err(err) => {
                    debug!("peer read failed: {err}");
                    self.teardown_peer(token);
                }
            }
        }
    }

    fn dispatch_peer_frame(&mut self, node_id: Option<NodeId>, frame: PeerFrame) {
        let Some(node_id) = node_id else { return };
        match frame {
            PeerFrame::InterestAdd(filter) => self.core.cluster_mut().record_interest(node_id, filter),
            PeerFrame::InterestRemove(filter) => {
                self.core.cluster_mut().forget_interest(node_id, &filter);
            }
            PeerFrame::Publish {
                origin_node,
                topic,
                payload,
                qos,
                retain,
                properties,
            } => {
                self.core
                    .publish(Origin::Peer(origin_node), &topic, &payload, qos, retain, properties);
            }
        }
    }

    fn teardown_peer(&mut self, token: Token) {
        let Some(conn_rc) = self.peers.remove(&token) else { return };
        if let Some(node_id) = conn_rc.borrow().node_id {
            self.core.cluster_mut().remove_peer(node_id);
        }
        let _ = self.poll.registry().deregister(conn_rc.borrow_mut().raw_mut());
    }

    // ---- timeouts ----------------------------------------------------------

    fn sweep_timeouts(&mut self) {
        let now = Instant::now();
        let mut connect_timed_out = Vec::new();
        let mut keep_alive_timed_out = Vec::new();
        for (&token, slot) in &self.clients {
            let conn = slot.conn.borrow();
            if conn.connect_timed_out(now) {
                connect_timed_out.push(token);
            } else if conn.keep_alive_expired(now) {
                keep_alive_timed_out.push(token);
            }
        }
        for token in connect_timed_out {
            debug!("connect timeout (token {token:?})");
            if let Some(slot) = self.clients.get_mut(&token) {
                slot.disconnected = true;
            }
            self.teardown_client(token);
        }
        for token in keep_alive_timed_out {
            debug!("keep-alive timeout (token {token:?})");
            self.close_client(token, ReasonCode::KeepAliveTimeout);
        }
    }
}

/// Best-effort mapping from a `connect()` rejection back to a CONNACK reason
/// code; `BrokerCore::connect` only carries a message, not a reason, since
/// its `Error` type is shared with the rest of the broker.
fn connect_failure_reason(err: &Error) -> ReasonCode {
    let message = err.to_string();
    if message.contains("empty ClientID") {
        ReasonCode::ClientIdentifierNotValid
    } else if message.contains("authentication denied") {
        ReasonCode::NotAuthorized
    } else {
        ReasonCode::UnspecifiedError
    }
}
