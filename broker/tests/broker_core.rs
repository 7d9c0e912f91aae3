// End-to-end tests against `BrokerCore`'s public API, exercising paths
// that `broker/mod.rs`'s own unit tests don't (ACL denial, shared
// subscription load spreading, $SYS visibility, config round-trips).

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use mossmq_broker::auth::{AclBackend, AllowAllBackend};
use mossmq_broker::broker::{BrokerCore, Origin};
use mossmq_broker::config::{Config, General};
use mossmq_broker::error::Error;
use mossmq_broker::net::ConnectionSink;
use mossmq_broker::types::ClientId;

use mossmq_codec::packet::{
    ConnectPacket, ControlPacket, RetainHandling, SubscribeFilter, SubscribeOptions,
    SubscribePacket,
};
use mossmq_codec::{Properties, QoS, ReasonCode};

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

fn connect_client(core: &mut BrokerCore, id: &str) -> (ClientId, Rc<RefCell<RecordingSink>>) {
    let sink = Rc::new(RefCell::new(RecordingSink {
        received: Vec::new(),
    }));
    let weak: Weak<RefCell<dyn ConnectionSink>> =
        Rc::downgrade(&(sink.clone() as Rc<RefCell<dyn ConnectionSink>>));
    let packet = ConnectPacket {
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
fn shared_subscription_spreads_load_round_robin() {
    let mut core = BrokerCore::new(1, General::default(), Box::new(AllowAllBackend));
    let (worker_a, sink_a) = connect_client(&mut core, "worker-a");
    let (worker_b, sink_b) = connect_client(&mut core, "worker-b");
    subscribe(&mut core, &worker_a, "$share/pool/jobs");
    subscribe(&mut core, &worker_b, "$share/pool/jobs");

    for i in 0..4 {
        core.publish(
            Origin::Server,
            "jobs",
            format!("job-{i}").as_bytes(),
            QoS::AtMostOnce,
            false,
            Properties::new(),
        );
    }

    // Every publish goes to exactly one group member, alternating.
    let total = sink_a.borrow().received.len() + sink_b.borrow().received.len();
    assert_eq!(total, 4);
    assert_eq!(sink_a.borrow().received.len(), 2);
    assert_eq!(sink_b.borrow().received.len(), 2);
}

struct DenyTopic(&'static str);

impl AclBackend for DenyTopic {
    fn check(&self, _client_id: &str, topic: &str, _is_publish: bool) -> bool {
        topic != self.0
    }
}

#[test]
fn acl_backend_blocks_denied_subscription() {
    let mut core = BrokerCore::new(1, General::default(), Box::new(AllowAllBackend));
    core.set_acl_backend(Box::new(DenyTopic("secrets")));
    let (client_id, sink) = connect_client(&mut core, "c1");

    let packet = SubscribePacket {
        packet_id: 1,
        properties: Properties::new(),
        filters: vec![SubscribeFilter {
            filter: "secrets".to_string(),
            options: SubscribeOptions {
                qos: QoS::AtMostOnce,
                no_local: false,
                retain_as_published: false,
                retain_handling: RetainHandling::SendAtSubscribe,
            },
        }],
    };
    let reason_codes = core.subscribe(&client_id, &packet);
    assert_eq!(reason_codes, vec![ReasonCode::NotAuthorized]);

    core.publish(
        Origin::Server,
        "secrets",
        b"classified",
        QoS::AtMostOnce,
        false,
        Properties::new(),
    );
    assert!(sink.borrow().received.is_empty());
}

#[test]
fn sys_status_is_retained_and_visible_to_late_subscribers() {
    // A zero interval means `publish_sys_status` fires on the very next tick.
    let general: General = toml::from_str("sys_interval_secs = 0").unwrap();

    let mut core = BrokerCore::new(1, general, Box::new(AllowAllBackend));
    core.cleanup_operations();

    let (client_id, sink) = connect_client(&mut core, "observer");
    subscribe(&mut core, &client_id, "$SYS/broker/clients/connected");
    assert_eq!(sink.borrow().received.len(), 1);
}

#[test]
fn empty_config_file_round_trips_through_validate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mossmq.toml");
    std::fs::write(&path, "").unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert!(config.validate(false).is_ok());
    assert_eq!(config.listeners().len(), 1);
}

#[test]
fn config_rejects_mqtts_listener_without_certs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mossmq.toml");
    std::fs::write(
        &path,
        "[[listeners]]\naddress = \"0.0.0.0:8883\"\nprotocol = \"mqtts\"\n",
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert!(config.validate(false).is_err());
}
