// Retained-message store: exact topic-name -> last retained publish
// (spec §3, §4.5). A retain=true PUBLISH with an empty payload erases the
// entry for its topic rather than storing an empty message.

use std::collections::HashMap;
use std::time::Instant;

use mossmq_codec::{Properties, QoS};

#[derive(Clone, Debug)]
pub struct RetainedMessage {
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub properties: Properties,
    /// Absolute deadline derived from a `MessageExpiryInterval` property,
    /// if the publisher set one.
    pub expires_at: Option<Instant>,
}

#[derive(Default)]
pub struct RetainedStore {
    entries: HashMap<String, RetainedMessage>,
}

impl RetainedStore {
    #[must_use]
    pub fn new() -> Self {
        RetainedStore::default()
    }

    pub fn publish(&mut self, topic: &str, message: RetainedMessage) {
        if message.payload.is_empty() {
            self.entries.remove(topic);
        } else {
            self.entries.insert(topic.to_string(), message);
        }
    }

    #[must_use]
    pub fn get(&self, topic: &str) -> Option<&RetainedMessage> {
        self.entries.get(topic)
    }

    /// All retained messages whose topic matches `filter`, used when a new
    /// subscription's retain-handling option requests replay.
    #[must_use]
    pub fn matching(&self, matcher: impl Fn(&str) -> bool) -> Vec<(&str, &RetainedMessage)> {
        self.entries
            .iter()
            .filter(|(topic, _)| matcher(topic))
            .map(|(topic, message)| (topic.as_str(), message))
            .collect()
    }

    pub fn expire(&mut self, now: Instant) {
        self.entries
            .retain(|_, message| message.expires_at.is_none_or(|deadline| now < deadline));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(payload: &[u8]) -> RetainedMessage {
        RetainedMessage {
            payload: payload.to_vec(),
            qos: QoS::AtMostOnce,
            properties: Properties::new(),
            expires_at: None,
        }
    }

    #[test]
    fn empty_payload_deletes_existing_retained_message() {
        let mut store = RetainedStore::new();
        store.publish("t", message(b"hello"));
        assert!(store.get("t").is_some());
        store.publish("t", message(b""));
        assert!(store.get("t").is_none());
    }

    #[test]
    fn publish_replaces_prior_entry() {
        let mut store = RetainedStore::new();
        store.publish("t", message(b"first"));
        store.publish("t", message(b"second"));
        assert_eq!(store.get("t").unwrap().payload, b"second");
    }
}
