// Subscription trie: a prefix tree over `/`-separated topic segments,
// giving O(segments × fanout-of-wildcards) matching instead of a linear
// scan over every subscription (spec §3).

use std::collections::HashMap;

use crate::types::ClientId;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberKey {
    pub client_id: ClientId,
    pub share_name: Option<String>,
}

#[derive(Default)]
struct Node {
    children: HashMap<String, Node>,
    /// Subscribers whose filter terminates at exactly this node. The
    /// subscription's own options/identifier live on the `Session`; the
    /// trie only needs enough to find *which* sessions matched.
    subscribers: Vec<SubscriberKey>,
}

impl Node {
    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.subscribers.is_empty()
    }
}

/// Segment-indexed trie keyed on a filter's literal/`+`/`#` path segments.
#[derive(Default)]
pub struct SubscriptionTrie {
    root: Node,
}

impl SubscriptionTrie {
    #[must_use]
    pub fn new() -> Self {
        SubscriptionTrie::default()
    }

    pub fn insert(&mut self, filter: &str, subscriber: SubscriberKey) {
        let mut node = &mut self.root;
        for segment in filter.split('/') {
            node = node.children.entry(segment.to_string()).or_default();
        }
        if let Some(existing) = node
            .subscribers
            .iter_mut()
            .find(|s| **s == subscriber)
        {
            *existing = subscriber;
        } else {
            node.subscribers.push(subscriber);
        }
    }

    /// Removes `subscriber` from `filter`'s node, pruning now-empty nodes
    /// back up toward the root.
    pub fn remove(&mut self, filter: &str, subscriber: &SubscriberKey) {
        let segments: Vec<&str> = filter.split('/').collect();
        Self::remove_rec(&mut self.root, &segments, subscriber);
    }

    fn remove_rec(node: &mut Node, segments: &[&str], subscriber: &SubscriberKey) -> bool {
        if segments.is_empty() {
            node.subscribers.retain(|s| s != subscriber);
        } else {
            let (head, rest) = (segments[0], &segments[1..]);
            if let Some(child) = node.children.get_mut(head) {
                if Self::remove_rec(child, rest, subscriber) {
                    node.children.remove(head);
                }
            }
        }
        node.is_empty()
    }

    /// All subscribers whose filter matches `topic`, per MQTT 5 §4.7: `+`
    /// matches one segment, `#` matches zero-or-more trailing segments,
    /// and a `$`-prefixed topic is invisible to a root-level wildcard.
    #[must_use]
    pub fn matches(&self, topic: &str) -> Vec<SubscriberKey> {
        let segments: Vec<&str> = topic.split('/').collect();
        let root_is_dollar = topic.starts_with('$');
        let mut out = Vec::new();
        Self::walk(&self.root, &segments, root_is_dollar, true, &mut out);
        out
    }

    fn walk(
        node: &Node,
        segments: &[&str],
        root_is_dollar: bool,
        at_root: bool,
        out: &mut Vec<SubscriberKey>,
    ) {
        if segments.is_empty() {
            out.extend(node.subscribers.iter().cloned());
            return;
        }
        let (head, rest) = (segments[0], &segments[1..]);

        if let Some(child) = node.children.get(head) {
            Self::walk(child, rest, root_is_dollar, false, out);
        }
        if !(at_root && root_is_dollar) {
            if let Some(child) = node.children.get("+") {
                Self::walk(child, rest, root_is_dollar, false, out);
            }
            if let Some(child) = node.children.get("#") {
                out.extend(child.subscribers.iter().cloned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> SubscriberKey {
        SubscriberKey {
            client_id: ClientId::new(id.to_string()),
            share_name: None,
        }
    }

    #[test]
    fn plus_wildcard_matches_single_segment() {
        let mut trie = SubscriptionTrie::new();
        trie.insert("sport/+/score", key("sub1"));
        assert_eq!(trie.matches("sport/tennis/score"), vec![key("sub1")]);
        assert!(trie.matches("sport/tennis/player1").is_empty());
    }

    #[test]
    fn hash_wildcard_matches_zero_or_more_trailing_segments() {
        let mut trie = SubscriptionTrie::new();
        trie.insert("a/#", key("sub1"));
        assert_eq!(trie.matches("a"), vec![key("sub1")]);
        assert_eq!(trie.matches("a/b/c"), vec![key("sub1")]);
    }

    #[test]
    fn dollar_topics_excluded_from_root_wildcards() {
        let mut trie = SubscriptionTrie::new();
        trie.insert("#", key("sub1"));
        trie.insert("+/broker", key("sub2"));
        trie.insert("$SYS/#", key("sub3"));
        assert!(trie.matches("$SYS/broker/uptime").is_empty());
        assert_eq!(trie.matches("$SYS/broker"), vec![key("sub3")]);
    }

    #[test]
    fn remove_prunes_empty_nodes() {
        let mut trie = SubscriptionTrie::new();
        trie.insert("a/b", key("sub1"));
        trie.remove("a/b", &key("sub1"));
        assert!(trie.matches("a/b").is_empty());
        assert!(trie.root.children.is_empty());
    }
}
