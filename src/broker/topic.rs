//! Topic management
//!
//! Topics are flat, case-sensitive names. A connection's interest in topics
//! is a `SubscriptionSet`: a concurrent set so the broadcast engine can read
//! it from any task while the owning handler inserts into it. Duplicate
//! subscriptions are a no-op.

use dashmap::DashSet;

pub type TopicName = String;

/// Trim a raw topic. Returns `None` when nothing is left.
pub fn normalize(raw: &str) -> Option<&str> {
    let topic = raw.trim();
    (!topic.is_empty()).then_some(topic)
}

#[derive(Debug, Default)]
pub struct SubscriptionSet {
    topics: DashSet<TopicName>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self {
            topics: DashSet::new(),
        }
    }

    /// Add a topic. Returns `false` if it was already present.
    pub fn insert(&self, topic: &str) -> bool {
        if self.topics.contains(topic) {
            return false;
        }
        self.topics.insert(topic.to_string())
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Current topics, sorted.
    pub fn topics(&self) -> Vec<TopicName> {
        let mut topics: Vec<_> = self.topics.iter().map(|t| t.key().clone()).collect();
        topics.sort();
        topics
    }
}
