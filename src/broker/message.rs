//! Message definitions for the broker
//!
//! A `Message` is one plain-text payload plus an optional topic filter.
//! `topic: None` means the message goes to every open connection regardless
//! of subscriptions.

use crate::broker::topic::TopicName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: Option<TopicName>,
    pub payload: String,
}

impl Message {
    /// A message delivered only to subscribers of `topic`.
    pub fn for_topic(topic: impl Into<TopicName>, payload: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            payload: payload.into(),
        }
    }

    /// A message delivered to every open connection.
    pub fn global(payload: impl Into<String>) -> Self {
        Self {
            topic: None,
            payload: payload.into(),
        }
    }
}
