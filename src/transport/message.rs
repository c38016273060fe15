//! Inbound command grammar.
//!
//! Clients speak plain text. The only command is `SUBSCRIBE:<topic>`, where
//! the topic is everything after the first `:` with surrounding whitespace
//! trimmed. Anything else, including a blank topic, is ignored.

use crate::broker::topic::{TopicName, normalize};

pub const SUBSCRIBE_PREFIX: &str = "SUBSCRIBE:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Subscribe(TopicName),
    Ignore,
}

impl ClientCommand {
    /// Parse one text frame. Never fails.
    pub fn parse(frame: &str) -> Self {
        frame
            .strip_prefix(SUBSCRIBE_PREFIX)
            .and_then(normalize)
            .map_or(Self::Ignore, |topic| Self::Subscribe(topic.to_string()))
    }
}
