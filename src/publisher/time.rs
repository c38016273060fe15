use std::time::Duration;

use chrono::{SecondsFormat, Utc};

use super::Publisher;

pub const TIME_TOPIC: &str = "TIME";

/// Publishes `TIME: <RFC 3339 UTC>` to subscribers of [`TIME_TOPIC`].
#[derive(Debug, Clone)]
pub struct TimePublisher {
    interval: Duration,
}

impl TimePublisher {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Publisher for TimePublisher {
    fn name(&self) -> &'static str {
        "time"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn topic(&self) -> Option<&str> {
        Some(TIME_TOPIC)
    }

    fn next_message(&mut self) -> String {
        format!(
            "TIME: {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
        )
    }
}
