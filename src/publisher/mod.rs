//! Periodic publishers
//!
//! A publisher is a timer-driven producer: every `interval` it builds one
//! message and hands it to the [`BroadcastEngine`]. Two ship with the server:
//! - [`TimePublisher`] sends the UTC time to subscribers of `TIME`
//! - [`CpuPublisher`] sends the global CPU usage to every connection,
//!   subscribed or not
//!
//! The first broadcast happens one full interval after start, and a late
//! tick delays the schedule instead of bursting to catch up.

pub mod cpu;
pub mod time;

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::broker::{BroadcastEngine, Message};

pub use cpu::{CpuPublisher, CpuSampler, SysinfoSampler};
pub use time::{TIME_TOPIC, TimePublisher};

pub trait Publisher: Send + 'static {
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// Topic filter for every message, `None` for all connections.
    fn topic(&self) -> Option<&str>;

    /// Called once before the first tick.
    fn warm_up(&mut self) {}

    fn next_message(&mut self) -> String;

    /// The next payload paired with this publisher's topic filter.
    fn build_message(&mut self) -> Message {
        let payload = self.next_message();
        match self.topic() {
            Some(topic) => Message::for_topic(topic, payload),
            None => Message::global(payload),
        }
    }
}

/// Drive `publisher` until `shutdown` is cancelled.
pub async fn run_publisher<P: Publisher>(
    mut publisher: P,
    engine: BroadcastEngine,
    shutdown: CancellationToken,
) {
    publisher.warm_up();
    let period = publisher.interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(publisher = publisher.name(), ?period, "publisher started");

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let message = publisher.build_message();
                let report = engine.publish(&message).await;
                info!(
                    publisher = publisher.name(),
                    recipients = report.attempted,
                    failed = report.failed.len(),
                    "{}",
                    message.payload
                );
            }
        }
    }
    info!(publisher = publisher.name(), "publisher stopped");
}
