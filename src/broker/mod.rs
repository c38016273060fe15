//! The broker owns connection bookkeeping and message fan-out.
//!
//! - `registry`: the live-connection table
//! - `topic`: topic names and per-connection subscription sets
//! - `engine`: topic-filtered, fault-isolated broadcasting
//! - `message`: the payload + optional topic pair publishers hand to the engine

pub mod engine;
pub mod message;
pub mod registry;
pub mod topic;

pub use engine::{BroadcastEngine, BroadcastReport};
pub use message::Message;
pub use registry::ConnectionRegistry;
pub use topic::SubscriptionSet;
