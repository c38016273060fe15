//! # tickcast
//!
//! `tickcast` is a small WebSocket fan-out server. Clients connect, declare
//! interest in topics with `SUBSCRIBE:<topic>`, and receive messages produced
//! by periodic publishers: the current UTC time for `TIME` subscribers, and
//! the host's CPU usage for everyone.
//!
//! ## Core Modules
//!
//! - `broker`: the connection registry, subscription sets and the broadcast engine.
//! - `client`: the server-side state of one connection.
//! - `config`: layered configuration loading.
//! - `publisher`: timer-driven producers of TIME and CPU messages.
//! - `transport`: the WebSocket accept loop, command parsing and per-connection handler.
//! - `utils`: errors, logging and shutdown coordination.

pub mod broker;
pub mod client;
pub mod config;
pub mod publisher;
pub mod transport;
pub mod utils;
