//! The `transport` module handles network communication with clients over
//! WebSockets.
//!
//! It defines the inbound command grammar, the per-connection handler, and
//! the accept loop that upgrades sockets and spawns handlers.

pub mod handler;
pub mod message;
pub mod rewind;
pub mod websocket;

pub use handler::{CloseReason, handle_connection};
pub use message::ClientCommand;
pub use websocket::{ServerContext, accept_connection, bind, start_websocket_server};

#[cfg(test)]
mod tests;
