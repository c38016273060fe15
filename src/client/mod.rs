//! The `client` module defines the server-side view of one connected peer.
//!
//! It provides the `Connection` struct, which carries the connection's
//! identity, its outbound queue, its lifecycle state and its subscriptions.

pub mod connection;
pub use connection::{Connection, ConnectionId, ConnectionState};
