//! Connection registry
//!
//! The registry is the authoritative set of live connections, keyed by id.
//! It is a sharded concurrent map, so handlers can add and remove their
//! entries while publishers take snapshots for broadcasting. A snapshot
//! clones the `Arc`s out and releases every shard before it is returned;
//! nothing holds the table locked while frames are being sent.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::client::{Connection, ConnectionId};
use crate::utils::error::RegistryError;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection. Ids must be unique.
    pub fn add(&self, connection: Arc<Connection>) -> Result<(), RegistryError> {
        match self.connections.entry(connection.id.clone()) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateId(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(connection);
                Ok(())
            }
        }
    }

    /// Remove a connection. Returns `true` only for the call that actually
    /// removed the entry.
    pub fn remove(&self, id: &str) -> bool {
        self.connections.remove(id).is_some()
    }

    /// Point-in-time view of every registered connection, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        let mut connections: Vec<_> = self
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        connections.sort_by_key(|conn| conn.connected_at);
        connections
    }

    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
