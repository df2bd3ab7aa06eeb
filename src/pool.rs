//! Connection pool: a lazy, double-checked map of node name -> live
//! connection. A `RwLock` guards the map itself so the pool tolerates
//! being used from real OS threads; it never guards the connection's
//! use, so two callers touching different nodes never contend.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use log::trace;

use crate::adapter::{AdapterConnection, ConnectionAdapter};
use crate::error::ClusterError;
use crate::topology::NodeDescriptor;

/// A connection shared by whichever caller currently holds the node's
/// slot; the pool's own lock only ever guards map mutation, never the
/// connection's use, so two callers touching different nodes never
/// contend with each other.
pub type PooledConnection = Arc<Mutex<Box<dyn AdapterConnection>>>;

pub struct ConnectionPool {
    adapter: Arc<dyn ConnectionAdapter>,
    connections: RwLock<HashMap<String, PooledConnection>>,
}

impl ConnectionPool {
    pub fn new(adapter: Arc<dyn ConnectionAdapter>) -> Self {
        ConnectionPool {
            adapter,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Fast path: read the map without taking the write lock if the
    /// connection already exists. Slow path: take the write lock and
    /// double-check before constructing a new connection, so a second
    /// thread racing to open the same new node returns the first
    /// thread's connection instead of opening a duplicate.
    pub fn fetch(&self, node: &NodeDescriptor) -> Result<PooledConnection, ClusterError> {
        if let Some(conn) = self.connections.read().unwrap().get(&node.name) {
            return Ok(conn.clone());
        }

        let mut connections = self.connections.write().unwrap();
        if let Some(conn) = connections.get(&node.name) {
            return Ok(conn.clone());
        }

        trace!("opening connection to {}", node.name);
        let conn = self.adapter.open(&node.host, node.port)?;
        let shared = Arc::new(Mutex::new(conn));
        connections.insert(node.name.clone(), shared.clone());
        Ok(shared)
    }

    /// Removes and closes every connection whose node name is not in
    /// `valid_names`, outside the hot path of `fetch`.
    pub fn evict_missing(&self, valid_names: &HashSet<String>) {
        let mut connections = self.connections.write().unwrap();
        let stale: Vec<String> = connections
            .keys()
            .filter(|name| !valid_names.contains(*name))
            .cloned()
            .collect();
        for name in stale {
            if let Some(conn) = connections.remove(&name) {
                trace!("evicting connection to {name}");
                if let Ok(mut guard) = conn.lock() {
                    guard.close();
                }
            }
        }
    }

    pub fn close_all(&self) {
        let mut connections = self.connections.write().unwrap();
        for (name, conn) in connections.drain() {
            trace!("closing connection to {name}");
            if let Ok(mut guard) = conn.lock() {
                guard.close();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.connections.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_adapter::MemoryAdapter;

    #[test]
    fn fetch_is_a_singleton_per_node() {
        let adapter = MemoryAdapter::new();
        let pool = ConnectionPool::new(adapter);
        let node = NodeDescriptor::new("a", 6379);
        let first = pool.fetch(&node).unwrap();
        let second = pool.fetch(&node).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn evict_missing_closes_stale_connections() {
        let adapter = MemoryAdapter::new();
        let pool = ConnectionPool::new(adapter);
        let a = NodeDescriptor::new("a", 6379);
        let b = NodeDescriptor::new("b", 6379);
        pool.fetch(&a).unwrap();
        pool.fetch(&b).unwrap();
        assert_eq!(pool.len(), 2);

        let mut keep = HashSet::new();
        keep.insert("a:6379".to_string());
        pool.evict_missing(&keep);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn close_all_empties_the_pool_and_is_idempotent() {
        let adapter = MemoryAdapter::new();
        let pool = ConnectionPool::new(adapter);
        pool.fetch(&NodeDescriptor::new("a", 6379)).unwrap();
        pool.close_all();
        assert!(pool.is_empty());
        pool.close_all();
        assert!(pool.is_empty());
    }
}
