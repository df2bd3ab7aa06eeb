//! Convenience commands that fan out across every node rather than
//! route by key: `KEYS`, `INFO`, `FLUSHDB`, and a `reconnect` escape
//! hatch, plus `mget`, which fans out across keys instead. Each is a
//! thin wrapper over `each_node`/the router's `call`, with no
//! additional state machine of its own.

use std::collections::HashMap;

use crate::adapter::{Command, Value};
use crate::error::ClusterError;
use crate::router::Router;

/// Runs `command` against every node currently known to the topology,
/// returning each node's own reply keyed by node name. A node that
/// fails to answer yields an `Err` entry for that node rather than
/// aborting the whole fan-out.
pub fn each_node(
    router: &Router,
    command: &Command,
) -> HashMap<String, Result<Value, ClusterError>> {
    if let Err(err) = router.force_refresh() {
        log::warn!("each_node: forced refresh failed, using last known topology: {err}");
    }
    let topology = router.topology_snapshot();
    let mut results = HashMap::new();
    for node in topology.nodes() {
        let outcome = match router.pool().fetch(node) {
            Ok(conn) => {
                let mut guard = conn.lock().unwrap();
                match guard.execute(std::slice::from_ref(command), false) {
                    crate::adapter::Reply::Value(value) => Ok(value),
                    crate::adapter::Reply::Redirect { ip, port, .. } => Err(ClusterError::protocol_assertion(
                        format!("{} redirected a fan-out command to {ip}:{port}", node.name),
                    )),
                    crate::adapter::Reply::ConnError { cause } => Err(ClusterError::connection(cause)),
                }
            }
            Err(err) => Err(err),
        };
        results.insert(node.name.clone(), outcome);
    }
    results
}

/// `KEYS pattern` against every node, concatenated into one list.
/// Per-node failures are logged and skipped rather than propagated, so
/// one unreachable node never hides the keys every other node has.
pub fn keys(router: &Router, pattern: &str) -> Vec<String> {
    let command = Command::new("KEYS", vec![pattern.to_string()]);
    let mut all = Vec::new();
    for (node_name, result) in each_node(router, &command) {
        match result {
            Ok(Value::Bulk(items)) => {
                for item in items {
                    if let Value::Data(bytes) = item {
                        all.push(String::from_utf8_lossy(&bytes).into_owned());
                    }
                }
            }
            Ok(_) => {}
            Err(err) => log::warn!("keys: node {node_name} failed: {err}"),
        }
    }
    all
}

/// `INFO` against every node, keyed by node name.
pub fn info(router: &Router) -> HashMap<String, String> {
    let command = Command::new("INFO", vec![]);
    each_node(router, &command)
        .into_iter()
        .filter_map(|(name, result)| match result {
            Ok(Value::Status(text)) => Some((name, text)),
            Ok(Value::Data(bytes)) => Some((name, String::from_utf8_lossy(&bytes).into_owned())),
            _ => None,
        })
        .collect()
}

/// `FLUSHDB` against every node. Fails if any single node fails, since a
/// partially-flushed cluster is a more dangerous silent outcome than a
/// loud error.
pub fn flushdb(router: &Router) -> Result<(), ClusterError> {
    let command = Command::new("FLUSHDB", vec![]);
    for (node_name, result) in each_node(router, &command) {
        result.map_err(|err| {
            ClusterError::connection(format!("flushdb failed on {node_name}: {err}"))
        })?;
    }
    Ok(())
}

/// `MGET` over keys that may land on different slots: dispatched one
/// key at a time through the router rather than as a single batch,
/// since the router's single-slot rule forbids submitting them together
/// unless every key shares a hash tag.
pub fn mget(router: &Router, keys: &[String]) -> Result<Vec<Value>, ClusterError> {
    let mut values = Vec::with_capacity(keys.len());
    for key in keys {
        let value = router.call(Command::new("GET", vec![key.clone()]))?;
        values.push(value);
    }
    Ok(values)
}

/// Drops every pooled connection and forces the next dispatch to
/// reconnect and re-probe the topology from scratch.
pub fn reconnect(router: &Router) {
    router.pool().close_all();
    router.mark_refresh_needed();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterClientBuilder;
    use crate::memory_adapter::MemoryAdapter;
    use crate::router::Router;

    fn router_with_two_nodes() -> Router {
        let adapter = MemoryAdapter::new();
        adapter.set_cluster_layout(vec![
            crate::topology::SlotRange {
                start: 0,
                end: 8191,
                master: ("a".into(), 6379),
                replicas: vec![],
            },
            crate::topology::SlotRange {
                start: 8192,
                end: 16383,
                master: ("b".into(), 6379),
                replicas: vec![],
            },
        ]);
        adapter.set_value("a:6379", "x", Value::Data(b"1".to_vec()));
        adapter.set_value("b:6379", "y", Value::Data(b"2".to_vec()));
        let params = ClusterClientBuilder::new(["a:6379", "b:6379"])
            .connection_adapter("memory")
            .build()
            .unwrap();
        Router::new(adapter, params).unwrap()
    }

    #[test]
    fn keys_concatenates_across_nodes() {
        let router = router_with_two_nodes();
        let mut found = keys(&router, "*");
        found.sort();
        assert_eq!(found, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn info_reports_every_node() {
        let router = router_with_two_nodes();
        let report = info(&router);
        assert_eq!(report.len(), 2);
    }

    #[test]
    fn flushdb_clears_every_node() {
        let router = router_with_two_nodes();
        assert!(flushdb(&router).is_ok());
        assert!(keys(&router, "*").is_empty());
    }

    #[test]
    fn mget_fetches_keys_regardless_of_slot() {
        let router = router_with_two_nodes();
        router
            .call(Command::new("SET", vec!["p".to_string(), "1".to_string()]))
            .unwrap();
        router
            .call(Command::new("SET", vec!["q".to_string(), "2".to_string()]))
            .unwrap();
        let values = mget(&router, &["p".to_string(), "q".to_string()]).unwrap();
        assert_eq!(values[0], Value::Data(b"1".to_vec()));
        assert_eq!(values[1], Value::Data(b"2".to_vec()));
    }

    #[test]
    fn reconnect_empties_the_pool() {
        let router = router_with_two_nodes();
        router.call(Command::new("GET", vec!["x".to_string()])).unwrap();
        assert!(!router.pool().is_empty());
        reconnect(&router);
        assert!(router.pool().is_empty());
    }
}
