//! The top-level client: the public face tying the hasher, topology
//! cache, connection pool, and router together. Construct once, then
//! issue commands directly through the handle it returns.

use std::sync::Arc;

use crate::adapter::{Command, Value};
use crate::config::{ClusterClientBuilder, ClusterParams};
use crate::error::ClusterError;
use crate::fanout;
use crate::pipeline::PipelineBuilder;
use crate::registry;
use crate::router::Router;

/// A handle onto a sharded cluster. Cheap to clone-by-reference (it is
/// typically held behind an `Arc` by callers that need to share one
/// across threads); internally every shared mutable piece of state
/// already lives behind its own lock or atomic pointer.
pub struct ClusterClient {
    router: Router,
}

impl ClusterClient {
    /// Builds a client from an already-validated [`ClusterParams`],
    /// looking up the concrete adapter by the name it carries and
    /// performing the constructor's initial forced topology refresh
    /// before returning.
    pub fn new(params: ClusterParams) -> Result<Self, ClusterError> {
        let adapter = registry::build_adapter(&params.connection_adapter)?;
        let router = Router::new(adapter, params)?;
        Ok(ClusterClient { router })
    }

    /// Convenience constructor taking seed nodes directly, using the
    /// builder's defaults for everything else.
    pub fn connect<I, S>(seed_nodes: I) -> Result<Self, ClusterError>
    where
        I: IntoIterator<Item = S>,
        S: Into<crate::config::NodeSeed>,
    {
        let params = ClusterClientBuilder::new(seed_nodes).build()?;
        ClusterClient::new(params)
    }

    pub fn builder<I, S>(seed_nodes: I) -> ClusterClientBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<crate::config::NodeSeed>,
    {
        ClusterClientBuilder::new(seed_nodes)
    }

    /// Routes a single command by its key (or keys, if it has several
    /// that all share one slot) through the redirection state machine.
    pub fn execute(&self, command: Command) -> Result<Value, ClusterError> {
        self.router.call(command)
    }

    pub fn get(&self, key: impl Into<String>) -> Result<Value, ClusterError> {
        self.execute(Command::new("GET", vec![key.into()]))
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<Value, ClusterError> {
        self.execute(Command::new("SET", vec![key.into(), value.into()]))
    }

    pub fn del(&self, key: impl Into<String>) -> Result<Value, ClusterError> {
        self.execute(Command::new("DEL", vec![key.into()]))
    }

    /// Starts a plain (non-transactional) pipeline: every command added
    /// must share one slot, and they are submitted together as a single
    /// dispatch.
    pub fn pipeline(&self) -> PipelineBuilder<'_> {
        PipelineBuilder::new(&self.router, false)
    }

    /// Starts a `MULTI`/`EXEC`-wrapped transaction over the accumulated
    /// commands.
    pub fn transaction(&self) -> PipelineBuilder<'_> {
        PipelineBuilder::new(&self.router, true)
    }

    pub fn mget(&self, keys: &[String]) -> Result<Vec<Value>, ClusterError> {
        fanout::mget(&self.router, keys)
    }

    /// Runs `command` against every node currently known to the
    /// topology, forcing a refresh first so administrative callers see
    /// current membership. Returns each node's own outcome keyed by
    /// node name rather than aborting the whole fan-out on one failure.
    pub fn each_node(
        &self,
        command: Command,
    ) -> std::collections::HashMap<String, Result<Value, ClusterError>> {
        fanout::each_node(&self.router, &command)
    }

    pub fn keys(&self, pattern: &str) -> Vec<String> {
        fanout::keys(&self.router, pattern)
    }

    pub fn info(&self) -> std::collections::HashMap<String, String> {
        fanout::info(&self.router)
    }

    pub fn flushdb(&self) -> Result<(), ClusterError> {
        fanout::flushdb(&self.router)
    }

    /// Drops every pooled connection and forces the next command to
    /// re-probe the topology before dispatching.
    pub fn reconnect(&self) {
        fanout::reconnect(&self.router)
    }

    /// A snapshot of the currently known node names, mostly useful for
    /// diagnostics and tests.
    pub fn known_nodes(&self) -> Vec<String> {
        self.router
            .topology_snapshot()
            .nodes()
            .into_iter()
            .map(|node| node.name.clone())
            .collect()
    }

    pub fn close(&self) {
        self.router.close();
    }
}

/// Registers a custom connection adapter by name, so
/// [`ClusterClientBuilder::connection_adapter`] can select it. A thin
/// re-export of [`registry::register_adapter`] kept here so callers
/// only need to import from the crate root.
pub fn register_adapter(
    name: impl Into<String>,
    factory: impl Fn() -> Arc<dyn crate::adapter::ConnectionAdapter> + Send + Sync + 'static,
) {
    registry::register_adapter(name, factory);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_adapter::MemoryAdapter;

    fn test_client() -> ClusterClient {
        register_adapter("client-test-memory", || {
            MemoryAdapter::new() as Arc<dyn crate::adapter::ConnectionAdapter>
        });
        let params = ClusterClientBuilder::new([("a", 6379u16)])
            .connection_adapter("client-test-memory")
            .build()
            .unwrap();
        ClusterClient::new(params).unwrap()
    }

    #[test]
    fn set_then_get_round_trips() {
        let client = test_client();
        client.set("k", "v").unwrap();
        assert_eq!(client.get("k").unwrap(), Value::Data(b"v".to_vec()));
    }

    #[test]
    fn unregistered_adapter_name_fails_at_construction() {
        let params = ClusterClientBuilder::new([("a", 6379u16)])
            .connection_adapter("does-not-exist")
            .build()
            .unwrap();
        assert!(ClusterClient::new(params).is_err());
    }

    #[test]
    fn known_nodes_reflects_topology() {
        let client = test_client();
        assert_eq!(client.known_nodes(), vec!["a:6379".to_string()]);
    }

    #[test]
    fn flushdb_then_keys_is_empty() {
        let client = test_client();
        client.set("k", "v").unwrap();
        client.flushdb().unwrap();
        assert!(client.keys("*").is_empty());
    }
}
