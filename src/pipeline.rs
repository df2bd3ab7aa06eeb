//! Pipeline / MULTI accumulation: batches up commands client-side and
//! submits them as one single-slot dispatch, so a multi-command round
//! trip costs one network call instead of one per command.

use crate::adapter::{Command, Value};
use crate::error::ClusterError;
use crate::router::Router;

/// Accumulates commands for one pipelined or transactional round trip.
/// Every command added must resolve to the same slot as the others (or
/// carry no key at all); `execute` rejects the batch otherwise, mirroring
/// the single-slot rule `Router::dispatch_batch` enforces.
pub struct PipelineBuilder<'a> {
    router: &'a Router,
    commands: Vec<Command>,
    transactional: bool,
}

impl<'a> PipelineBuilder<'a> {
    pub(crate) fn new(router: &'a Router, transactional: bool) -> Self {
        PipelineBuilder {
            router,
            commands: Vec::new(),
            transactional,
        }
    }

    /// Queues one command. Returns `self` so calls can be chained.
    pub fn add(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Dispatches the accumulated batch as one unit. A transactional
    /// pipeline wraps the batch in `MULTI`/`EXEC` before sending it; a
    /// plain pipeline sends the commands back to back unwrapped.
    pub fn execute(self) -> Result<Value, ClusterError> {
        if self.commands.is_empty() {
            return Err(ClusterError::routing("pipeline has no commands to execute"));
        }
        if !self.transactional {
            return self.router.dispatch_batch(self.commands);
        }

        let mut wrapped = Vec::with_capacity(self.commands.len() + 2);
        wrapped.push(Command::new("MULTI", vec![]));
        wrapped.extend(self.commands);
        wrapped.push(Command::new("EXEC", vec![]));
        self.router.dispatch_batch(wrapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterClientBuilder;
    use crate::memory_adapter::MemoryAdapter;

    fn router_with_one_node() -> Router {
        let adapter = MemoryAdapter::new();
        adapter.set_cluster_layout(vec![crate::topology::SlotRange {
            start: 0,
            end: 16383,
            master: ("a".into(), 6379),
            replicas: vec![],
        }]);
        let params = ClusterClientBuilder::new([("a", 6379u16)])
            .connection_adapter("memory")
            .build()
            .unwrap();
        Router::new(adapter, params).unwrap()
    }

    #[test]
    fn pipeline_of_same_slot_commands_executes() {
        let router = router_with_one_node();
        let result = PipelineBuilder::new(&router, false)
            .add(Command::new("SET", vec!["{t}a".into(), "1".into()]))
            .add(Command::new("SET", vec!["{t}b".into(), "2".into()]))
            .execute();
        assert!(result.is_ok());
    }

    #[test]
    fn transaction_wraps_in_multi_exec() {
        let router = router_with_one_node();
        let result = PipelineBuilder::new(&router, true)
            .add(Command::new("SET", vec!["{t}a".into(), "1".into()]))
            .execute();
        assert!(result.is_ok());
    }

    #[test]
    fn multi_slot_batch_is_rejected() {
        let router = router_with_one_node();
        let pipeline = PipelineBuilder::new(&router, false)
            .add(Command::new("SET", vec!["a".into(), "1".into()]))
            .add(Command::new("SET", vec!["totally-different-key".into(), "2".into()]));
        if crate::hash::keyslot("a") != crate::hash::keyslot("totally-different-key") {
            assert!(pipeline.execute().is_err());
        }
    }

    #[test]
    fn empty_pipeline_is_rejected() {
        let router = router_with_one_node();
        assert!(PipelineBuilder::new(&router, false).execute().is_err());
    }
}
