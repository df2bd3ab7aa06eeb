//! An in-process, scriptable [`ConnectionAdapter`] used to exercise the
//! router without a live server: queue up redirects or connection
//! failures per node, or let commands fall through to a tiny in-memory
//! key/value store.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::adapter::{AdapterConnection, Command, ConnectionAdapter, RedirectKind, Reply, Value};
use crate::error::ClusterError;
use crate::topology::{encode_slots, SlotRange};

/// A single pre-programmed outcome for the next `execute` call on a node.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Value(Value),
    Redirect(RedirectKind, String, u16),
    ConnError(String),
}

#[derive(Default)]
struct MemoryNode {
    data: HashMap<String, Value>,
    script: VecDeque<ScriptedOutcome>,
    unreachable: bool,
    executions: Vec<Vec<Command>>,
}

#[derive(Default)]
struct Shared {
    nodes: Mutex<HashMap<String, MemoryNode>>,
    layout: Mutex<Vec<SlotRange>>,
}

/// A cheaply-`Clone`-able handle onto the shared in-memory cluster
/// state; `ConnectionAdapter::open` hands each connection a clone.
#[derive(Clone)]
pub struct MemoryAdapter(Arc<Shared>);

impl MemoryAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryAdapter(Arc::new(Shared::default())))
    }

    fn with_node<R>(&self, addr: &str, f: impl FnOnce(&mut MemoryNode) -> R) -> R {
        let mut nodes = self.0.nodes.lock().unwrap();
        let node = nodes.entry(addr.to_string()).or_default();
        f(node)
    }

    /// Queues outcomes to be returned, in order, by the next `execute`
    /// calls against `addr`. Once exhausted, `execute` falls back to
    /// simulating a tiny in-memory store.
    pub fn script(&self, addr: &str, outcomes: impl IntoIterator<Item = ScriptedOutcome>) {
        self.with_node(addr, |node| node.script.extend(outcomes));
    }

    /// Makes `open()` for `addr` fail with a `ConnError`, simulating a
    /// node that refuses connections outright.
    pub fn set_unreachable(&self, addr: &str, unreachable: bool) {
        self.with_node(addr, |node| node.unreachable = unreachable);
    }

    /// Sets the ground-truth slot layout this adapter answers
    /// `CLUSTER SLOTS` probes with.
    pub fn set_cluster_layout(&self, ranges: Vec<SlotRange>) {
        *self.0.layout.lock().unwrap() = ranges;
    }

    pub fn executions(&self, addr: &str) -> Vec<Vec<Command>> {
        self.0
            .nodes
            .lock()
            .unwrap()
            .get(addr)
            .map(|node| node.executions.clone())
            .unwrap_or_default()
    }

    pub fn set_value(&self, addr: &str, key: &str, value: Value) {
        self.with_node(addr, |node| {
            node.data.insert(key.to_string(), value);
        });
    }
}

impl ConnectionAdapter for MemoryAdapter {
    fn keys_of(&self, command: &Command) -> Vec<String> {
        match command.name.to_ascii_uppercase().as_str() {
            "GET" | "SET" | "INCR" | "DEL" | "EXPIRE" | "TTL" | "LPUSH" | "RPUSH" | "LTRIM" => {
                command.args.first().cloned().into_iter().collect()
            }
            "MGET" => command.args.clone(),
            _ => Vec::new(),
        }
    }

    fn open(&self, host: &str, port: u16) -> Result<Box<dyn AdapterConnection>, ClusterError> {
        let addr = format!("{host}:{port}");
        let unreachable = self.with_node(&addr, |node| node.unreachable);
        if unreachable {
            return Err(ClusterError::connection(format!(
                "connection refused: {addr}"
            )));
        }
        Ok(Box::new(MemoryConnection {
            addr,
            shared: self.0.clone(),
        }))
    }
}

struct MemoryConnection {
    addr: String,
    shared: Arc<Shared>,
}

impl MemoryConnection {
    fn execute_default(&self, node: &mut MemoryNode, commands: &[Command]) -> Value {
        let mut results = Vec::with_capacity(commands.len());
        for cmd in commands {
            let upper = cmd.name.to_ascii_uppercase();
            let value = match upper.as_str() {
                "ASKING" | "MULTI" => Value::Status("OK".to_string()),
                "EXEC" => Value::Bulk(Vec::new()),
                "PING" => Value::Status("PONG".to_string()),
                "GET" => cmd
                    .args
                    .first()
                    .and_then(|k| node.data.get(k))
                    .cloned()
                    .unwrap_or(Value::Nil),
                "SET" => {
                    if let (Some(key), Some(val)) = (cmd.args.first(), cmd.args.get(1)) {
                        node.data
                            .insert(key.clone(), Value::Data(val.clone().into_bytes()));
                    }
                    Value::Status("OK".to_string())
                }
                "FLUSHDB" => {
                    node.data.clear();
                    Value::Status("OK".to_string())
                }
                "KEYS" => Value::Bulk(
                    node.data
                        .keys()
                        .map(|k| Value::Data(k.clone().into_bytes()))
                        .collect(),
                ),
                "INFO" => Value::Status(format!("keys:{}", node.data.len())),
                "CLUSTER" => {
                    if cmd
                        .args
                        .first()
                        .map(|a| a.eq_ignore_ascii_case("SLOTS"))
                        .unwrap_or(false)
                    {
                        let layout = self.shared.layout.lock().unwrap();
                        encode_slots(&layout)
                    } else {
                        Value::Nil
                    }
                }
                _ => Value::Nil,
            };
            results.push(value);
        }
        if results.len() == 1 {
            results.into_iter().next().unwrap()
        } else {
            Value::Bulk(results)
        }
    }
}

impl AdapterConnection for MemoryConnection {
    fn execute(&mut self, commands: &[Command], asking: bool) -> Reply {
        let mut batch = Vec::with_capacity(commands.len() + 1);
        if asking {
            batch.push(Command::new("ASKING", vec![]));
        }
        batch.extend(commands.iter().cloned());

        let mut nodes = self.shared.nodes.lock().unwrap();
        let node = nodes.entry(self.addr.clone()).or_default();
        node.executions.push(batch.clone());

        if let Some(outcome) = node.script.pop_front() {
            return match outcome {
                ScriptedOutcome::Value(v) => Reply::Value(v),
                ScriptedOutcome::Redirect(kind, ip, port) => Reply::Redirect { kind, ip, port },
                ScriptedOutcome::ConnError(cause) => Reply::ConnError { cause },
            };
        }

        Reply::Value(self.execute_default(node, &batch))
    }

    fn raw(&mut self) -> &mut dyn Any {
        self
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_get_set_round_trip() {
        let adapter = MemoryAdapter::new();
        let mut conn = adapter.open("a", 6379).unwrap();
        let set = Command::new("SET", vec!["x".into(), "1".into()]);
        assert_eq!(
            conn.execute(std::slice::from_ref(&set), false),
            Reply::Value(Value::Status("OK".into()))
        );
        let get = Command::new("GET", vec!["x".into()]);
        assert_eq!(
            conn.execute(std::slice::from_ref(&get), false),
            Reply::Value(Value::Data(b"1".to_vec()))
        );
    }

    #[test]
    fn scripted_outcomes_are_consumed_in_order() {
        let adapter = MemoryAdapter::new();
        adapter.script(
            "a:6379",
            vec![ScriptedOutcome::Redirect(RedirectKind::Moved, "b".into(), 6379)],
        );
        let mut conn = adapter.open("a", 6379).unwrap();
        let get = Command::new("GET", vec!["x".into()]);
        assert_eq!(
            conn.execute(std::slice::from_ref(&get), false),
            Reply::Redirect {
                kind: RedirectKind::Moved,
                ip: "b".into(),
                port: 6379
            }
        );
        // script exhausted, falls back to default behavior
        assert_eq!(
            conn.execute(std::slice::from_ref(&get), false),
            Reply::Value(Value::Nil)
        );
    }

    #[test]
    fn unreachable_node_fails_at_open() {
        let adapter = MemoryAdapter::new();
        adapter.set_unreachable("a:6379", true);
        assert!(adapter.open("a", 6379).is_err());
    }
}
