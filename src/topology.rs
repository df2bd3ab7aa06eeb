//! The cluster topology cache: an immutable `slot -> owner` and
//! `name -> descriptor` snapshot, published behind an atomic pointer
//! swap instead of guarded by a reader lock, so readers never block
//! behind a refresh in progress.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use derivative::Derivative;
use log::trace;

use crate::adapter::Value;
use crate::error::ClusterError;

/// `(host, port, name)`. Equality and hashing consider `name` only —
/// `host`/`port` are carried for connecting and display, not identity.
#[derive(Derivative, Debug, Clone)]
#[derivative(PartialEq, Eq, Hash)]
pub struct NodeDescriptor {
    #[derivative(PartialEq = "ignore", Hash = "ignore")]
    pub host: String,
    #[derivative(PartialEq = "ignore", Hash = "ignore")]
    pub port: u16,
    pub name: String,
}

impl NodeDescriptor {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let name = format!("{host}:{port}");
        NodeDescriptor { host, port, name }
    }
}

/// One `CLUSTER SLOTS`-style record: a master and its replicas owning
/// `[start, end]` inclusive.
#[derive(Debug, Clone)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
    pub master: (String, u16),
    pub replicas: Vec<(String, u16)>,
}

/// An immutable, wholesale-replaced view of the cluster.
#[derive(Debug, Default)]
pub struct Topology {
    slot_owner: HashMap<u16, String>,
    nodes: HashMap<String, NodeDescriptor>,
}

impl Topology {
    pub fn empty() -> Self {
        Topology::default()
    }

    pub fn slot_owner(&self, slot: u16) -> Option<&NodeDescriptor> {
        self.slot_owner.get(&slot).and_then(|name| self.nodes.get(name))
    }

    /// Enumerates known nodes in a stable (name-sorted) order.
    pub fn nodes(&self) -> Vec<&NodeDescriptor> {
        let mut nodes: Vec<&NodeDescriptor> = self.nodes.values().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    pub fn node_names(&self) -> std::collections::HashSet<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn get_node(&self, name: &str) -> Option<&NodeDescriptor> {
        self.nodes.get(name)
    }
}

/// Builds a fresh [`Topology`] from scratch; `load_slots` overwrites
/// `slot_owner` entries in record order, so overlapping records let the
/// last write win, matching the server's semantics during migration.
#[derive(Default)]
pub struct TopologyBuilder {
    slot_owner: HashMap<u16, String>,
    nodes: HashMap<String, NodeDescriptor>,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        TopologyBuilder::default()
    }

    /// Seeds the builder with every node already known to `topology`,
    /// used when adding a single redirect target without discarding the
    /// rest of the current view.
    pub fn from_topology(topology: &Topology) -> Self {
        TopologyBuilder {
            slot_owner: topology.slot_owner.clone(),
            nodes: topology.nodes.clone(),
        }
    }

    /// Idempotent: returns the canonical `host:port` name, inserting the
    /// descriptor the first time it is seen.
    pub fn add_node(&mut self, host: &str, port: u16) -> String {
        let descriptor = NodeDescriptor::new(host, port);
        let name = descriptor.name.clone();
        self.nodes.entry(name.clone()).or_insert(descriptor);
        name
    }

    pub fn load_slots(&mut self, ranges: impl IntoIterator<Item = SlotRange>) {
        for range in ranges {
            let master_name = self.add_node(&range.master.0, range.master.1);
            for slot in range.start..=range.end {
                self.slot_owner.insert(slot, master_name.clone());
            }
        }
    }

    pub fn build(self) -> Topology {
        Topology {
            slot_owner: self.slot_owner,
            nodes: self.nodes,
        }
    }
}

/// The published-snapshot cache: readers `load()` an `Arc<Topology>`
/// that stays valid for the duration of their call; writers build a
/// whole new `Topology` and `store()` it in one atomic swap.
pub struct TopologyCache {
    inner: ArcSwap<Topology>,
}

impl TopologyCache {
    pub fn new() -> Self {
        TopologyCache {
            inner: ArcSwap::from_pointee(Topology::empty()),
        }
    }

    pub fn load(&self) -> Arc<Topology> {
        self.inner.load_full()
    }

    pub fn publish(&self, topology: Topology) {
        trace!("publishing topology with {} node(s)", topology.nodes.len());
        self.inner.store(Arc::new(topology));
    }

    /// Idempotently adds a node to the current snapshot, publishing a
    /// new one if it wasn't already known.
    pub fn add_node(&self, host: &str, port: u16) -> String {
        let current = self.load();
        let name = format!("{host}:{port}");
        if current.nodes.contains_key(&name) {
            return name;
        }
        let mut builder = TopologyBuilder::from_topology(&current);
        let name = builder.add_node(host, port);
        self.publish(builder.build());
        name
    }
}

impl Default for TopologyCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a `CLUSTER SLOTS`-shaped reply into slot ranges.
pub fn parse_slots(raw: &Value) -> Result<Vec<SlotRange>, ClusterError> {
    let mut result = Vec::new();

    let items = match raw {
        Value::Bulk(items) => items,
        _ => return Ok(result),
    };

    for item in items {
        let fields = match item {
            Value::Bulk(fields) if fields.len() >= 3 => fields,
            _ => continue,
        };

        let start = match fields[0] {
            Value::Int(n) => n as u16,
            _ => continue,
        };
        let end = match fields[1] {
            Value::Int(n) => n as u16,
            _ => continue,
        };

        let mut nodes: Vec<(String, u16)> = Vec::new();
        for node in &fields[2..] {
            let node_fields = match node {
                Value::Bulk(nf) if nf.len() >= 2 => nf,
                _ => continue,
            };
            let ip = match &node_fields[0] {
                Value::Data(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                Value::Status(s) => s.clone(),
                _ => continue,
            };
            let port = match node_fields[1] {
                Value::Int(p) => p as u16,
                _ => continue,
            };
            if ip.is_empty() {
                continue;
            }
            nodes.push((ip, port));
        }

        if nodes.is_empty() {
            continue;
        }
        let master = nodes.remove(0);
        result.push(SlotRange {
            start,
            end,
            master,
            replicas: nodes,
        });
    }

    Ok(result)
}

/// Encodes slot ranges back into the wire shape `parse_slots` expects;
/// used by the in-memory test adapter to answer `CLUSTER SLOTS` probes.
pub fn encode_slots(ranges: &[SlotRange]) -> Value {
    Value::Bulk(
        ranges
            .iter()
            .map(|range| {
                let mut fields = vec![
                    Value::Int(range.start as i64),
                    Value::Int(range.end as i64),
                    Value::Bulk(vec![
                        Value::Data(range.master.0.clone().into_bytes()),
                        Value::Int(range.master.1 as i64),
                    ]),
                ];
                for (ip, port) in &range.replicas {
                    fields.push(Value::Bulk(vec![
                        Value::Data(ip.clone().into_bytes()),
                        Value::Int(*port as i64),
                    ]));
                }
                Value::Bulk(fields)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_slots_last_write_wins_on_overlap() {
        let mut builder = TopologyBuilder::new();
        builder.load_slots(vec![
            SlotRange {
                start: 0,
                end: 100,
                master: ("a".into(), 6379),
                replicas: vec![],
            },
            SlotRange {
                start: 50,
                end: 150,
                master: ("b".into(), 6379),
                replicas: vec![],
            },
        ]);
        let topology = builder.build();
        assert_eq!(topology.slot_owner(10).unwrap().name, "a:6379");
        assert_eq!(topology.slot_owner(75).unwrap().name, "b:6379");
        assert_eq!(topology.slot_owner(150).unwrap().name, "b:6379");
    }

    #[test]
    fn round_trips_through_encode_and_parse() {
        let ranges = vec![SlotRange {
            start: 0,
            end: 16383,
            master: ("10.0.0.1".into(), 6379),
            replicas: vec![("10.0.0.2".into(), 6379)],
        }];
        let value = encode_slots(&ranges);
        let parsed = parse_slots(&value).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].master, ("10.0.0.1".to_string(), 6379));
        assert_eq!(parsed[0].replicas, vec![("10.0.0.2".to_string(), 6379)]);
    }

    #[test]
    fn cache_add_node_is_idempotent() {
        let cache = TopologyCache::new();
        let first = cache.add_node("10.0.0.2", 6379);
        let second = cache.add_node("10.0.0.2", 6379);
        assert_eq!(first, second);
        assert_eq!(cache.load().nodes().len(), 1);
    }
}
