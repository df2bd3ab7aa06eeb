//! The router / redirection engine: the slot-routing and redirection
//! state machine. Tracks a rotating candidate set across connection
//! errors and a separate redirection counter across `MOVED`/`ASK`
//! replies, each against its own budget, rather than one shared retry
//! cap for every kind of failure.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, error, trace, warn};
use rand::seq::IteratorRandom;
use rand::thread_rng;

use crate::adapter::{Command, ConnectionAdapter, RedirectKind, Reply, Value};
use crate::config::ClusterParams;
use crate::error::{ClusterError, ClusterErrorKind};
use crate::pool::ConnectionPool;
use crate::topology::{parse_slots, NodeDescriptor, Topology, TopologyBuilder, TopologyCache};

fn single_slot(keys: &[String]) -> Result<u16, ClusterError> {
    if keys.is_empty() {
        return Err(ClusterError::routing(
            "command has no routable key; route keyless commands via each_node",
        ));
    }
    let mut slots: Vec<u16> = keys.iter().map(|k| crate::hash::keyslot(k)).collect();
    slots.sort_unstable();
    slots.dedup();
    if slots.len() != 1 {
        return Err(ClusterError::routing(
            "no way to dispatch this command to the cluster: keys span multiple slots",
        ));
    }
    Ok(slots[0])
}

fn random_node_name(candidates: &HashSet<String>) -> Option<String> {
    candidates.iter().choose(&mut thread_rng()).cloned()
}

pub(crate) fn slot_cmd() -> Command {
    Command::new("CLUSTER", vec!["SLOTS".to_string()])
}

/// Ties the hasher, topology cache, connection pool, and adapter
/// together and runs the redirection/retry state machine described in
/// the specification's router component.
pub struct Router {
    adapter: Arc<dyn ConnectionAdapter>,
    topology: TopologyCache,
    pool: ConnectionPool,
    params: ClusterParams,
    refresh_flag: Mutex<bool>,
    /// The originally configured seed nodes. Every rebuilt topology
    /// carries these forward regardless of what the latest `CLUSTER
    /// SLOTS` reply covers, so a cluster with unassigned slots never
    /// loses its own bootstrap nodes; anything else not named by the
    /// new reply is dropped.
    seeds: Vec<NodeDescriptor>,
}

impl Router {
    pub fn new(adapter: Arc<dyn ConnectionAdapter>, params: ClusterParams) -> Result<Self, ClusterError> {
        let seeds: Vec<NodeDescriptor> = params
            .seed_nodes
            .iter()
            .map(|seed| NodeDescriptor::new(seed.host.clone(), seed.port))
            .collect();

        let mut builder = TopologyBuilder::new();
        for seed in &seeds {
            builder.add_node(&seed.host, seed.port);
        }
        let topology = TopologyCache::new();
        topology.publish(builder.build());

        let router = Router {
            pool: ConnectionPool::new(adapter.clone()),
            adapter,
            topology,
            params,
            refresh_flag: Mutex::new(true),
            seeds,
        };
        router.refresh()?;
        Ok(router)
    }

    pub fn adapter(&self) -> &Arc<dyn ConnectionAdapter> {
        &self.adapter
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn topology_snapshot(&self) -> Arc<Topology> {
        self.topology.load()
    }

    pub fn mark_refresh_needed(&self) {
        *self.refresh_flag.lock().unwrap() = true;
    }

    /// Unconditionally probes the topology, regardless of whether the
    /// refresh flag is currently set. Administrative fan-outs use this
    /// so they always see current cluster membership.
    pub fn force_refresh(&self) -> Result<(), ClusterError> {
        self.mark_refresh_needed();
        self.refresh()
    }

    /// Runs one command through the hasher and the redirection state
    /// machine.
    pub fn call(&self, command: Command) -> Result<Value, ClusterError> {
        let keys = self.adapter.keys_of(&command);
        let slot = single_slot(&keys)?;
        self.dispatch(slot, &[command])
    }

    /// Runs an already-assembled batch: collects every key across every
    /// command, requires they all resolve to one slot, then dispatches
    /// the whole batch atomically.
    pub fn dispatch_batch(&self, commands: Vec<Command>) -> Result<Value, ClusterError> {
        let mut keys: Vec<String> = commands
            .iter()
            .flat_map(|cmd| self.adapter.keys_of(cmd))
            .collect();
        keys.sort();
        keys.dedup();
        let slot = single_slot(&keys)?;
        self.dispatch(slot, &commands)
    }

    /// The redirection/retry state machine itself (specification §4.E).
    pub fn dispatch(&self, slot: u16, commands: &[Command]) -> Result<Value, ClusterError> {
        self.refresh()?;
        let topology = self.topology.load();
        let mut candidates: HashSet<String> = topology.node_names();
        let mut current = topology
            .slot_owner(slot)
            .map(|d| d.name.clone())
            .or_else(|| random_node_name(&candidates))
            .ok_or_else(|| ClusterError::connection("no known nodes to dispatch to"))?;

        let mut asking = false;
        let mut redirect_count = 0usize;
        let mut connect_error_count = 0usize;
        let mut connect_retry_count = 0u32;

        loop {
            self.refresh()?;
            candidates.remove(&current);

            let node = self.resolve_node(&current);
            trace!("dispatching to {} (slot {slot}, asking={asking})", node.name);

            let reply = match self.pool.fetch(&node) {
                Ok(conn) => {
                    let mut guard = conn.lock().unwrap();
                    guard.execute(commands, asking)
                }
                Err(_) => Reply::ConnError {
                    cause: format!("failed to open connection to {}", node.name),
                },
            };
            asking = false;

            match reply {
                Reply::Value(value) => return Ok(value),
                Reply::Redirect { kind, ip, port } => {
                    redirect_count += 1;
                    if redirect_count > self.params.max_redirection {
                        return Err(ClusterError::redirection(format!(
                            "too many redirections ({redirect_count})"
                        )));
                    }
                    debug!("following {:?} redirect to {ip}:{port}", kind);
                    let name = self.topology.add_node(&ip, port);
                    if kind == RedirectKind::Moved {
                        self.mark_refresh_needed();
                    } else {
                        asking = true;
                    }
                    current = name;
                }
                Reply::ConnError { cause } => {
                    connect_error_count += 1;
                    if connect_error_count > self.params.max_connection_error {
                        return Err(ClusterError::connection(cause));
                    }
                    warn!("connection error on {current} ({connect_error_count}): {cause}");
                    if let Some(next) = random_node_name(&candidates) {
                        current = next;
                    } else {
                        connect_retry_count += 1;
                        let sleep_for = self.params.retry.wait_time_for_retry(connect_retry_count);
                        debug!("candidate set exhausted, sleeping {sleep_for:?} before retry {connect_retry_count}");
                        thread::sleep(sleep_for);
                    }
                }
            }
        }
    }

    fn resolve_node(&self, name: &str) -> NodeDescriptor {
        self.topology
            .load()
            .get_node(name)
            .cloned()
            .expect("node must be present in topology: it was added before being dispatched to")
    }

    /// Refresh protocol (specification §4.E.refresh). The flag is
    /// snapshotted and cleared under the mutex, which is then released
    /// immediately — the probe itself runs unlocked, so other threads
    /// calling `dispatch` see the flag already false and proceed without
    /// waiting on this one's network round trip.
    pub fn refresh(&self) -> Result<(), ClusterError> {
        {
            let mut flag = self.refresh_flag.lock().unwrap();
            if !*flag {
                return Ok(());
            }
            *flag = false;
        }

        let topology = self.topology.load();
        let mut last_connection_error = None;

        for node in topology.nodes() {
            let conn = match self.pool.fetch(node) {
                Ok(conn) => conn,
                Err(err) => {
                    warn!("refresh: failed to connect to {}: {err}", node.name);
                    last_connection_error = Some(err);
                    continue;
                }
            };
            let reply = {
                let mut guard = conn.lock().unwrap();
                guard.execute(std::slice::from_ref(&slot_cmd()), false)
            };
            match reply {
                Reply::Value(value) => {
                    let ranges = parse_slots(&value)?;
                    let mut builder = TopologyBuilder::new();
                    for seed in &self.seeds {
                        builder.add_node(&seed.host, seed.port);
                    }
                    builder.load_slots(ranges);
                    let new_topology = builder.build();
                    let valid_names = new_topology.node_names();
                    self.topology.publish(new_topology);
                    self.pool.evict_missing(&valid_names);
                    return Ok(());
                }
                Reply::Redirect { .. } => {
                    let msg = format!(
                        "protocol assertion: {} replied to CLUSTER SLOTS with a redirect",
                        node.name
                    );
                    error!("{msg}");
                    return Err(ClusterError::new(ClusterErrorKind::ProtocolAssertion, msg));
                }
                Reply::ConnError { cause } => {
                    warn!("refresh: probe of {} failed: {cause}", node.name);
                    last_connection_error = Some(ClusterError::connection(cause));
                }
            }
        }

        if let Some(err) = last_connection_error {
            warn!("refresh: all nodes failed to answer CLUSTER SLOTS ({err}); keeping stale topology");
        }
        Ok(())
    }

    pub fn close(&self) {
        self.pool.close_all();
    }
}
