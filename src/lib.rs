//! A slot-routing client for a sharded, in-memory key/value cluster.
//!
//! A [`ClusterClient`] hashes each command's key to a slot, looks the
//! slot's owning node up in a periodically-refreshed topology snapshot,
//! and dispatches through a pooled connection — following `MOVED`/`ASK`
//! redirects and retrying past connection errors along the way. The
//! wire protocol and transport are left to a pluggable
//! [`ConnectionAdapter`]; this crate owns only the routing state
//! machine, not bytes on a socket.
//!
//! ```no_run
//! use shardkv_cluster::{ClusterClient, ClusterClientBuilder};
//!
//! # fn main() -> Result<(), shardkv_cluster::ClusterError> {
//! let client = ClusterClientBuilder::new(["10.0.0.1:6379", "10.0.0.2:6379"])
//!     .connection_adapter("memory")
//!     .build()
//!     .and_then(ClusterClient::new)?;
//!
//! client.set("greeting", "hello")?;
//! assert_eq!(client.get("greeting")?, shardkv_cluster::Value::Data(b"hello".to_vec()));
//! # Ok(())
//! # }
//! ```

mod adapter;
mod client;
mod config;
mod error;
mod fanout;
mod hash;
#[cfg(any(test, feature = "test-util"))]
mod memory_adapter;
mod pipeline;
mod pool;
mod registry;
mod router;
mod topology;

pub use adapter::{AdapterConnection, Command, ConnectionAdapter, RedirectKind, Reply, Value};
pub use client::{register_adapter, ClusterClient};
pub use config::{ClusterClientBuilder, ClusterParams, NodeSeed, RetryParams};
pub use error::{ClusterError, ClusterErrorKind, ClusterResult};
pub use hash::{keyslot, SLOT_COUNT};
pub use pipeline::PipelineBuilder;
pub use topology::{NodeDescriptor, SlotRange, Topology};

#[cfg(any(test, feature = "test-util"))]
pub use memory_adapter::{MemoryAdapter, ScriptedOutcome};
