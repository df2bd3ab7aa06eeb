//! The connection-adapter interface the router consumes. The wire
//! protocol and socket I/O are deliberately outside this crate: an
//! adapter translates a [`Command`] batch into whatever a concrete store
//! speaks and classifies the result back into a [`Reply`].

use std::any::Any;
use std::str::FromStr;

use strum_macros::EnumString;

use crate::error::ClusterError;

/// A single command: a name plus its ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Command {
            name: name.into(),
            args,
        }
    }
}

/// A reply value, shaped after RESP's own reply vocabulary
/// (`Nil`/`Int`/`Data`/`Bulk`), since adapters built on top of a RESP-like
/// wire format can map onto it directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Int(i64),
    Data(Vec<u8>),
    Status(String),
    Bulk(Vec<Value>),
}

/// Durable (`Moved`) vs. transient (`Ask`) redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
pub enum RedirectKind {
    #[strum(serialize = "MOVED")]
    Moved,
    #[strum(serialize = "ASK")]
    Ask,
}

impl RedirectKind {
    /// Parses the leading token of a reply such as `"MOVED 7000 10.0.0.2:6379"`.
    pub fn parse_prefix(word: &str) -> Option<RedirectKind> {
        RedirectKind::from_str(word).ok()
    }
}

/// The overall outcome of executing a batch against one node.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Value(Value),
    Redirect {
        kind: RedirectKind,
        ip: String,
        port: u16,
    },
    ConnError {
        cause: String,
    },
}

/// A live connection to a single node, owned by the connection pool.
pub trait AdapterConnection: Send {
    /// Executes `commands` as one batch. When `asking` is true the
    /// adapter prepends the one-shot `ASKING` directive ahead of the
    /// batch and forgets it again immediately after.
    fn execute(&mut self, commands: &[Command], asking: bool) -> Reply;

    /// Escape hatch yielding the adapter-specific per-node handle to
    /// fan-out helpers, which may downcast it back to a concrete type.
    fn raw(&mut self) -> &mut dyn Any;

    fn close(&mut self);
}

/// Opens connections and extracts routable keys from commands. Adapters
/// are looked up by symbolic name through the registry in
/// [`crate::registry`].
pub trait ConnectionAdapter: Send + Sync {
    /// The ordered key arguments a command carries, or empty if the
    /// command cannot be routed by key.
    fn keys_of(&self, command: &Command) -> Vec<String>;

    fn open(&self, host: &str, port: u16) -> Result<Box<dyn AdapterConnection>, ClusterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_kind_parses_known_prefixes() {
        assert_eq!(RedirectKind::parse_prefix("MOVED"), Some(RedirectKind::Moved));
        assert_eq!(RedirectKind::parse_prefix("ASK"), Some(RedirectKind::Ask));
        assert_eq!(RedirectKind::parse_prefix("NOPE"), None);
    }
}
