//! Error taxonomy for the cluster client.
//!
//! A small, closed set of kinds plus a free-form message, rather than one
//! variant per failure site, matching RESP-cluster driver conventions.

use std::fmt;
use std::sync::Arc;

/// The five terminal error classes a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterErrorKind {
    /// Redirection budget exhausted within one call.
    Redirection,
    /// Connection-error budget exhausted; carries the last underlying cause.
    Connection,
    /// A batch spans multiple slots, or has no routable key.
    Routing,
    /// Empty or malformed seed list, or an unregistered adapter name.
    Configuration,
    /// An impossible reply from the server, e.g. a redirect from a probe
    /// command that has no key.
    ProtocolAssertion,
}

/// A single error type carried across the whole public surface.
#[derive(Debug, Clone)]
pub struct ClusterError {
    kind: ClusterErrorKind,
    message: String,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl ClusterError {
    pub fn new(kind: ClusterErrorKind, message: impl Into<String>) -> Self {
        ClusterError {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attaches `cause` as the chained [`std::error::Error::source`].
    pub fn with_source(
        kind: ClusterErrorKind,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ClusterError {
            kind,
            message: message.into(),
            source: Some(Arc::new(cause)),
        }
    }

    pub fn redirection(message: impl Into<String>) -> Self {
        Self::new(ClusterErrorKind::Redirection, message)
    }

    /// A connection failure reported by the adapter, carrying its cause as
    /// a plain message. Use [`ClusterError::connection_with_cause`] when the
    /// adapter's error is available as a real [`std::error::Error`].
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ClusterErrorKind::Connection, message)
    }

    /// Like [`ClusterError::connection`], but keeps `cause` reachable
    /// through [`std::error::Error::source`] instead of flattening it into
    /// the message.
    pub fn connection_with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::with_source(ClusterErrorKind::Connection, message, cause)
    }

    pub fn routing(message: impl Into<String>) -> Self {
        Self::new(ClusterErrorKind::Routing, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ClusterErrorKind::Configuration, message)
    }

    pub fn protocol_assertion(message: impl Into<String>) -> Self {
        Self::new(ClusterErrorKind::ProtocolAssertion, message)
    }

    pub fn kind(&self) -> ClusterErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ClusterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|cause| cause.as_ref() as &(dyn std::error::Error + 'static))
    }
}

pub type ClusterResult<T> = Result<T, ClusterError>;
