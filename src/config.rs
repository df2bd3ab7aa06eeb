//! Configuration: a fluent builder producing an immutable
//! [`ClusterParams`] snapshot, keeping validation (step 1) separate from
//! the value the rest of the crate actually reads from (step 2).

use std::time::Duration;

use rand::Rng;

use crate::error::ClusterError;

/// One seed node, accepted in any of the forms the options table allows:
/// `"host:port"`, `(host, port)`, or a bare host (port defaults to 6379).
#[derive(Debug, Clone)]
pub struct NodeSeed {
    pub host: String,
    pub port: u16,
}

const DEFAULT_PORT: u16 = 6379;

impl From<&str> for NodeSeed {
    fn from(value: &str) -> Self {
        match value.rsplit_once(':') {
            Some((host, port)) => NodeSeed {
                host: host.to_string(),
                port: port.parse().unwrap_or(DEFAULT_PORT),
            },
            None => NodeSeed {
                host: value.to_string(),
                port: DEFAULT_PORT,
            },
        }
    }
}

impl From<String> for NodeSeed {
    fn from(value: String) -> Self {
        NodeSeed::from(value.as_str())
    }
}

impl From<(&str, u16)> for NodeSeed {
    fn from((host, port): (&str, u16)) -> Self {
        NodeSeed {
            host: host.to_string(),
            port,
        }
    }
}

impl From<(String, u16)> for NodeSeed {
    fn from((host, port): (String, u16)) -> Self {
        NodeSeed { host, port }
    }
}

/// The pure exponential-backoff-with-jitter computation, isolated so the
/// router's connection-error branch is a single call rather than inline
/// arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct RetryParams {
    pub interval: Duration,
    pub random_factor: f64,
}

impl RetryParams {
    /// `retry` is 1-based: the first post-exhaustion sleep is `retry == 1`.
    pub fn wait_time_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let base = self.interval.as_secs_f64() * 2f64.powi(exponent as i32);
        let jitter = if self.random_factor > 0.0 {
            rand::thread_rng().gen_range(-self.random_factor..=self.random_factor)
        } else {
            0.0
        };
        let scaled = (base * (1.0 + jitter)).max(0.0);
        Duration::from_secs_f64(scaled)
    }
}

/// Validated, immutable configuration snapshot cloned into the client at
/// construction and never mutated afterward.
#[derive(Debug, Clone)]
pub struct ClusterParams {
    pub seed_nodes: Vec<NodeSeed>,
    pub max_redirection: usize,
    pub max_connection_error: usize,
    pub retry: RetryParams,
    pub connection_adapter: String,
    pub logger: Option<String>,
}

/// Fluent builder over [`ClusterParams`].
pub struct ClusterClientBuilder {
    seed_nodes: Vec<NodeSeed>,
    max_redirection: usize,
    max_connection_error: usize,
    connect_retry_interval: f64,
    connect_retry_random_factor: f64,
    connection_adapter: String,
    logger: Option<String>,
}

impl ClusterClientBuilder {
    pub fn new<I, S>(seed_nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeSeed>,
    {
        ClusterClientBuilder {
            seed_nodes: seed_nodes.into_iter().map(Into::into).collect(),
            max_redirection: 10,
            max_connection_error: 5,
            connect_retry_interval: 0.001,
            connect_retry_random_factor: 0.1,
            connection_adapter: "redis".to_string(),
            logger: None,
        }
    }

    pub fn max_redirection(mut self, n: usize) -> Self {
        self.max_redirection = n;
        self
    }

    pub fn max_connection_error(mut self, n: usize) -> Self {
        self.max_connection_error = n;
        self
    }

    pub fn connect_retry_interval(mut self, seconds: f64) -> Self {
        self.connect_retry_interval = seconds;
        self
    }

    pub fn connect_retry_random_factor(mut self, factor: f64) -> Self {
        self.connect_retry_random_factor = factor;
        self
    }

    pub fn connection_adapter(mut self, name: impl Into<String>) -> Self {
        self.connection_adapter = name.into();
        self
    }

    pub fn logger(mut self, target: impl Into<String>) -> Self {
        self.logger = Some(target.into());
        self
    }

    pub fn build(self) -> Result<ClusterParams, ClusterError> {
        if self.seed_nodes.is_empty() {
            return Err(ClusterError::configuration(
                "cluster_nodes must be non-empty",
            ));
        }
        for seed in &self.seed_nodes {
            if seed.host.is_empty() {
                return Err(ClusterError::configuration(format!(
                    "malformed seed node: empty host (port {})",
                    seed.port
                )));
            }
        }
        Ok(ClusterParams {
            seed_nodes: self.seed_nodes,
            max_redirection: self.max_redirection,
            max_connection_error: self.max_connection_error,
            retry: RetryParams {
                interval: Duration::from_secs_f64(self.connect_retry_interval.max(0.0)),
                random_factor: self.connect_retry_random_factor.clamp(0.0, 1.0),
            },
            connection_adapter: self.connection_adapter,
            logger: self.logger,
        })
    }
}
