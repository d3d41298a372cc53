/// Base step for linear retry backoff, in milliseconds. Attempt `n`
/// sleeps `n * RETRY_STEP_MS` before trying again.
pub const RETRY_STEP_MS: u64 = 17;

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Listening port, also packed into every transaction id this node issues.
    pub port: u16,
    /// Bind address; peers are reached at the same host.
    pub host: String,
    /// Peer node ports in fixed broadcast order (includes this node).
    pub nodes: Vec<u16>,
    /// Vote lock acquisition retry budget.
    pub max_retry: u32,
    /// Per-peer retry ceiling for apply/abort broadcasts.
    pub max_full_retry: u32,
}

impl NodeConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("PACT_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24001);

        let host = std::env::var("PACT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let nodes_str = std::env::var("PACT_NODES").unwrap_or_default();
        let mut nodes: Vec<u16> = nodes_str
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        if nodes.is_empty() {
            nodes = vec![port];
        }

        let max_retry = std::env::var("PACT_MAX_RETRY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let max_full_retry = std::env::var("PACT_MAX_FULL_RETRY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        NodeConfig {
            port,
            host,
            nodes,
            max_retry,
            max_full_retry,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            port: 24001,
            host: "127.0.0.1".to_string(),
            nodes: vec![24001],
            max_retry: 5,
            max_full_retry: 100,
        }
    }
}
