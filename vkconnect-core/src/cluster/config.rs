use std::time::Duration;

/// Cluster-level configuration (spec §6, "cluster:" configuration surface).
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub circuit_breaker_duration: Duration,
    pub default_cluster_refresh_interval: Duration,
    pub read_only_node_selection: ReadOnlyCommandNodeSelection,
    /// Upper bound on MOVED/ASK/REDIRECT hops for a single command before
    /// giving up with `RedirectionLoop` (spec §7 — "bounded retry count").
    pub max_redirections: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_duration: Duration::from_secs(30),
            default_cluster_refresh_interval: Duration::from_secs(60),
            read_only_node_selection: ReadOnlyCommandNodeSelection::Primary,
            max_redirections: 5,
        }
    }
}

/// How a read-only command picks its target node among a shard's members
/// (spec §4.6, "command routing policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOnlyCommandNodeSelection {
    Primary,
    CycleReplicas,
    CycleAllNodes,
}

/// Whether a command must land on the shard's primary or may be routed to
/// a replica per `ReadOnlyCommandNodeSelection` (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteIntent {
    Write,
    Read,
}
