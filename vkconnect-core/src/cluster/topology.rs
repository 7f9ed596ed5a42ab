use std::ops::RangeInclusive;

use thiserror::Error;

/// A node's reported role within its shard (spec §3, "Shard node").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Replica,
}

/// A node's reported health (spec §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Online,
    Failed,
    Loading,
}

/// One node as reported by `CLUSTER SHARDS` (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardNode {
    pub id: String,
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub endpoint: String,
    pub port: u16,
    pub tls_port: Option<u16>,
    pub role: Role,
    pub replication_offset: i64,
    pub health: Health,
}

/// A shard: one owning primary and its replicas, covering a set of slots
/// (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    pub slots: Vec<RangeInclusive<u16>>,
    pub nodes: Vec<ShardNode>,
}

impl Shard {
    pub fn online_primary(&self) -> Option<&ShardNode> {
        self.nodes
            .iter()
            .find(|n| n.role == Role::Primary && n.health == Health::Online)
    }

    fn primaries(&self) -> impl Iterator<Item = &ShardNode> {
        self.nodes.iter().filter(|n| n.role == Role::Primary)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CanonicalizeError {
    #[error("shard is missing a primary node")]
    ShardIsMissingPrimaryNode,
    #[error("shard has multiple primary nodes")]
    ShardHasMultiplePrimaryNodes,
}

/// A canonical, order-independent fingerprint of a cluster's shard layout
/// (spec §3, §4.5, §9 — "canonical form deliberately excludes node-ids...
/// and hostnames; ip/endpoint is authoritative").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopologyCandidate {
    shards: Vec<CanonicalShard>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct CanonicalShard {
    primary_endpoint: String,
    primary_port: u16,
    slots: Vec<(u16, u16)>,
    replicas: Vec<(String, u16)>,
}

impl TopologyCandidate {
    /// Canonicalizes a raw shard description: shards sorted by
    /// `(primary-endpoint, primary-port)`, each shard's slots as a sorted
    /// range union, replicas sorted the same way as shards.
    pub fn canonicalize(shards: &[Shard]) -> Result<Self, CanonicalizeError> {
        let mut canonical = Vec::with_capacity(shards.len());
        for shard in shards {
            let primaries: Vec<_> = shard.primaries().collect();
            let online_primaries: Vec<_> = primaries
                .iter()
                .filter(|n| n.health == Health::Online)
                .collect();
            let primary = match online_primaries.len() {
                0 => return Err(CanonicalizeError::ShardIsMissingPrimaryNode),
                1 => online_primaries[0],
                _ => return Err(CanonicalizeError::ShardHasMultiplePrimaryNodes),
            };

            let mut slots: Vec<(u16, u16)> = shard
                .slots
                .iter()
                .map(|r| (*r.start(), *r.end()))
                .collect();
            slots.sort_unstable();

            let mut replicas: Vec<(String, u16)> = shard
                .nodes
                .iter()
                .filter(|n| n.role == Role::Replica)
                .map(|n| (n.endpoint.clone(), n.port))
                .collect();
            replicas.sort_unstable();

            canonical.push(CanonicalShard {
                primary_endpoint: primary.endpoint.clone(),
                primary_port: primary.port,
                slots,
                replicas,
            });
        }
        canonical.sort_unstable();
        Ok(TopologyCandidate { shards: canonical })
    }

    pub fn node_count(&self) -> usize {
        self.shards
            .iter()
            .map(|s| 1 + s.replicas.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(endpoint: &str, port: u16, role: Role, health: Health) -> ShardNode {
        ShardNode {
            id: format!("{endpoint}:{port}"),
            ip: None,
            hostname: None,
            endpoint: endpoint.into(),
            port,
            tls_port: None,
            role,
            replication_offset: 0,
            health,
        }
    }

    #[test]
    fn canonicalizes_order_independently() {
        let shard_a = Shard {
            slots: vec![0..=100],
            nodes: vec![node("b", 2, Role::Primary, Health::Online)],
        };
        let shard_b = Shard {
            slots: vec![101..=200],
            nodes: vec![node("a", 1, Role::Primary, Health::Online)],
        };
        let c1 = TopologyCandidate::canonicalize(&[shard_a.clone(), shard_b.clone()]).unwrap();
        let c2 = TopologyCandidate::canonicalize(&[shard_b, shard_a]).unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn missing_primary_is_an_error() {
        let shard = Shard {
            slots: vec![0..=100],
            nodes: vec![node("a", 1, Role::Replica, Health::Online)],
        };
        assert_eq!(
            TopologyCandidate::canonicalize(&[shard]).unwrap_err(),
            CanonicalizeError::ShardIsMissingPrimaryNode
        );
    }

    #[test]
    fn failed_primary_alongside_online_primary_is_ok() {
        let shard = Shard {
            slots: vec![0..=100],
            nodes: vec![
                node("a", 1, Role::Primary, Health::Failed),
                node("b", 2, Role::Primary, Health::Online),
            ],
        };
        assert!(TopologyCandidate::canonicalize(&[shard]).is_ok());
    }

    #[test]
    fn two_online_primaries_is_an_error() {
        let shard = Shard {
            slots: vec![0..=100],
            nodes: vec![
                node("a", 1, Role::Primary, Health::Online),
                node("b", 2, Role::Primary, Health::Online),
            ],
        };
        assert_eq!(
            TopologyCandidate::canonicalize(&[shard]).unwrap_err(),
            CanonicalizeError::ShardHasMultiplePrimaryNodes
        );
    }
}
