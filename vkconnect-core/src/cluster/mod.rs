//! Cluster-aware client (spec §4.6): topology discovery, slot routing, and
//! MOVED/ASK/REDIRECT handling over a set of per-node sub-clients.

mod client;
mod config;
mod discovery;
mod election;
mod node_client;
mod redirect;
mod shards_reply;
mod slot_map;
mod topology;

pub use client::ClusterClient;
pub use config::{ClusterConfig, ReadOnlyCommandNodeSelection, RouteIntent};
pub use discovery::{Discovery, DiscoveryState};
pub use election::{Election, Metrics};
pub use node_client::NodeClient;
pub use redirect::Redirect;
pub use shards_reply::decode_shards_reply;
pub use slot_map::{ShardNodeIds, SlotMap};
pub use topology::{CanonicalizeError, Health, Role, Shard, ShardNode, TopologyCandidate};
