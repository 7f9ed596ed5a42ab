//! Asynchronous pure-Rust client for Valkey/Redis-compatible servers,
//! speaking RESP3 end to end.
//!
//! `vkconnect` is a thin public projection over [`vkconnect_core`], the same
//! way `hdbconnect`/`hdbconnect_async` sit over `hdbconnect_impl`: the
//! implementation lives in the core crate, this crate just re-exports the
//! surface applications are meant to depend on, so the split can evolve
//! (e.g. a future sync flavor sharing the same impl crate) without touching
//! callers.
//!
//! A single connection is opened with [`Connection::connect`], and speaks
//! one request at a time or pipelined, with strict FIFO response ordering.
//! Talking to a Valkey Cluster deployment instead of one node is
//! [`ClusterClient`]'s job: it discovers the slot/shard topology from a set
//! of seed addresses, elects it by majority vote across the nodes it asks,
//! and transparently follows `MOVED`/`ASK` redirects while routing commands
//! to the right node by hash slot.
//!
//! ```rust,no_run
//! # use vkconnect::{Connection, ConnectionConfig};
//! # use vkconnect::resp::{CommandEncoder, Value, as_string};
//! # async fn foo() -> vkconnect::VkResult<()> {
//! let conn = Connection::connect("valkey://localhost:6379", ConnectionConfig::new()).await?;
//! let mut encoder = CommandEncoder::new();
//! encoder.arg("GET").arg("my-key");
//! let token = conn.execute(&encoder).await?;
//! let value = as_string(Value::from_token(&token)?)?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_debug_implementations)]

pub use vkconnect_core::error::{VkError, VkResult};

pub use vkconnect_core::conn::{
    Connection, ConnectionConfig, ConnectionStats, ConnectionStatsSnapshot, PushKind, PushMessage,
    SubscriptionStream,
};

pub use vkconnect_core::conn::params::{
    Address, ConnectParams, ConnectParamsBuilder, Credentials, IntoConnectParams, ServerCerts, Tls,
    DEFAULT_PORT,
};

pub use vkconnect_core::cluster::{
    CanonicalizeError, ClusterClient, ClusterConfig, Discovery, DiscoveryState, Health, NodeClient,
    ReadOnlyCommandNodeSelection, Redirect, Role, RouteIntent, Shard, ShardNode, ShardNodeIds,
    SlotMap, TopologyCandidate,
};

pub use vkconnect_core::pool::{Checkout, Pool, PoolConfig};

pub use vkconnect_core::retry::{Backoff, RetryConfig, RetryCounter};

/// CRC16-XMODEM hash slot computation and hash-tag extraction, needed by any
/// caller that wants to predict which shard a key lands on ahead of time
/// (e.g. to batch keys by slot before a pipeline).
pub mod hash {
    pub use vkconnect_core::hash::{hash_tag, slot_of, Slot, SLOT_COUNT};
}

/// The RESP3 wire codec: the lazily-parsed [`resp::Value`] view over a
/// decoded [`resp::Token`], typed decoders, and [`resp::CommandEncoder`] for
/// building requests.
pub mod resp {
    pub use vkconnect_core::resp::{
        as_bool, as_bytes, as_dict, as_error, as_f64, as_i64, as_optional, as_string, as_vec,
        encode_command, ArrayView, CommandEncoder, DecodeError, FromValue, MapView, ParseError,
        Token, TokenKind, Value,
    };
}
