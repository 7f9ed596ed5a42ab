use thiserror::Error;

use crate::resp::{DecodeError, ParseError};

/// A list specifying categories of [`VkError`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum VkError {
    /// The connection was already closed when the command was submitted.
    #[error("connection is closed")]
    ConnectionClosed,

    /// The connection is in the process of shutting down gracefully.
    #[error("connection is closing")]
    ConnectionClosing,

    /// A sibling request on the same connection was cancelled, which forced the
    /// whole connection to be torn down.
    #[error("connection was closed because another request on it was cancelled")]
    ConnectionClosedDueToCancellation,

    /// This specific request was cancelled by the caller.
    #[error("request was cancelled")]
    Cancelled,

    /// The request's deadline elapsed before a response arrived.
    #[error("request timed out")]
    Timeout,

    /// A response token arrived while no request was pending for it.
    #[error("received a response with no pending request to pair it with")]
    UnsolicitedToken,

    /// The server responded with a RESP3 error (simple error or bulk error).
    #[error("server responded with an error: {prefix} {message}")]
    CommandError { prefix: String, message: String },

    /// Wire framing failed while parsing bytes from the transport.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A parsed token could not be converted to the requested type.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// I/O error while talking to the transport.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// TLS handshake or record-layer error.
    #[error(transparent)]
    Tls(#[from] rustls::Error),

    /// Connection parameters were malformed, e.g. an invalid connection URL.
    #[error("invalid connection parameters: {0}")]
    ConnParams(String),

    /// The cluster has no reachable nodes at all.
    #[error("cluster has no nodes")]
    ClusterHasNoNodes,

    /// The cluster client has no usable seed set or topology to route
    /// against, distinct from [`VkError::ClusterHasNoNodes`]'s "the known
    /// table is empty" — this is "there was never a table to begin with".
    #[error("cluster is unavailable")]
    ClusterIsUnavailable,

    /// A slot referenced by a command has no assigned shard.
    #[error("cluster is missing a slot assignment for slot {0}")]
    ClusterIsMissingSlotAssignment(u16),

    /// A command's keys hash to more than one shard.
    #[error("command keys require multiple nodes")]
    KeysInCommandRequireMultipleNodes,

    /// Keys in a single command request straddle more than one shard.
    #[error("command keys map to different hash slots")]
    CrossSlot,

    /// A reported shard has no online primary node.
    #[error("shard is missing a primary node")]
    ShardIsMissingPrimaryNode,

    /// A reported shard has more than one online primary node.
    #[error("shard has multiple primary nodes")]
    ShardHasMultiplePrimaryNodes,

    /// The cluster client's discovery circuit breaker is open: no topology
    /// reached quorum within the configured window.
    #[error("no consensus reached, circuit breaker is open")]
    NoConsensusReachedCircuitBreakerOpen,

    /// Following MOVED/ASK redirections exceeded the bounded retry count.
    #[error("redirection loop detected")]
    RedirectionLoop,

    /// `EXEC` failed because a watched key changed.
    #[error("transaction aborted: a watched key was modified")]
    TransactionAborted,

    /// Caller error: wrong API usage.
    #[error("usage error: {0}")]
    Usage(&'static str),
}

/// Abbreviation of `Result<T, VkError>`.
pub type VkResult<T> = std::result::Result<T, VkError>;
