//! Pairs a connection pool with the node identity it was discovered under
//! (spec §4.6, "one sub-client per node").

use std::sync::Arc;

use crate::conn::{Connection, ConnectionConfig};
use crate::conn::params::ConnectParams;
use crate::error::VkResult;
use crate::pool::{Pool, PoolConfig};
use crate::resp::{CommandEncoder, Token};

/// One cluster member's address and connection pool.
pub struct NodeClient {
    pub id: String,
    pub params: ConnectParams,
    pool: Pool<Connection>,
}

impl NodeClient {
    pub fn new(id: String, params: ConnectParams, connection_config: ConnectionConfig, pool_config: PoolConfig) -> Arc<Self> {
        let factory_params = params.clone();
        let pool = Pool::new(pool_config, move || {
            let params = factory_params.clone();
            let config = connection_config.clone();
            Box::pin(async move { Connection::connect(params, config).await })
        });
        Arc::new(Self { id, params, pool })
    }

    pub async fn execute(&self, encoder: &CommandEncoder) -> VkResult<Token> {
        let conn = self.pool.checkout().await?;
        conn.execute(encoder).await
    }

    /// Like [`NodeClient::execute`], but under the connection's
    /// `blocking_command_timeout` — for commands the server may
    /// legitimately block on (e.g. `BLPOP`).
    pub async fn execute_blocking(&self, encoder: &CommandEncoder) -> VkResult<Token> {
        let conn = self.pool.checkout().await?;
        conn.execute_blocking(encoder).await
    }

    /// Sends `ASKING` immediately ahead of `encoder` on the same checked-out
    /// connection, per spec §4.6's handling of `ASK` redirects — the
    /// `ASKING` frame must precede the redirected command on the very
    /// connection that executes it, and is never retried or recorded in
    /// the routing table.
    pub async fn execute_asking(&self, encoder: &CommandEncoder) -> VkResult<Token> {
        let conn = self.pool.checkout().await?;
        let mut asking = CommandEncoder::new();
        asking.arg("ASKING");
        conn.execute(&asking).await?;
        conn.execute(encoder).await
    }

    /// Runs every encoder in `batch` on one checked-out connection, in
    /// order, via the connection's own pipelining (spec §4.6, "pipeline
    /// routing").
    pub async fn pipeline(&self, batch: &[&CommandEncoder]) -> VkResult<Vec<VkResult<Token>>> {
        let conn = self.pool.checkout().await?;
        conn.pipeline(batch).await
    }
}
