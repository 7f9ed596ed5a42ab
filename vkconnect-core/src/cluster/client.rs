//! The cluster-aware client (spec §4.6): discovers topology from a seed
//! set, keeps one sub-client per node, and routes commands by slot,
//! following MOVED/ASK/REDIRECT hints as they arrive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::conn::config::ConnectionConfig;
use crate::conn::params::ConnectParams;
use crate::error::{VkError, VkResult};
use crate::hash::Slot;
use crate::pool::PoolConfig;
use crate::resp::{CommandEncoder, Token, Value};

use super::config::{ClusterConfig, ReadOnlyCommandNodeSelection, RouteIntent};
use super::discovery::Discovery;
use super::election::Election;
use super::node_client::NodeClient;
use super::redirect::{self, Redirect};
use super::shards_reply::decode_shards_reply;
use super::slot_map::{ShardNodeIds, SlotMap};
use super::topology::{Role, TopologyCandidate};

/// Cluster-aware client, the cluster-layer counterpart to [`crate::conn::Connection`].
pub struct ClusterClient {
    seeds: Vec<ConnectParams>,
    nodes: RwLock<HashMap<String, Arc<NodeClient>>>,
    slot_map: RwLock<Arc<SlotMap>>,
    election: Mutex<Election>,
    discovery: Arc<Discovery>,
    cluster_config: ClusterConfig,
    connection_config: ConnectionConfig,
    pool_config: PoolConfig,
    read_cursor: AtomicUsize,
}

impl ClusterClient {
    /// Connects to a cluster given a seed set, runs the first discovery
    /// round to quorum, and spawns the periodic refresh loop.
    pub async fn connect(
        seeds: Vec<ConnectParams>,
        cluster_config: ClusterConfig,
        connection_config: ConnectionConfig,
        pool_config: PoolConfig,
    ) -> VkResult<Arc<Self>> {
        if seeds.is_empty() {
            return Err(VkError::ClusterIsUnavailable);
        }

        let client = Arc::new(Self {
            seeds,
            nodes: RwLock::new(HashMap::new()),
            slot_map: RwLock::new(Arc::new(SlotMap::empty())),
            election: Mutex::new(Election::new()),
            discovery: Discovery::new(cluster_config.circuit_breaker_duration),
            cluster_config,
            connection_config,
            pool_config,
            read_cursor: AtomicUsize::new(0),
        });

        client.refresh_once().await;
        client.discovery.wait_for_healthy().await?;
        client.clone().spawn_refresh_loop();
        Ok(client)
    }

    fn spawn_refresh_loop(self: Arc<Self>) {
        let interval = self.cluster_config.default_cluster_refresh_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                self.discovery.start_attempt().await;
                self.refresh_once().await;
            }
        });
    }

    /// Issues `CLUSTER SHARDS` to every currently known node (the seed set
    /// on the very first round) and feeds each reply into the election as
    /// one vote, keyed by the address that answered.
    async fn refresh_once(self: &Arc<Self>) {
        let voters: Vec<(String, Arc<NodeClient>)> = {
            let nodes = self.nodes.read().await;
            if nodes.is_empty() {
                drop(nodes);
                self.seed_node_clients().await
            } else {
                nodes.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
        };

        let mut handles = Vec::with_capacity(voters.len());
        for (addr, node) in voters {
            handles.push(tokio::spawn(async move {
                let mut encoder = CommandEncoder::new();
                encoder.arg("CLUSTER").arg("SHARDS");
                let result = node.execute(&encoder).await;
                (addr, result)
            }));
        }

        for handle in handles {
            let Ok((addr, result)) = handle.await else {
                continue;
            };
            let Ok(token) = result else { continue };
            let Ok(value) = Value::from_token(&token) else {
                continue;
            };
            let Ok(shards) = decode_shards_reply(value) else {
                continue;
            };
            let Ok(candidate) = TopologyCandidate::canonicalize(&shards) else {
                continue;
            };

            let metrics = self.election.lock().await.vote_received(candidate, &addr);
            if let Some(winner_shards) = metrics.winner.map(|_| shards) {
                self.adopt_topology(winner_shards).await;
                self.discovery.mark_healthy().await;
                return;
            }
        }
    }

    /// Rebuilds the node map and slot map from a winning topology, keeping
    /// sub-clients for nodes still present and dropping ones that vanished.
    async fn adopt_topology(&self, shards: Vec<super::topology::Shard>) {
        let mut table = Vec::with_capacity(shards.len());
        let mut wanted: HashMap<String, (String, u16)> = HashMap::new();

        for shard in &shards {
            let Some(primary) = shard.online_primary() else {
                continue;
            };
            let primary_addr = format!("{}:{}", primary.endpoint, primary.port);
            wanted.insert(primary_addr.clone(), (primary.endpoint.clone(), primary.port));

            let replica_addrs: Vec<String> = shard
                .nodes
                .iter()
                .filter(|n| n.role == Role::Replica)
                .map(|n| {
                    let addr = format!("{}:{}", n.endpoint, n.port);
                    wanted.insert(addr.clone(), (n.endpoint.clone(), n.port));
                    addr
                })
                .collect();

            table.push((
                shard.slots.clone(),
                ShardNodeIds {
                    primary: primary_addr,
                    replicas: replica_addrs,
                },
            ));
        }

        {
            let mut nodes = self.nodes.write().await;
            nodes.retain(|addr, _| wanted.contains_key(addr));
            for (addr, (host, port)) in wanted {
                nodes
                    .entry(addr)
                    .or_insert_with(|| self.build_node_client(host, port));
            }
        }

        let mut new_map = SlotMap::empty();
        new_map.update(table);
        *self.slot_map.write().await = Arc::new(new_map);
    }

    async fn seed_node_clients(&self) -> Vec<(String, Arc<NodeClient>)> {
        let mut nodes = self.nodes.write().await;
        let mut voters = Vec::with_capacity(self.seeds.len());
        for params in &self.seeds {
            let addr = params.address().to_string();
            let node = nodes
                .entry(addr.clone())
                .or_insert_with(|| self.build_node_client_from_params(params.clone()))
                .clone();
            voters.push((addr, node));
        }
        voters
    }

    fn build_node_client(&self, host: String, port: u16) -> Arc<NodeClient> {
        let params = self.connect_params_for(host, port);
        self.build_node_client_from_params(params)
    }

    fn build_node_client_from_params(&self, params: ConnectParams) -> Arc<NodeClient> {
        let id = params.address().to_string();
        NodeClient::new(
            id,
            params,
            self.connection_config.clone(),
            self.pool_config.clone(),
        )
    }

    fn connect_params_for(&self, host: String, port: u16) -> ConnectParams {
        let mut builder = ConnectParams::builder().with_hostname(host).with_port(port);
        if let Some(creds) = self.connection_config.auth() {
            builder = builder
                .with_username(creds.username.clone())
                .with_password(creds.password.unsecure().to_string());
        }
        builder = builder.with_tls(self.connection_config.tls().clone());
        if let Some(name) = self.connection_config.client_name() {
            builder = builder.with_client_name(name.to_string());
        }
        builder = builder
            .with_read_only(self.connection_config.read_only())
            .with_database(self.connection_config.database())
            .with_command_timeout(self.connection_config.command_timeout())
            .with_blocking_command_timeout(self.connection_config.blocking_command_timeout());
        // seed/discovered addresses are always host:port pairs; building
        // from a template this way cannot hit the "missing hostname" error.
        builder.build().expect("cluster node address is always valid")
    }

    async fn node_by_addr(&self, addr: &str) -> Option<Arc<NodeClient>> {
        self.nodes.read().await.get(addr).cloned()
    }

    async fn node_or_connect(&self, host: &str, port: u16) -> Arc<NodeClient> {
        let addr = format!("{host}:{port}");
        if let Some(node) = self.node_by_addr(&addr).await {
            return node;
        }
        let node = self.build_node_client(host.to_string(), port);
        self.nodes.write().await.insert(addr, node.clone());
        node
    }

    /// Picks the target node address for one shard given the routing
    /// intent, applying `readOnlyCommandNodeSelection` for reads (spec
    /// §4.6, "command routing policy").
    fn pick_node_addr(&self, shard: &ShardNodeIds, intent: RouteIntent) -> String {
        if intent == RouteIntent::Write {
            return shard.primary.clone();
        }
        match self.cluster_config.read_only_node_selection {
            ReadOnlyCommandNodeSelection::Primary => shard.primary.clone(),
            ReadOnlyCommandNodeSelection::CycleReplicas => {
                if shard.replicas.is_empty() {
                    shard.primary.clone()
                } else {
                    let i = self.read_cursor.fetch_add(1, Ordering::Relaxed) % shard.replicas.len();
                    shard.replicas[i].clone()
                }
            }
            ReadOnlyCommandNodeSelection::CycleAllNodes => {
                let mut candidates = vec![shard.primary.clone()];
                candidates.extend(shard.replicas.iter().cloned());
                let i = self.read_cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
                candidates[i].clone()
            }
        }
    }

    /// Sends one command, resolving its target shard from `slots` (spec
    /// §4.5 — empty for a single-key-less command, one slot for the common
    /// case, several for multi-key commands that must all land on one
    /// shard) and following redirects up to `maxRedirections` hops.
    pub async fn execute(
        &self,
        encoder: &CommandEncoder,
        slots: &[Slot],
        intent: RouteIntent,
    ) -> VkResult<Token> {
        self.discovery.wait_for_healthy().await?;

        let mut target_override: Option<(String, u16)> = None;
        let mut ask_once = false;

        for _ in 0..=self.cluster_config.max_redirections {
            let addr = if let Some((host, port)) = target_override.take() {
                let node = self.node_or_connect(&host, port).await;
                if ask_once {
                    ask_once = false;
                    return self.finish_or_redirect(node.execute_asking(encoder).await).await;
                }
                node.id.clone()
            } else {
                let slot_map = self.slot_map.read().await.clone();
                let shard = slot_map.resolve(slots)?;
                self.pick_node_addr(shard, intent)
            };

            let node = match self.node_by_addr(&addr).await {
                Some(node) => node,
                None => {
                    let (host, port) = split_addr(&addr)?;
                    self.node_or_connect(&host, port).await
                }
            };

            let result = node.execute(encoder).await;
            match self.classify(result).await? {
                Outcome::Done(token) => return Ok(token),
                Outcome::Retry { host, port, ask } => {
                    target_override = Some((host, port));
                    ask_once = ask;
                }
            }
        }

        Err(VkError::RedirectionLoop)
    }

    async fn finish_or_redirect(&self, result: VkResult<Token>) -> VkResult<Token> {
        match self.classify(result).await? {
            Outcome::Done(token) => Ok(token),
            Outcome::Retry { .. } => Err(VkError::RedirectionLoop),
        }
    }

    /// Interprets a command result as either a final answer or a
    /// redirect to follow, updating the slot map in place for `MOVED`
    /// (spec §6: "subsequent GETs for the same slot go directly to B
    /// without further redirect").
    async fn classify(&self, result: VkResult<Token>) -> VkResult<Outcome> {
        let err = match result {
            Ok(token) => return Ok(Outcome::Done(token)),
            Err(err) => err,
        };

        let VkError::CommandError { prefix, message } = &err else {
            return Err(err);
        };

        match redirect::parse(prefix, message) {
            Some(Redirect::Moved { slot, host, port }) => {
                self.apply_moved(slot, &host, port).await;
                Ok(Outcome::Retry {
                    host,
                    port,
                    ask: false,
                })
            }
            Some(Redirect::Ask { host, port, .. }) => Ok(Outcome::Retry {
                host,
                port,
                ask: true,
            }),
            Some(Redirect::Redirect { host, port }) => Ok(Outcome::Retry {
                host,
                port,
                ask: false,
            }),
            None => Err(err),
        }
    }

    async fn apply_moved(&self, slot: Slot, host: &str, port: u16) {
        let addr = format!("{host}:{port}");
        let node = ShardNodeIds {
            primary: addr,
            replicas: Vec::new(),
        };
        let mut slot_map = self.slot_map.write().await;
        *slot_map = Arc::new(slot_map.with_reassigned_slot(slot, node));
    }

    /// Runs `batch` grouped by shard (spec §4.6, "pipeline routing"): each
    /// group executes as one pipeline on its shard's connection, in the
    /// caller's original order. A `MOVED` reply re-pipelines only the
    /// affected sub-group on the redirected node; `batch`'s encoders are
    /// borrowed throughout so a redirected entry can be resent unchanged.
    pub async fn pipeline(
        &self,
        batch: &[(CommandEncoder, Vec<Slot>)],
    ) -> VkResult<Vec<VkResult<Token>>> {
        self.discovery.wait_for_healthy().await?;

        let mut results: Vec<Option<VkResult<Token>>> = (0..batch.len()).map(|_| None).collect();
        // Each pending entry names its index into `batch` plus where it
        // should route this round: by its original key slots, or pinned to
        // a specific node address after a MOVED/ASK hop.
        let mut pending: Vec<(usize, Route)> = (0..batch.len())
            .map(|i| (i, Route::BySlots(batch[i].1.clone())))
            .collect();

        for _ in 0..=self.cluster_config.max_redirections {
            if pending.is_empty() {
                break;
            }

            let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
            {
                let slot_map = self.slot_map.read().await.clone();
                for (index, route) in pending.drain(..) {
                    let addr = match route {
                        Route::Direct(addr) => Ok(addr),
                        Route::BySlots(slots) => slot_map
                            .resolve(&slots)
                            .map(|shard| self.pick_node_addr(shard, RouteIntent::Write)),
                    };
                    match addr {
                        Ok(addr) => groups.entry(addr).or_default().push(index),
                        Err(e) => results[index] = Some(Err(e)),
                    }
                }
            }

            let mut next_round = Vec::new();
            for (addr, indices) in groups {
                let node = match self.node_by_addr(&addr).await {
                    Some(node) => node,
                    None => match split_addr(&addr) {
                        Ok((host, port)) => self.node_or_connect(&host, port).await,
                        Err(e) => {
                            for index in indices {
                                results[index] = Some(Err(clone_vk_error(&e)));
                            }
                            continue;
                        }
                    },
                };
                let encoders: Vec<&CommandEncoder> = indices.iter().map(|&i| &batch[i].0).collect();
                match node.pipeline(&encoders).await {
                    Ok(outcomes) => {
                        for (index, outcome) in indices.into_iter().zip(outcomes) {
                            match outcome {
                                Ok(token) => results[index] = Some(Ok(token)),
                                Err(VkError::CommandError { prefix, message }) => {
                                    match redirect::parse(&prefix, &message) {
                                        Some(Redirect::Moved { slot, host, port }) => {
                                            self.apply_moved(slot, &host, port).await;
                                            next_round.push((index, Route::Direct(format!("{host}:{port}"))));
                                        }
                                        Some(Redirect::Ask { host, port, .. })
                                        | Some(Redirect::Redirect { host, port }) => {
                                            next_round.push((index, Route::Direct(format!("{host}:{port}"))));
                                        }
                                        None => {
                                            results[index] =
                                                Some(Err(VkError::CommandError { prefix, message }));
                                        }
                                    }
                                }
                                Err(e) => results[index] = Some(Err(e)),
                            }
                        }
                    }
                    Err(e) => {
                        for index in indices {
                            results[index] = Some(Err(clone_vk_error(&e)));
                        }
                    }
                }
            }
            pending = next_round;
        }

        for (index, _) in pending {
            results[index] = Some(Err(VkError::RedirectionLoop));
        }

        Ok(results
            .into_iter()
            .map(|r| r.unwrap_or(Err(VkError::RedirectionLoop)))
            .collect())
    }
}

enum Route {
    BySlots(Vec<Slot>),
    Direct(String),
}

enum Outcome {
    Done(Token),
    Retry { host: String, port: u16, ask: bool },
}

fn split_addr(addr: &str) -> VkResult<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| VkError::ConnParams(format!("malformed node address {addr:?}")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| VkError::ConnParams(format!("malformed node address {addr:?}")))?;
    Ok((host.to_string(), port))
}

/// `VkError` isn't `Clone` (it wraps non-`Clone` library error types), but
/// one pipeline-group failure must be reported to every index in that
/// group. Reconstructs the kinds worth distinguishing and otherwise falls
/// back to a generic connection failure.
fn clone_vk_error(err: &VkError) -> VkError {
    match err {
        VkError::CommandError { prefix, message } => VkError::CommandError {
            prefix: prefix.clone(),
            message: message.clone(),
        },
        VkError::ConnectionClosed => VkError::ConnectionClosed,
        VkError::Timeout => VkError::Timeout,
        _ => VkError::ConnectionClosed,
    }
}
