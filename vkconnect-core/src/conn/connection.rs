use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::error::{VkError, VkResult};
use crate::resp::{self, CommandEncoder, FromValue, Token, Value};

use super::config::ConnectionConfig;
use super::handler::{Action, ConnectionHandler};
use super::handshake;
use super::params::IntoConnectParams;
use super::pending::{PendingRequest, RequestKind};
use super::stats::{ConnectionStats, ConnectionStatsSnapshot};
use super::transport::TcpClient;

const READ_BUFFER_SIZE: usize = 16 * 1024;

enum ActorCommand {
    Execute {
        id: i64,
        bytes: BytesMut,
        deadline: Instant,
        responder: oneshot::Sender<VkResult<Token>>,
    },
    Forgettable {
        id: i64,
        bytes: BytesMut,
        deadline: Instant,
    },
    Cancel(i64),
    GracefulShutdown,
    Close,
}

/// A kind/channel-demultiplexed message delivered from a `push` frame to a
/// subscriber (spec §4.3, §9 — demultiplexed by token kind, not request id).
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub kind: PushKind,
    pub channel: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    Message,
    PMessage,
    SMessage,
    Other,
}

type PushRegistry = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<PushMessage>>>>;

/// A stream of messages for one `subscribe`/`psubscribe` call. Dropping it
/// releases this caller's interest in its channels; the last dropped
/// subscriber for a given channel triggers an `UNSUBSCRIBE` (spec §4.3).
pub struct SubscriptionStream {
    rx: mpsc::UnboundedReceiver<PushMessage>,
    channels: Vec<String>,
    sub_counts: Arc<Mutex<HashMap<String, usize>>>,
    unsubscribe: mpsc::UnboundedSender<String>,
}

impl SubscriptionStream {
    pub async fn recv(&mut self) -> Option<PushMessage> {
        self.rx.recv().await
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        let mut counts = self.sub_counts.lock().unwrap();
        for channel in &self.channels {
            if let Some(count) = counts.get_mut(channel) {
                *count -= 1;
                if *count == 0 {
                    counts.remove(channel);
                    let _ = self.unsubscribe.send(channel.clone());
                }
            }
        }
    }
}

/// Public async facade over one connection's handler + transport (spec
/// §2, "Connection (≈10%)").
pub struct Connection {
    commands: mpsc::UnboundedSender<ActorCommand>,
    next_id: AtomicI64,
    stats: Arc<ConnectionStats>,
    push_registry: PushRegistry,
    sub_counts: Arc<Mutex<HashMap<String, usize>>>,
    command_timeout: Duration,
    blocking_command_timeout: Duration,
}

impl Connection {
    pub async fn connect(params: impl IntoConnectParams, config: ConnectionConfig) -> VkResult<Self> {
        let params = params.into_connect_params()?;
        let transport = TcpClient::try_new(&params).await?;
        let (reader, writer) = transport.split();

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(ConnectionStats::default());
        let push_registry: PushRegistry = Arc::new(Mutex::new(HashMap::new()));

        let connection = Connection {
            commands: commands_tx,
            next_id: AtomicI64::new(1),
            stats: stats.clone(),
            push_registry: push_registry.clone(),
            sub_counts: Arc::new(Mutex::new(HashMap::new())),
            command_timeout: config.command_timeout(),
            blocking_command_timeout: config.blocking_command_timeout(),
        };

        let hello_bytes = handshake::build_hello(&config);
        let (hello_tx, hello_rx) = oneshot::channel();
        let hello_deadline = Instant::now() + config.command_timeout();
        let hello_req = PendingRequest::new(0, hello_deadline, RequestKind::Single, hello_tx);

        tokio::spawn(run_actor(
            reader,
            writer,
            commands_rx,
            hello_req,
            hello_bytes,
            stats,
            push_registry,
        ));

        match hello_rx.await {
            Ok(Ok(token)) => {
                let value = Value::from_token(&token)?;
                handshake::validate_hello_reply(&value)?;
                Ok(connection)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(VkError::ConnectionClosed),
        }
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends one command and awaits its response (spec's "execute"), under
    /// the connection's configured `command_timeout`.
    pub async fn execute(&self, encoder: &CommandEncoder) -> VkResult<Token> {
        self.execute_with_timeout(encoder, self.command_timeout).await
    }

    /// Like [`Connection::execute`], but under `blocking_command_timeout`
    /// instead — for commands the server may legitimately block on (e.g.
    /// `BLPOP`), per spec §5's two per-connection deadline defaults.
    pub async fn execute_blocking(&self, encoder: &CommandEncoder) -> VkResult<Token> {
        self.execute_with_timeout(encoder, self.blocking_command_timeout).await
    }

    async fn execute_with_timeout(&self, encoder: &CommandEncoder, timeout: Duration) -> VkResult<Token> {
        let id = self.allocate_id();
        let (tx, rx) = oneshot::channel();
        let command = ActorCommand::Execute {
            id,
            bytes: encoder.finish(),
            deadline: Instant::now() + timeout,
            responder: tx,
        };
        self.commands
            .send(command)
            .map_err(|_| VkError::ConnectionClosed)?;
        rx.await.map_err(|_| VkError::ConnectionClosed)?
    }

    /// Like [`Connection::execute`], but decodes the reply as `T`.
    pub async fn execute_typed<T>(&self, encoder: &CommandEncoder) -> VkResult<T>
    where
        T: for<'a> FromValue<'a>,
    {
        let token = self.execute(encoder).await?;
        let value = Value::from_token(&token)?;
        Ok(T::from_value(value)?)
    }

    /// Sends every encoder in `encoders` without waiting between them,
    /// returning their results in the same order (spec §2, §5 — "pipeline
    /// responses are returned in the same order as the pack's arguments").
    /// Takes encoders by reference so a caller (e.g. the cluster client)
    /// can resend the same pack on a redirected connection without
    /// rebuilding it.
    pub async fn pipeline(&self, encoders: &[&CommandEncoder]) -> VkResult<Vec<VkResult<Token>>> {
        let mut receivers = Vec::with_capacity(encoders.len());
        for encoder in encoders {
            let id = self.allocate_id();
            let (tx, rx) = oneshot::channel();
            let command = ActorCommand::Execute {
                id,
                bytes: encoder.finish(),
                deadline: Instant::now() + self.command_timeout,
                responder: tx,
            };
            self.commands
                .send(command)
                .map_err(|_| VkError::ConnectionClosed)?;
            receivers.push(rx);
        }
        let mut results = Vec::with_capacity(receivers.len());
        for rx in receivers {
            results.push(rx.await.map_err(|_| VkError::ConnectionClosed)?);
        }
        Ok(results)
    }

    async fn subscribe_with(
        &self,
        command_name: &str,
        targets: Vec<String>,
    ) -> VkResult<SubscriptionStream> {
        let mut encoder = CommandEncoder::new();
        encoder.arg(command_name);
        for target in &targets {
            encoder.arg(target);
        }
        // The SUBSCRIBE/PSUBSCRIBE reply itself arrives as a push frame, not
        // a regular response, so this request is forgettable on the FIFO.
        let id = self.allocate_id();
        self.commands
            .send(ActorCommand::Forgettable {
                id,
                bytes: encoder.finish(),
                deadline: Instant::now() + self.command_timeout,
            })
            .map_err(|_| VkError::ConnectionClosed)?;

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut registry = self.push_registry.lock().unwrap();
            let mut counts = self.sub_counts.lock().unwrap();
            for target in &targets {
                registry.insert(target.clone(), tx.clone());
                *counts.entry(target.clone()).or_insert(0) += 1;
            }
        }
        let (unsub_tx, mut unsub_rx) = mpsc::unbounded_channel::<String>();
        let push_registry = self.push_registry.clone();
        let commands = self.commands.clone();
        let command_timeout = self.command_timeout;
        tokio::spawn(async move {
            while let Some(channel) = unsub_rx.recv().await {
                push_registry.lock().unwrap().remove(&channel);
                let mut encoder = CommandEncoder::new();
                encoder.arg("UNSUBSCRIBE").arg(&channel);
                let _ = commands.send(ActorCommand::Forgettable {
                    id: 0,
                    bytes: encoder.finish(),
                    deadline: Instant::now() + command_timeout,
                });
            }
        });

        Ok(SubscriptionStream {
            rx,
            channels: targets,
            sub_counts: self.sub_counts.clone(),
            unsubscribe: unsub_tx,
        })
    }

    pub async fn subscribe(&self, channels: Vec<String>) -> VkResult<SubscriptionStream> {
        self.subscribe_with("SUBSCRIBE", channels).await
    }

    pub async fn psubscribe(&self, patterns: Vec<String>) -> VkResult<SubscriptionStream> {
        self.subscribe_with("PSUBSCRIBE", patterns).await
    }

    pub fn statistics(&self) -> ConnectionStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn cancel(&self, request_id: i64) {
        let _ = self.commands.send(ActorCommand::Cancel(request_id));
    }

    pub async fn graceful_shutdown(&self) {
        let _ = self.commands.send(ActorCommand::GracefulShutdown);
    }

    pub fn close(&self) {
        let _ = self.commands.send(ActorCommand::Close);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.commands.send(ActorCommand::Close);
    }
}

async fn run_actor(
    mut reader: Box<dyn tokio::io::AsyncRead + Send + Unpin>,
    mut writer: Box<dyn tokio::io::AsyncWrite + Send + Unpin>,
    mut commands_rx: mpsc::UnboundedReceiver<ActorCommand>,
    hello_req: PendingRequest,
    hello_bytes: BytesMut,
    stats: Arc<ConnectionStats>,
    push_registry: PushRegistry,
) {
    let mut handler = ConnectionHandler::new();
    let mut read_buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut deadline: Option<Instant> = None;

    let actions = handler.set_connected(hello_req, hello_bytes);
    if !run_actions(actions, &mut writer, &mut deadline, &stats, &push_registry).await {
        return;
    }

    loop {
        let sleep = async {
            match deadline {
                Some(when) => tokio::time::sleep_until(when).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;

            command = commands_rx.recv() => {
                let Some(command) = command else {
                    let actions = handler.close();
                    let _ = run_actions(actions, &mut writer, &mut deadline, &stats, &push_registry).await;
                    return;
                };
                let actions = apply_command(&mut handler, command);
                if !run_actions(actions, &mut writer, &mut deadline, &stats, &push_registry).await {
                    return;
                }
            }

            read = reader.read_buf(&mut read_buf) => {
                match read {
                    Ok(0) => {
                        let actions = handler.set_closed();
                        let _ = run_actions(actions, &mut writer, &mut deadline, &stats, &push_registry).await;
                        return;
                    }
                    Ok(_) => {
                        let mut all_actions = Vec::new();
                        let parse_result = resp::parse_all(&mut read_buf, |token| {
                            all_actions.push(handler.received_response(token));
                        });
                        for actions in all_actions {
                            if !run_actions(actions, &mut writer, &mut deadline, &stats, &push_registry).await {
                                return;
                            }
                        }
                        if parse_result.is_err() {
                            let actions = handler.close();
                            let _ = run_actions(actions, &mut writer, &mut deadline, &stats, &push_registry).await;
                            return;
                        }
                    }
                    Err(_) => {
                        let actions = handler.set_closed();
                        let _ = run_actions(actions, &mut writer, &mut deadline, &stats, &push_registry).await;
                        return;
                    }
                }
            }

            () = sleep => {
                let actions = handler.hit_deadline(Instant::now());
                if !run_actions(actions, &mut writer, &mut deadline, &stats, &push_registry).await {
                    return;
                }
            }
        }

        if handler.is_closed() {
            return;
        }
    }
}

fn apply_command(handler: &mut ConnectionHandler, command: ActorCommand) -> Vec<Action> {
    match command {
        ActorCommand::Execute {
            id,
            bytes,
            deadline,
            responder,
        } => {
            let req = PendingRequest::new(id, deadline, RequestKind::Single, responder);
            handler.send_command(req, bytes)
        }
        ActorCommand::Forgettable { id, bytes, deadline } => {
            let (responder, _rx) = oneshot::channel();
            let req = PendingRequest::new(id, deadline, RequestKind::Forgettable, responder);
            handler.send_command(req, bytes)
        }
        ActorCommand::Cancel(id) => handler.cancel(id),
        ActorCommand::GracefulShutdown => handler.graceful_shutdown(),
        ActorCommand::Close => handler.close(),
    }
}

async fn run_actions(
    actions: Vec<Action>,
    writer: &mut (dyn tokio::io::AsyncWrite + Send + Unpin),
    deadline: &mut Option<Instant>,
    stats: &Arc<ConnectionStats>,
    push_registry: &PushRegistry,
) -> bool {
    for action in actions {
        match action {
            Action::Send(bytes) => {
                if writer.write_all(&bytes).await.is_err() {
                    return false;
                }
                stats.record_request_sent();
            }
            Action::ArmTimer(when) => *deadline = Some(when),
            Action::ClearTimer => *deadline = None,
            Action::CloseTransport => {
                let _ = writer.shutdown().await;
                return false;
            }
            Action::Push(token) => {
                stats.record_reply_received();
                deliver_push(token, push_registry);
            }
        }
    }
    true
}

fn deliver_push(token: Token, push_registry: &PushRegistry) {
    let Ok(value) = Value::from_token(&token) else {
        return;
    };
    let Value::Push(items) = value else {
        return;
    };
    let mut iter = items.iter();
    let Some(Ok(Value::BulkString(kind))) = iter.next() else {
        return;
    };
    let Some(Ok(Value::BulkString(channel))) = iter.next() else {
        return;
    };
    let kind = match kind {
        b"message" => PushKind::Message,
        b"pmessage" => PushKind::PMessage,
        b"smessage" => PushKind::SMessage,
        _ => PushKind::Other,
    };
    let channel = String::from_utf8_lossy(channel).into_owned();
    let payload = match iter.next() {
        Some(Ok(Value::BulkString(bytes))) => bytes.to_vec(),
        _ => Vec::new(),
    };
    let registry = push_registry.lock().unwrap();
    if let Some(sender) = registry.get(&channel) {
        let _ = sender.send(PushMessage {
            kind,
            channel,
            payload,
        });
    }
}
