//! Per-connection relay logic, independent of the socket type.
//!
//! A [`Connection`] turns inbound client frames into bus publications and bus
//! deliveries on the user's reply topic into outbound frames. All outbound
//! frames go through one bounded queue drained by a single writer
//! ([`OutboundQueue`]), so reader-side error frames and bus-side replies never
//! interleave on the socket.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chatrelay_types::chat::ChatMessage;
use chatrelay_types::config::RelayConfig;
use chatrelay_types::error::{BusError, GatewayError};
use chatrelay_types::identity::Identity;
use chatrelay_types::wire::{ErrorCode, InboundFrame, OutboundFrame, ReplyEnvelope, ServerFrame};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::state::{AtomicConnectionState, ConnectionState};
use crate::bus::topic::{self, reply_topic};
use crate::bus::{Delivery, DeliveryHandler, PubSub, SubscriptionId};
use crate::chat::ChatStore;
use crate::permission::PermissionCheck;

/// Settings a connection needs from the relay configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub inbound_topic: String,
    pub relay_timeout: Duration,
    pub outbound_queue_capacity: usize,
}

impl From<&RelayConfig> for ConnectionConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            inbound_topic: config.inbound_topic.clone(),
            relay_timeout: config.relay_timeout(),
            outbound_queue_capacity: config.outbound_queue_capacity,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

/// Routing data remembered for a published message until its reply arrives.
#[derive(Debug, Clone)]
pub struct PendingReply {
    pub chat_id: Option<String>,
    /// Whether the assistant reply is appended to `chat_id`.
    pub persist: bool,
    pub agent_id: String,
    /// Set for `dev` frames: an unanswered correlation yields a `timeout` frame.
    pub request_mode: bool,
}

/// State shared between the reader side and the reply handler.
///
/// This is the explicit per-connection context handed to the bus at subscribe
/// time; the handler sees nothing else.
struct ConnectionContext<M: ChatStore> {
    conn_id: Uuid,
    identity: Identity,
    state: Arc<AtomicConnectionState>,
    pending: DashMap<String, PendingReply>,
    outbound: mpsc::Sender<ServerFrame>,
    chats: Arc<M>,
    cancel: CancellationToken,
}

impl<M: ChatStore> ConnectionContext<M> {
    /// Queue a frame for the writer. Frames for a connection that is no longer
    /// open are dropped.
    async fn send(&self, frame: ServerFrame) -> Result<(), GatewayError> {
        if !self.state.is_open() {
            debug!(conn_id = %self.conn_id, "connection not open, frame dropped");
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(()),
            sent = self.outbound.send(frame) => sent.map_err(|_| GatewayError::WriterClosed),
        }
    }

    async fn persist(&self, chat_id: &str, message: ChatMessage) {
        match self.chats.append_message(chat_id, &message).await {
            Ok(true) => {}
            Ok(false) => warn!(
                conn_id = %self.conn_id,
                %chat_id,
                sender = %message.sender,
                "chat not found, message not persisted"
            ),
            Err(e) => warn!(
                conn_id = %self.conn_id,
                %chat_id,
                sender = %message.sender,
                error = %e,
                "failed to persist message"
            ),
        }
    }
}

/// Delivery handler for the user's reply topic.
struct ReplyHandler<M: ChatStore> {
    ctx: Arc<ConnectionContext<M>>,
}

impl<M: ChatStore + 'static> DeliveryHandler for ReplyHandler<M> {
    async fn handle(&self, delivery: Delivery) {
        let ctx = &self.ctx;
        let reply: ReplyEnvelope = match serde_json::from_str(&delivery.payload) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(conn_id = %ctx.conn_id, topic = %delivery.topic, error = %e, "malformed reply dropped");
                return;
            }
        };

        // Only the connection that published the message owns its correlation.
        let pending = ctx
            .pending
            .remove(&reply.correlation_id)
            .map(|(_, pending)| pending);

        let (chat_id, agent_id) = match &pending {
            Some(p) => (p.chat_id.clone(), p.agent_id.clone()),
            None => (None, String::new()),
        };

        let frame = ServerFrame::Reply(OutboundFrame {
            conversation_id: reply.correlation_id.clone(),
            chat_id: chat_id.clone().unwrap_or_default(),
            user_id: ctx.identity.subject_id.clone(),
            agent_id,
            message: reply.text.clone(),
        });
        if let Err(e) = ctx.send(frame).await {
            debug!(conn_id = %ctx.conn_id, error = %e, "reply not delivered");
        }
        debug!(
            conn_id = %ctx.conn_id,
            correlation_id = %reply.correlation_id,
            owned = pending.is_some(),
            "reply relayed"
        );

        if let Some(PendingReply {
            chat_id: Some(chat_id),
            persist: true,
            ..
        }) = &pending
        {
            ctx.persist(chat_id, ChatMessage::assistant(reply.text)).await;
        }
    }
}

/// Writer side of a connection.
///
/// `recv` yields `None` once the connection leaves `Open`, so nothing is
/// written after a close begins.
pub struct OutboundQueue {
    rx: mpsc::Receiver<ServerFrame>,
    state: Arc<AtomicConnectionState>,
    cancel: CancellationToken,
}

impl OutboundQueue {
    pub async fn recv(&mut self) -> Option<ServerFrame> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            frame = self.rx.recv() => frame.filter(|_| self.state.is_open()),
        }
    }
}

/// Chat a frame is relayed under.
struct ChatRoute {
    chat_id: Option<String>,
    /// False when ownership could not be confirmed; the id is only echoed.
    persist: bool,
}

/// One authenticated client connection.
///
/// Frames are handled one at a time in arrival order (`&mut self`), while
/// replies arrive concurrently on the bus delivery task.
pub struct Connection<B: PubSub, P: PermissionCheck, M: ChatStore> {
    ctx: Arc<ConnectionContext<M>>,
    bus: Arc<B>,
    permissions: Arc<P>,
    config: ConnectionConfig,
    subscription: Option<SubscriptionId>,
    authorized_agents: HashSet<String>,
    current_chat: Option<String>,
    owned_chats: HashSet<String>,
}

impl<B, P, M> Connection<B, P, M>
where
    B: PubSub,
    P: PermissionCheck,
    M: ChatStore + 'static,
{
    /// Create a connection in `Connecting` and the queue its writer drains.
    pub fn new(
        identity: Identity,
        bus: Arc<B>,
        permissions: Arc<P>,
        chats: Arc<M>,
        config: ConnectionConfig,
    ) -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::channel(config.outbound_queue_capacity.max(1));
        let state = Arc::new(AtomicConnectionState::new());
        let cancel = CancellationToken::new();

        let ctx = Arc::new(ConnectionContext {
            conn_id: Uuid::now_v7(),
            identity,
            state: Arc::clone(&state),
            pending: DashMap::new(),
            outbound: tx,
            chats,
            cancel: cancel.clone(),
        });

        let queue = OutboundQueue { rx, state, cancel };
        let conn = Self {
            ctx,
            bus,
            permissions,
            config,
            subscription: None,
            authorized_agents: HashSet::new(),
            current_chat: None,
            owned_chats: HashSet::new(),
        };
        (conn, queue)
    }

    pub fn id(&self) -> Uuid {
        self.ctx.conn_id
    }

    pub fn identity(&self) -> &Identity {
        &self.ctx.identity
    }

    pub fn state(&self) -> ConnectionState {
        self.ctx.state.get()
    }

    /// Whether the reply topic subscription is active.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.ctx.pending.len()
    }

    /// Connection-scoped cancellation. Cancelling it stops the writer, the
    /// reader loop and request-mode deadlines together.
    pub fn cancel_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Handshake complete: `Connecting -> Open`.
    pub fn mark_open(&self) {
        if self.ctx.state.open() {
            info!(
                conn_id = %self.ctx.conn_id,
                user_id = %self.ctx.identity.subject_id,
                "connection open"
            );
        }
    }

    /// Process one inbound text frame.
    ///
    /// Malformed frames and authorisation failures keep the connection open.
    /// An `Err` means the connection can no longer relay and must be closed.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), GatewayError> {
        if !self.ctx.state.is_open() {
            return Ok(());
        }

        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conn_id = %self.ctx.conn_id, error = %e, "malformed frame dropped");
                return Ok(());
            }
        };

        if frame.user_id != self.ctx.identity.subject_id {
            warn!(
                conn_id = %self.ctx.conn_id,
                user_id = %self.ctx.identity.subject_id,
                frame_user_id = %frame.user_id,
                "frame user does not match session"
            );
            return self
                .ctx
                .send(ServerFrame::error(
                    ErrorCode::Forbidden,
                    "userId does not match the authenticated user",
                ))
                .await;
        }

        if let Some(denial) = self.authorize(&frame.agent_id).await {
            return self.ctx.send(denial).await;
        }

        self.ensure_subscribed().await?;

        let route = match self.resolve_chat(frame.chat_id).await {
            Ok(route) => route,
            Err(denial) => return self.ctx.send(denial).await,
        };
        if let (Some(chat_id), true) = (&route.chat_id, route.persist) {
            self.ctx
                .persist(chat_id, ChatMessage::user(frame.text.clone()))
                .await;
        }

        let envelope = topic::envelope(frame.user_id, frame.agent_id.clone(), frame.text);
        let correlation_id = envelope.correlation_id.clone();
        let payload = serde_json::to_string(&envelope).map_err(|e| BusError::Publish {
            topic: self.config.inbound_topic.clone(),
            reason: e.to_string(),
        })?;

        self.ctx.pending.insert(
            correlation_id.clone(),
            PendingReply {
                chat_id: route.chat_id,
                persist: route.persist,
                agent_id: frame.agent_id,
                request_mode: frame.dev,
            },
        );

        match self.bus.publish(&self.config.inbound_topic, payload).await {
            Ok(receivers) => debug!(
                conn_id = %self.ctx.conn_id,
                correlation_id = %correlation_id,
                receivers,
                "frame published"
            ),
            Err(e) => {
                self.ctx.pending.remove(&correlation_id);
                warn!(conn_id = %self.ctx.conn_id, error = %e, "publish failed");
                return Err(e.into());
            }
        }

        self.watch_deadline(correlation_id, frame.dev);
        Ok(())
    }

    /// Tear the connection down. Idempotent.
    ///
    /// Cancels the connection scope, removes the reply subscription (awaited),
    /// and drops every pending correlation.
    pub async fn close(&mut self) {
        if !self.ctx.state.begin_close() {
            return;
        }
        self.ctx.cancel.cancel();

        if let Some(subscription) = self.subscription.take() {
            self.bus.unsubscribe(subscription).await;
        }
        self.ctx.pending.clear();
        self.ctx.state.finish_close();

        info!(
            conn_id = %self.ctx.conn_id,
            user_id = %self.ctx.identity.subject_id,
            "connection closed"
        );
    }

    /// Check (once per agent) that the user may talk to `agent_id`.
    /// Returns the error frame to send on denial.
    async fn authorize(&mut self, agent_id: &str) -> Option<ServerFrame> {
        if self.authorized_agents.contains(agent_id) {
            return None;
        }

        let user_id = &self.ctx.identity.subject_id;
        match self.permissions.has_permission(user_id, agent_id).await {
            Ok(true) => {
                self.authorized_agents.insert(agent_id.to_string());
                None
            }
            Ok(false) => {
                info!(conn_id = %self.ctx.conn_id, %user_id, %agent_id, "permission denied");
                Some(ServerFrame::error(
                    ErrorCode::Forbidden,
                    format!("no permission for agent {agent_id}"),
                ))
            }
            Err(e) => {
                warn!(conn_id = %self.ctx.conn_id, %user_id, %agent_id, error = %e, "permission check failed");
                Some(ServerFrame::error(
                    ErrorCode::Unavailable,
                    "permission check unavailable",
                ))
            }
        }
    }

    async fn ensure_subscribed(&mut self) -> Result<(), BusError> {
        if self.subscription.is_some() {
            return Ok(());
        }
        let topic = reply_topic(&self.ctx.identity.subject_id);
        let handler = ReplyHandler {
            ctx: Arc::clone(&self.ctx),
        };
        let id = self.bus.subscribe(&topic, handler).await?;
        self.subscription = Some(id);
        debug!(conn_id = %self.ctx.conn_id, %topic, "subscribed to replies");
        Ok(())
    }

    /// Use the frame's chat, else this connection's chat, creating it on first need.
    ///
    /// A requested chat owned by someone else is refused with the error frame
    /// to send. Chats that cannot be looked up are relayed without persisting.
    async fn resolve_chat(&mut self, requested: Option<String>) -> Result<ChatRoute, ServerFrame> {
        if let Some(chat_id) = requested.filter(|id| !id.is_empty()) {
            return self.check_owner(chat_id).await;
        }
        if let Some(chat_id) = &self.current_chat {
            return Ok(ChatRoute {
                chat_id: Some(chat_id.clone()),
                persist: true,
            });
        }

        let chat_id = match self.ctx.chats.create_chat(&self.ctx.identity.subject_id).await {
            Ok(chat) => {
                debug!(conn_id = %self.ctx.conn_id, chat_id = %chat.id, "created chat for connection");
                self.owned_chats.insert(chat.id.clone());
                self.current_chat = Some(chat.id.clone());
                Some(chat.id)
            }
            Err(e) => {
                warn!(conn_id = %self.ctx.conn_id, error = %e, "failed to create chat, relaying without one");
                None
            }
        };
        Ok(ChatRoute {
            chat_id,
            persist: true,
        })
    }

    async fn check_owner(&mut self, chat_id: String) -> Result<ChatRoute, ServerFrame> {
        if self.owned_chats.contains(&chat_id) {
            return Ok(ChatRoute {
                chat_id: Some(chat_id),
                persist: true,
            });
        }

        let user_id = &self.ctx.identity.subject_id;
        match self.ctx.chats.get_chat(&chat_id).await {
            Ok(Some(chat)) if chat.owner_id == *user_id => {
                self.owned_chats.insert(chat_id.clone());
                Ok(ChatRoute {
                    chat_id: Some(chat_id),
                    persist: true,
                })
            }
            Ok(Some(_)) => {
                info!(conn_id = %self.ctx.conn_id, %user_id, %chat_id, "chat belongs to another user");
                Err(ServerFrame::error(
                    ErrorCode::Forbidden,
                    format!("chat {chat_id} belongs to another user"),
                ))
            }
            Ok(None) => {
                warn!(conn_id = %self.ctx.conn_id, %chat_id, "chat not found, message not persisted");
                Ok(ChatRoute {
                    chat_id: Some(chat_id),
                    persist: false,
                })
            }
            Err(e) => {
                warn!(conn_id = %self.ctx.conn_id, %chat_id, error = %e, "chat lookup failed, message not persisted");
                Ok(ChatRoute {
                    chat_id: Some(chat_id),
                    persist: false,
                })
            }
        }
    }

    /// Drop the correlation at its deadline. Request-mode frames also get a
    /// `timeout` error frame.
    fn watch_deadline(&self, correlation_id: String, request_mode: bool) {
        let ctx = Arc::clone(&self.ctx);
        let timeout = self.config.relay_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = ctx.cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if ctx.pending.remove(&correlation_id).is_none() {
                        return;
                    }
                    debug!(conn_id = %ctx.conn_id, %correlation_id, request_mode, "correlation expired");
                    if request_mode {
                        let frame = ServerFrame::correlated_error(
                            ErrorCode::Timeout,
                            format!("no reply within {}s", timeout.as_secs()),
                            correlation_id,
                        );
                        let _ = ctx.send(frame).await;
                    }
                }
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
