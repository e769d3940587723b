use crate::core::config::GatewayConfig;
use crate::core::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::core::events::GatewayEvent;
use crate::core::protocol::{self, GatewayEnvelope};
use crate::core::session::{GatewayContext, GatewaySession, SessionCommand};
use crate::core::store::SharedStore;
use crate::traits::*;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Client metrics snapshot
#[derive(Debug, Clone)]
pub struct Metrics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub reconnect_count: u64,
    pub heartbeats_sent: u64,
    pub heartbeat_acks: u64,
    pub last_latency_ms: u64,
    pub connection_state: ConnectionState,
}

/// Handle to a running gateway session
///
/// Created by [`crate::builder`]. Events are delivered over an unbounded
/// crossbeam channel; commands are forwarded to the session task. Dropping
/// the handle shuts the session down.
pub struct GatewayClient {
    config: Arc<GatewayConfig>,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
    store: SharedStore,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    event_rx: Receiver<GatewayEvent>,
    task_handle: Option<JoinHandle<Result<()>>>,
}

impl GatewayClient {
    /// Spawn the session task. Must be called inside a Tokio runtime.
    pub(crate) fn spawn(
        ctx: GatewayContext,
        session: GatewaySession,
        command_tx: mpsc::UnboundedSender<SessionCommand>,
        event_rx: Receiver<GatewayEvent>,
    ) -> Self {
        let task_handle = tokio::spawn(session.run());
        Self {
            config: ctx.config,
            state: ctx.state,
            metrics: ctx.metrics,
            store: ctx.store,
            command_tx,
            event_rx,
            task_handle: Some(task_handle),
        }
    }

    /// Queue a raw payload for the current connection
    pub fn send(&self, envelope: GatewayEnvelope) -> Result<()> {
        self.command_tx
            .send(SessionCommand::Send(envelope))
            .map_err(|e| GatewayError::ChannelSend(e.to_string()))
    }

    /// Update the presence of the current user
    pub fn update_status(&self, idle_since: Option<u64>, game: Option<Value>) -> Result<()> {
        self.send(protocol::status_update(idle_since, game))
    }

    /// Request members of the given guilds
    pub fn request_guild_members(&self, guild_ids: &[String], query: &str, limit: u32) -> Result<()> {
        self.send(protocol::request_guild_members(guild_ids, query, limit))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            frames_sent: self.metrics.frames_sent(),
            frames_received: self.metrics.frames_received(),
            reconnect_count: self.metrics.reconnect_count(),
            heartbeats_sent: self.metrics.heartbeats_sent(),
            heartbeat_acks: self.metrics.heartbeat_acks(),
            last_latency_ms: self.metrics.last_latency_ms(),
            connection_state: self.state.get(),
        }
    }

    /// Shared entity store
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<GatewayEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receive an event (blocking)
    pub fn recv_event(&self) -> std::result::Result<GatewayEvent, crossbeam_channel::RecvError> {
        self.event_rx.recv()
    }

    /// Receive an event, giving up after `timeout` (blocking)
    pub fn recv_event_timeout(&self, timeout: Duration) -> std::result::Result<GatewayEvent, RecvTimeoutError> {
        self.event_rx.recv_timeout(timeout)
    }

    /// Another receiver on the event channel, e.g. for a dedicated thread
    pub fn events(&self) -> Receiver<GatewayEvent> {
        self.event_rx.clone()
    }

    /// True once the session task has ended
    pub fn is_finished(&self) -> bool {
        self.task_handle.as_ref().map_or(true, |handle| handle.is_finished())
    }

    /// Close with code 1000 without reconnecting, and wait for the session to end
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down gateway client");
        let _ = self.command_tx.send(SessionCommand::Shutdown);
        self.join().await
    }

    /// Wait for the session to end on its own (fatal close or exhausted reconnects)
    pub async fn wait(mut self) -> Result<()> {
        self.join().await
    }

    async fn join(&mut self) -> Result<()> {
        match self.task_handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| GatewayError::Other(format!("session task failed: {}", e)))?,
            None => Ok(()),
        }
    }
}
