//! The gateway session state machine
//!
//! One task owns everything mutable about a session: the connection, the
//! heartbeat and readiness timers, the dispatch backlog and the resume
//! credentials. Every input (inbound frames, timer expiries, application
//! commands) is serialized through a single `select!` loop, so no state is
//! shared with other tasks except the store and the atomic counters.
//!
//! ```text
//! Connecting ──open──> AwaitingHello ──Hello──> Authenticating ──READY/RESUMED──> Operational ──> Ready
//!     ^                                                                                  │
//!     └──────────────────── close (any code but 4004, not shutting down) ────────────────┘
//! ```

use crate::core::config::GatewayConfig;
use crate::core::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::core::dispatcher::{DispatchOutcome, Dispatcher};
use crate::core::events::GatewayEvent;
use crate::core::heartbeat::{HeartbeatEvent, HeartbeatMonitor};
use crate::core::protocol::{self, close_code, event, GatewayEnvelope, OpCode};
use crate::core::readiness::{Availability, ChunkTick, ReadinessEvent, ReadinessTracker};
use crate::core::store::{snowflake, SharedStore};
use crate::traits::*;
use crossbeam_channel::Sender;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Minimum wait after a connection attempt that never opened
const CONNECT_FAILURE_BACKOFF: Duration = Duration::from_secs(1);

/// Commands from the client handle
#[derive(Debug)]
pub enum SessionCommand {
    /// Send a payload on the current connection
    Send(GatewayEnvelope),
    /// Close with 1000 and do not reconnect
    Shutdown,
}

/// Collaborators a session runs against
#[derive(Clone)]
pub struct GatewayContext {
    pub config: Arc<GatewayConfig>,
    pub connector: Arc<dyn Connector>,
    pub locator: Arc<dyn GatewayLocator>,
    pub store: SharedStore,
    pub state: Arc<AtomicConnectionState>,
    pub metrics: Arc<AtomicMetrics>,
}

/// Protocol state that survives reconnects
#[derive(Debug, Default)]
struct SessionState {
    connected: bool,
    /// Set by an explicit shutdown; suppresses reconnection
    closing: bool,
    /// Set by a non-fatal close, cleared by READY or RESUMED
    reconnecting: bool,
    session_id: Option<String>,
    last_sequence: Option<u64>,
    heartbeat_interval: Option<Duration>,
    reconnect_count: u32,
    last_close: Option<CloseFrame>,
    /// Discovered URL, kept for the lifetime of the session
    gateway_url: Option<String>,
}

enum CloseDisposition {
    Reconnect,
    Shutdown,
    Fatal(GatewayError),
}

enum Step {
    Heartbeat(HeartbeatEvent),
    Frame(Option<Result<Frame>>),
    Readiness(ReadinessEvent),
    Command(Option<SessionCommand>),
}

pub struct GatewaySession {
    ctx: GatewayContext,
    state: SessionState,
    heartbeat: HeartbeatMonitor,
    readiness: ReadinessTracker,
    dispatcher: Dispatcher,
    reconnect_strategy: Box<dyn ReconnectionStrategy>,
    reconnect_attempt: usize,
    events: Sender<GatewayEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
}

impl GatewaySession {
    pub fn new(
        ctx: GatewayContext,
        dispatcher: Dispatcher,
        reconnect_strategy: Box<dyn ReconnectionStrategy>,
        events: Sender<GatewayEvent>,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
    ) -> Self {
        let readiness = ReadinessTracker::new(
            ctx.config.unavailable_guild_timeout,
            ctx.config.chunk_check_interval,
            ctx.config.chunk_stagger,
            ctx.config.chunk_batch_size,
        );
        Self {
            ctx,
            state: SessionState::default(),
            heartbeat: HeartbeatMonitor::new(),
            readiness,
            dispatcher,
            reconnect_strategy,
            reconnect_attempt: 0,
            events,
            commands,
        }
    }

    /// Run until shutdown, a fatal close, or the reconnection strategy gives up
    pub async fn run(mut self) -> Result<()> {
        info!("Gateway session starting");
        let result = self.run_loop().await;

        if self.ctx.state.get() != ConnectionState::FatalClosed {
            self.ctx.state.set(ConnectionState::Disconnected);
        }
        match &result {
            Ok(()) => info!("Gateway session exiting"),
            Err(e) => error!("Gateway session exiting: {}", e),
        }
        result
    }

    async fn run_loop(&mut self) -> Result<()> {
        loop {
            self.ctx.state.set(if self.state.reconnecting {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Connecting
            });

            let url = self.resolve_gateway().await;
            debug!("Connecting to {}", url);

            let connected = {
                let connect = self.ctx.connector.connect(&url);
                tokio::pin!(connect);
                loop {
                    tokio::select! {
                        result = &mut connect => break Some(result),
                        command = self.commands.recv() => match command {
                            Some(SessionCommand::Send(envelope)) => {
                                warn!("Dropping op {} payload while connecting", envelope.op);
                            }
                            Some(SessionCommand::Shutdown) | None => break None,
                        },
                    }
                }
            };
            let Some(connected) = connected else {
                info!("Shutdown requested while connecting");
                self.state.closing = true;
                self.ctx.state.set(ConnectionState::ShuttingDown);
                return Ok(());
            };

            let (opened, close) = match connected {
                Ok(mut connection) => {
                    self.on_open();
                    (true, self.drive(connection.as_mut()).await)
                }
                Err(e) => {
                    error!("Failed to connect to gateway: {}", e);
                    self.emit(GatewayEvent::Error(e.to_string()));
                    (false, CloseFrame::new(close_code::TRANSPORT_ERROR, "websocket error"))
                }
            };

            match self.on_close(close) {
                CloseDisposition::Shutdown => return Ok(()),
                CloseDisposition::Fatal(e) => return Err(e),
                CloseDisposition::Reconnect => {}
            }

            let Some(delay) = self.reconnect_strategy.next_delay(self.reconnect_attempt) else {
                warn!("Reconnection strategy exhausted, stopping");
                return Err(GatewayError::ReconnectionFailed {
                    attempts: self.reconnect_attempt,
                    reason: self
                        .state
                        .last_close
                        .as_ref()
                        .map(|close| format!("{} {}", close.code, close.reason))
                        .unwrap_or_default(),
                });
            };
            self.reconnect_attempt += 1;

            let delay = if opened { delay } else { delay.max(CONNECT_FAILURE_BACKOFF) };
            if !delay.is_zero() {
                info!("Reconnecting in {:?} (attempt {})", delay, self.reconnect_attempt);
                if !self.wait_before_reconnect(delay).await {
                    return Ok(());
                }
            }
        }
    }

    async fn resolve_gateway(&mut self) -> String {
        if let Some(url) = &self.state.gateway_url {
            return url.clone();
        }
        match self.ctx.locator.locate().await {
            Ok(base) => {
                let url = self.ctx.config.gateway_url(&base);
                debug!("Discovered gateway {}", url);
                self.state.gateway_url = Some(url.clone());
                url
            }
            Err(e) => {
                warn!("Gateway discovery failed, using fallback: {}", e);
                self.ctx.config.gateway_url(&self.ctx.config.fallback_gateway_url)
            }
        }
    }

    /// Sleep between connections, still honoring shutdown
    async fn wait_before_reconnect(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Send(envelope)) => {
                        warn!("Dropping op {} payload while disconnected", envelope.op);
                    }
                    Some(SessionCommand::Shutdown) | None => {
                        self.state.closing = true;
                        self.ctx.state.set(ConnectionState::ShuttingDown);
                        return false;
                    }
                },
            }
        }
    }

    fn on_open(&mut self) {
        self.state.connected = true;
        self.ctx.state.set(ConnectionState::AwaitingHello);
        info!("Connected to gateway");
        self.emit(GatewayEvent::Connected);
    }

    /// Drive one connection until it closes, returning the close code and reason
    async fn drive(&mut self, conn: &mut dyn Connection) -> CloseFrame {
        loop {
            let step = tokio::select! {
                biased;
                event = self.heartbeat.next_event() => Step::Heartbeat(event),
                frame = conn.recv() => Step::Frame(frame),
                event = self.readiness.next_event() => Step::Readiness(event),
                command = self.commands.recv() => Step::Command(command),
            };

            let outcome = match step {
                Step::Frame(Some(Ok(Frame::Message(message)))) => {
                    self.ctx.metrics.increment_received();
                    self.process_payload(conn, message).await
                }
                Step::Frame(Some(Ok(Frame::Close(frame)))) => {
                    return frame.unwrap_or_else(|| CloseFrame::new(close_code::NO_STATUS, ""));
                }
                Step::Frame(Some(Err(e))) => {
                    error!("Gateway transport error: {}", e);
                    self.emit(GatewayEvent::Error(e.to_string()));
                    return CloseFrame::new(close_code::TRANSPORT_ERROR, "websocket error");
                }
                Step::Frame(None) => {
                    return CloseFrame::new(close_code::ABNORMAL, "connection dropped");
                }
                Step::Heartbeat(HeartbeatEvent::Beat) => self.send_heartbeat(conn).await.map(|_| None),
                Step::Heartbeat(HeartbeatEvent::AckTimeout) => {
                    warn!("Heartbeat acknowledge not received, closing connection");
                    return close(conn, close_code::GOING_AWAY, "Heartbeat Acknowledge not received").await;
                }
                Step::Readiness(event) => self.on_readiness_event(conn, event).await.map(|_| None),
                Step::Command(Some(SessionCommand::Send(envelope))) => {
                    self.send(conn, &envelope).await.map(|_| None)
                }
                Step::Command(Some(SessionCommand::Shutdown)) | Step::Command(None) => {
                    info!("Shutting down gateway session");
                    self.state.closing = true;
                    self.ctx.state.set(ConnectionState::ShuttingDown);
                    return close(conn, close_code::NORMAL, "Client shutting down").await;
                }
            };

            match outcome {
                Ok(None) => {}
                Ok(Some(closed)) => return closed,
                Err(e) => {
                    error!("Failed to write to gateway: {}", e);
                    self.emit(GatewayEvent::Error(e.to_string()));
                    return CloseFrame::new(close_code::TRANSPORT_ERROR, "websocket error");
                }
            }
        }
    }

    fn on_close(&mut self, close: CloseFrame) -> CloseDisposition {
        let was_connected = std::mem::replace(&mut self.state.connected, false);
        self.heartbeat.stop();
        let requeued = self.readiness.suspend();
        if requeued > 0 {
            debug!("Requeued {} guilds whose members were not received", requeued);
        }

        if was_connected {
            self.emit(GatewayEvent::Disconnected {
                code: close.code,
                reason: close.reason.clone(),
            });
        }

        if self.state.closing {
            info!("Gateway connection closed");
            self.state.last_close = Some(close);
            self.ctx.state.set(ConnectionState::ShuttingDown);
            return CloseDisposition::Shutdown;
        }

        warn!(code = close.code, reason = %close.reason, "Gateway connection closed");

        if close.code == close_code::AUTHENTICATION_FAILED {
            error!("The token is invalid, not reconnecting");
            self.state.session_id = None;
            self.state.last_sequence = None;
            self.emit(GatewayEvent::Error("authentication failed: token is invalid".to_string()));
            self.ctx.state.set(ConnectionState::FatalClosed);
            let reason = close.reason.clone();
            self.state.last_close = Some(close);
            return CloseDisposition::Fatal(GatewayError::AuthenticationFailed(reason));
        }

        self.state.last_close = Some(close);
        self.state.reconnect_count += 1;
        self.state.reconnecting = true;
        self.ctx.metrics.increment_reconnects();
        self.ctx.state.set(ConnectionState::Reconnecting);
        info!("Reconnecting to gateway (reconnect #{})", self.state.reconnect_count);
        self.emit(GatewayEvent::Reconnecting(self.state.reconnect_count));
        CloseDisposition::Reconnect
    }

    fn should_resume(&self) -> bool {
        self.state.reconnecting
            && self.state.session_id.is_some()
            && self.state.last_close.as_ref().map(|close| close.code)
                != Some(close_code::AUTHENTICATION_FAILED)
    }

    async fn process_payload(&mut self, conn: &mut dyn Connection, message: WsMessage) -> Result<Option<CloseFrame>> {
        let envelope = match protocol::decode_frame(&message) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping undecodable frame ({} bytes): {}", message.len(), e);
                return Ok(None);
            }
        };

        self.emit(GatewayEvent::RawPayload(envelope.clone()));

        if let Some(seq) = envelope.s {
            self.state.last_sequence = Some(seq);
        }

        if envelope.t.as_deref() != Some(event::PRESENCE_UPDATE) {
            debug!(
                op = envelope.op,
                event = envelope.t.as_deref().unwrap_or("-"),
                seq = ?envelope.s,
                "Received payload"
            );
        }

        let opcode = match envelope.opcode() {
            Ok(opcode) => opcode,
            Err(_) => {
                debug!("Ignoring unknown opcode {}", envelope.op);
                return Ok(None);
            }
        };
        let GatewayEnvelope { d, t, .. } = envelope;

        match opcode {
            OpCode::Hello => self.on_hello(conn, d).await.map(|_| None),
            OpCode::Heartbeat => {
                debug!("Heartbeat requested by gateway");
                let echo = GatewayEnvelope::new(OpCode::Heartbeat, d.unwrap_or(Value::Null));
                self.send(conn, &echo).await.map(|_| None)
            }
            OpCode::HeartbeatAck => {
                self.on_heartbeat_ack();
                Ok(None)
            }
            OpCode::Reconnect => {
                info!("Reconnect instruction received");
                Ok(Some(close(conn, close_code::NORMAL, "Reconnect instruction received").await))
            }
            OpCode::InvalidSession => self.on_invalid_session(conn).await.map(|_| None),
            OpCode::Dispatch => {
                self.on_dispatch(t, d);
                Ok(None)
            }
            other => {
                debug!("Ignoring {:?} from gateway", other);
                Ok(None)
            }
        }
    }

    async fn on_hello(&mut self, conn: &mut dyn Connection, d: Option<Value>) -> Result<()> {
        let Some(interval) = d
            .as_ref()
            .and_then(|d| d.get("heartbeat_interval"))
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
        else {
            warn!("Hello without a heartbeat interval, ignoring");
            return Ok(());
        };

        debug!("Heartbeat interval {:?}", interval);
        self.state.heartbeat_interval = Some(interval);
        self.ctx.state.set(ConnectionState::Authenticating);

        let resumed = self.authorize(conn, true).await?;
        if !resumed {
            self.heartbeat.start(interval);
        }
        Ok(())
    }

    /// Send Resume when allowed and possible, Identify otherwise
    ///
    /// Returns true when a Resume was sent.
    async fn authorize(&mut self, conn: &mut dyn Connection, allow_resume: bool) -> Result<bool> {
        let resume = allow_resume && self.should_resume();

        let envelope = if resume {
            let session_id = self.state.session_id.as_deref().unwrap_or_default();
            info!(session_id, seq = ?self.state.last_sequence, "Resuming gateway session");
            protocol::resume(&self.ctx.config.token, session_id, self.state.last_sequence)
        } else {
            self.state.session_id = None;
            self.state.last_sequence = None;
            info!(shard = ?self.ctx.config.shard, "Identifying with gateway");
            protocol::identify(&self.ctx.config)
        };

        self.send(conn, &envelope).await?;
        Ok(resume)
    }

    async fn on_invalid_session(&mut self, conn: &mut dyn Connection) -> Result<()> {
        warn!("Gateway invalidated the session, identifying again");
        self.authorize(conn, false).await?;
        if !self.heartbeat.is_running() {
            if let Some(interval) = self.state.heartbeat_interval {
                self.heartbeat.start(interval);
            }
        }
        Ok(())
    }

    fn on_heartbeat_ack(&mut self) {
        let latency = self.heartbeat.acknowledge();
        if let Some(latency) = latency {
            self.ctx.metrics.record_ack(latency.as_millis() as u64);
        }
        debug!(latency_ms = ?latency.map(|l| l.as_millis()), "Heartbeat acknowledged");
        self.emit(GatewayEvent::HeartbeatAck { latency });
    }

    async fn send_heartbeat(&mut self, conn: &mut dyn Connection) -> Result<()> {
        if !self.state.connected {
            return Ok(());
        }
        debug!(seq = ?self.state.last_sequence, "Sending heartbeat");
        let envelope = protocol::heartbeat(self.state.last_sequence);
        self.send(conn, &envelope).await?;
        self.heartbeat.record_sent();
        self.ctx.metrics.increment_heartbeats();
        Ok(())
    }

    async fn send(&mut self, conn: &mut dyn Connection, envelope: &GatewayEnvelope) -> Result<()> {
        conn.send(envelope.to_message()?).await?;
        self.ctx.metrics.increment_sent();
        Ok(())
    }

    fn on_dispatch(&mut self, name: Option<String>, data: Option<Value>) {
        let Some(name) = name else {
            debug!("Dispatch without an event name");
            return;
        };
        let data = data.unwrap_or(Value::Null);

        match name.as_str() {
            event::READY => self.on_ready(&data),
            event::RESUMED => self.on_resumed(),
            event::GUILD_MEMBERS_CHUNK => self.on_members_chunk(&data),
            _ => {}
        }

        let mut large = Vec::new();
        let outcome = {
            let mut store = self.ctx.store.write();
            let mut handler_ctx = HandlerContext::new(&mut store, &mut large);
            self.dispatcher.dispatch(&name, data, &mut handler_ctx)
        };
        for guild_id in large {
            self.readiness.enqueue_large(guild_id);
        }

        if name == event::GUILD_CREATE {
            if let DispatchOutcome::Delivered(handled) = &outcome {
                if let Some(guild_id) = snowflake(handled.new.get("id")) {
                    if self.readiness.guild_available(&guild_id) {
                        info!("All guilds are now available");
                        self.on_guilds_available();
                    }
                }
            }
        }
    }

    fn on_ready(&mut self, data: &Value) {
        self.state.reconnecting = false;
        self.reconnect_attempt = 0;
        self.reconnect_strategy.reset();
        self.state.session_id = data.get("session_id").and_then(Value::as_str).map(str::to_string);

        {
            let mut store = self.ctx.store.write();
            let user = data.get("user").cloned();
            if let Some(user) = &user {
                store.upsert_user(user);
            }
            store.current_user = user;
        }

        self.readiness.resume();

        if self.readiness.has_begun() {
            info!(session_id = ?self.state.session_id, "Re-identified with gateway");
            self.ctx.state.set(if self.readiness.is_ready() {
                ConnectionState::Ready
            } else {
                ConnectionState::Operational
            });
            return;
        }

        self.ctx.state.set(ConnectionState::Operational);
        info!(session_id = ?self.state.session_id, "Gateway session established");

        let mut unavailable = Vec::new();
        let mut large = Vec::new();
        {
            let mut store = self.ctx.store.write();

            if self.ctx.config.pm_channels {
                let mut stored = 0;
                for channel in data.get("private_channels").and_then(Value::as_array).into_iter().flatten() {
                    if store.insert_private_channel(channel) > 0 {
                        stored += 1;
                    }
                }
                info!("Stored {} private channels", stored);
            } else {
                info!("Not parsing private channels");
            }

            let mut handler_ctx = HandlerContext::new(&mut store, &mut large);
            for guild in data.get("guilds").and_then(Value::as_array).into_iter().flatten() {
                match self.dispatcher.apply(event::GUILD_CREATE, guild, &mut handler_ctx) {
                    Some(Ok(_)) => {}
                    Some(Err(Rejection::Unavailable(id))) => unavailable.push(id),
                    Some(Err(rejection)) => warn!("Skipping guild listed in READY: {}", rejection),
                    None => {
                        let flagged = guild.get("unavailable").and_then(Value::as_bool) == Some(true);
                        if let (true, Some(id)) = (flagged, snowflake(guild.get("id"))) {
                            unavailable.push(id);
                        }
                    }
                }
            }
            info!("Stored {} guilds", store.guilds.len());
        }

        for guild_id in large {
            self.readiness.enqueue_large(guild_id);
        }

        match self.readiness.begin(unavailable) {
            Availability::Complete => self.on_guilds_available(),
            Availability::Pending(count) => info!(
                "Waiting up to {:?} for {} unavailable guilds",
                self.ctx.config.unavailable_guild_timeout, count
            ),
        }
    }

    fn on_resumed(&mut self) {
        info!("Resumed gateway session");
        self.state.reconnecting = false;
        self.reconnect_attempt = 0;
        self.reconnect_strategy.reset();
        if let Some(interval) = self.state.heartbeat_interval {
            self.heartbeat.start(interval);
        }
        self.readiness.resume();
        self.ctx.state.set(if self.readiness.is_ready() {
            ConnectionState::Ready
        } else {
            ConnectionState::Operational
        });
        self.emit(GatewayEvent::Reconnected);
    }

    fn on_members_chunk(&mut self, data: &Value) {
        let Some(guild_id) = snowflake(data.get("guild_id")) else {
            warn!("Member chunk without guild_id");
            return;
        };
        let members = data
            .get("members")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let result = self.ctx.store.write().add_members(&guild_id, members);
        let Some((added, complete)) = result else {
            warn!("Member chunk for unknown guild {}", guild_id);
            return;
        };
        debug!("Parsed {} members for guild {}", added, guild_id);

        if complete && self.readiness.member_chunk_complete(&guild_id) {
            debug!("Guild {} fully loaded", guild_id);
            if self.readiness.is_chunking() && self.readiness.chunking_done() {
                self.fire_ready();
            }
        }
    }

    fn on_guilds_available(&mut self) {
        if self.ctx.config.load_all_members {
            info!(
                "Loading members of large guilds, checking every {:?}",
                self.ctx.config.chunk_check_interval
            );
            self.readiness.start_chunking();
        } else {
            debug!("Member loading disabled");
            self.fire_ready();
        }
    }

    async fn on_readiness_event(&mut self, conn: &mut dyn Connection, event: ReadinessEvent) -> Result<()> {
        match event {
            ReadinessEvent::DeadlineElapsed => {
                let missing = self.readiness.deadline_elapsed();
                warn!(
                    "{} guilds still unavailable after {:?}, continuing without them",
                    missing.len(),
                    self.ctx.config.unavailable_guild_timeout
                );
                self.on_guilds_available();
            }
            ReadinessEvent::ChunkCheck => match self.readiness.chunk_tick() {
                ChunkTick::Complete => self.fire_ready(),
                ChunkTick::Queued(batches) => debug!("Queued {} member request batches", batches),
                ChunkTick::Waiting => debug!("{} guilds still loading members", self.readiness.in_flight()),
            },
            ReadinessEvent::SendBatch(batch) => {
                if !batch.is_empty() {
                    debug!("Requesting members for {} guilds", batch.len());
                    let envelope = protocol::request_guild_members(&batch, "", 0);
                    self.send(conn, &envelope).await?;
                }
            }
        }
        Ok(())
    }

    /// Fire readiness once, then replay everything held back
    fn fire_ready(&mut self) {
        if !self.readiness.mark_ready() {
            return;
        }
        self.ctx.state.set(ConnectionState::Ready);
        info!("Gateway session is ready");
        self.emit(GatewayEvent::Ready);

        let mut large = Vec::new();
        let replayed = {
            let mut store = self.ctx.store.write();
            let mut handler_ctx = HandlerContext::new(&mut store, &mut large);
            self.dispatcher.flush(&mut handler_ctx)
        };
        for guild_id in large {
            self.readiness.enqueue_large(guild_id);
        }
        if replayed > 0 {
            debug!("Replayed {} dispatches held before ready", replayed);
        }
    }

    fn emit(&self, event: GatewayEvent) {
        // Nobody listening is not an error
        let _ = self.events.send(event);
    }
}

async fn close(conn: &mut dyn Connection, code: u16, reason: &str) -> CloseFrame {
    if let Err(e) = conn.close(code, reason).await {
        debug!("Close handshake failed: {}", e);
    }
    CloseFrame::new(code, reason)
}
