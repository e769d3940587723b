//! Common test utilities for HyperGate integration tests
//!
//! `FakeGateway` stands in for the WebSocket server: each `open()` queues one
//! connection for the session's next connect attempt and returns the server
//! side of it. Frames travel over unbounded channels, so tests run under
//! paused time.

#![allow(dead_code)]

use async_trait::async_trait;
use hypergate::states::HasToken;
use hypergate::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// What the session wrote to a fake connection
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Payload(GatewayEnvelope),
    Close { code: u16, reason: String },
}

struct FakeConnection {
    incoming: mpsc::UnboundedReceiver<Frame>,
    outgoing: mpsc::UnboundedSender<ClientFrame>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn send(&mut self, message: WsMessage) -> hypergate::Result<()> {
        let WsMessage::Text(text) = message else {
            return Err(GatewayError::Other("unexpected binary frame".to_string()));
        };
        let envelope: GatewayEnvelope = serde_json::from_str(&text)?;
        self.outgoing
            .send(ClientFrame::Payload(envelope))
            .map_err(|e| GatewayError::WebSocket(e.to_string()))
    }

    async fn recv(&mut self) -> Option<hypergate::Result<Frame>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self, code: u16, reason: &str) -> hypergate::Result<()> {
        let _ = self.outgoing.send(ClientFrame::Close {
            code,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

struct FakeConnector {
    pending: tokio::sync::Mutex<mpsc::UnboundedReceiver<FakeConnection>>,
    urls: Mutex<Vec<String>>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str) -> hypergate::Result<Box<dyn Connection>> {
        self.urls.lock().push(url.to_string());
        // Waits until the test opens the next connection
        let mut pending = self.pending.lock().await;
        match pending.recv().await {
            Some(connection) => Ok(Box::new(connection)),
            None => Err(GatewayError::WebSocket("fake gateway dropped".to_string())),
        }
    }
}

pub struct FakeGateway {
    queue: mpsc::UnboundedSender<FakeConnection>,
    connector: Arc<FakeConnector>,
}

impl FakeGateway {
    pub fn new() -> Self {
        let (queue, pending) = mpsc::unbounded_channel();
        Self {
            queue,
            connector: Arc::new(FakeConnector {
                pending: tokio::sync::Mutex::new(pending),
                urls: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        self.connector.clone()
    }

    /// Accept the next connection attempt
    pub fn open(&self) -> ServerSide {
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let _ = self.queue.send(FakeConnection { incoming, outgoing });
        ServerSide { to_client, from_client }
    }

    /// URLs of every connect attempt so far
    pub fn urls(&self) -> Vec<String> {
        self.connector.urls.lock().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connector.urls.lock().len()
    }
}

/// Server end of one fake connection
pub struct ServerSide {
    to_client: mpsc::UnboundedSender<Frame>,
    from_client: mpsc::UnboundedReceiver<ClientFrame>,
}

impl ServerSide {
    pub fn send(&self, payload: Value) {
        let _ = self
            .to_client
            .send(Frame::Message(WsMessage::Text(payload.to_string())));
    }

    pub fn send_frame(&self, frame: Frame) {
        let _ = self.to_client.send(frame);
    }

    pub fn hello(&self, interval_ms: u64) {
        self.send(json!({"op": 10, "d": {"heartbeat_interval": interval_ms}}));
    }

    pub fn ack(&self) {
        self.send(json!({"op": 11, "d": null}));
    }

    pub fn op(&self, op: u8, d: Value) {
        self.send(json!({"op": op, "d": d}));
    }

    pub fn dispatch(&self, event: &str, seq: u64, d: Value) {
        self.send(json!({"op": 0, "s": seq, "t": event, "d": d}));
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self
            .to_client
            .send(Frame::Close(Some(CloseFrame::new(code, reason))));
    }

    pub async fn next(&mut self) -> Option<ClientFrame> {
        self.from_client.recv().await
    }

    pub fn try_next(&mut self) -> Option<ClientFrame> {
        self.from_client.try_recv().ok()
    }

    pub async fn next_payload(&mut self) -> GatewayEnvelope {
        match self.next().await {
            Some(ClientFrame::Payload(envelope)) => envelope,
            other => panic!("expected a payload, got {:?}", other),
        }
    }

    /// Next payload that is not a heartbeat
    pub async fn next_non_heartbeat(&mut self) -> GatewayEnvelope {
        loop {
            let envelope = self.next_payload().await;
            if envelope.op != OpCode::Heartbeat.code() {
                return envelope;
            }
        }
    }

    /// Skip payloads until the session closes the connection
    pub async fn expect_close(&mut self) -> (u16, String) {
        loop {
            match self.next().await {
                Some(ClientFrame::Close { code, reason }) => return (code, reason),
                Some(ClientFrame::Payload(_)) => continue,
                None => panic!("connection dropped without a close frame"),
            }
        }
    }

    /// Send Hello, swallow Identify, send READY with the given guilds
    pub async fn handshake(&mut self, session_id: &str, guilds: Value) -> GatewayEnvelope {
        self.hello(1_000_000);
        let identify = self.next_non_heartbeat().await;
        assert_eq!(identify.op, OpCode::Identify.code());
        self.dispatch(
            "READY",
            1,
            json!({"session_id": session_id, "user": {"id": "me", "username": "bot"}, "guilds": guilds}),
        );
        identify
    }
}

/// The `d` field, null when absent
pub fn data(envelope: &GatewayEnvelope) -> Value {
    envelope.d.clone().unwrap_or(Value::Null)
}

/// Builder wired to the fake gateway
pub fn test_builder(gateway: &FakeGateway) -> GatewayClientBuilder<HasToken> {
    hypergate::builder()
        .token("T")
        .connector(gateway.connector())
        .locator(Arc::new(StaticLocator::new("wss://gateway.test")))
}

/// Let spawned tasks run without advancing time
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Poll the client's events until one matches, dropping the rest
pub async fn wait_for_event<F>(client: &GatewayClient, max: Duration, matches: F) -> Option<GatewayEvent>
where
    F: Fn(&GatewayEvent) -> bool,
{
    let start = tokio::time::Instant::now();
    loop {
        while let Some(event) = client.try_recv_event() {
            if matches(&event) {
                return Some(event);
            }
        }
        if start.elapsed() >= max {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Names of the dispatch events currently queued on the client
pub fn drain_dispatches(client: &GatewayClient) -> Vec<String> {
    let mut names = Vec::new();
    while let Some(event) = client.try_recv_event() {
        if let GatewayEvent::Dispatch { event, .. } = event {
            names.push(event);
        }
    }
    names
}

/// Drain every queued event
pub fn drain_events(client: &GatewayClient) -> Vec<GatewayEvent> {
    let mut events = Vec::new();
    while let Some(event) = client.try_recv_event() {
        events.push(event);
    }
    events
}
