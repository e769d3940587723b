use crate::core::protocol::GatewayEnvelope;
use std::time::Duration;
use serde_json::Value;

/// Events published by the session to the application
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// Transport opened
    Connected,
    /// Transport closed
    Disconnected { code: u16, reason: String },
    /// About to reconnect (count since start)
    Reconnecting(u32),
    /// A resume completed
    Reconnected,
    /// Readiness fired; emitted once per session
    Ready,
    /// Every decoded inbound payload
    RawPayload(GatewayEnvelope),
    /// Heartbeat acknowledged
    HeartbeatAck { latency: Option<Duration> },
    /// A handled dispatch, published under its event name or an alias
    Dispatch {
        event: String,
        new: Value,
        old: Option<Value>,
    },
    Error(String),
}
