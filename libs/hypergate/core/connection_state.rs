//! Lock-free session phase and counters shared with the client handle

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Observable session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    /// Transport open, waiting for Hello
    AwaitingHello = 2,
    /// Identify or Resume sent
    Authenticating = 3,
    /// READY or RESUMED received, readiness not yet reached
    Operational = 4,
    /// Readiness fired
    Ready = 5,
    Reconnecting = 6,
    /// Closed with a fatal code, no reconnect
    FatalClosed = 7,
    ShuttingDown = 8,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::AwaitingHello,
            3 => ConnectionState::Authenticating,
            4 => ConnectionState::Operational,
            5 => ConnectionState::Ready,
            6 => ConnectionState::Reconnecting,
            7 => ConnectionState::FatalClosed,
            8 => ConnectionState::ShuttingDown,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Atomic wrapper around [`ConnectionState`]
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Transport is open
    pub fn is_connected(&self) -> bool {
        matches!(
            self.get(),
            ConnectionState::AwaitingHello
                | ConnectionState::Authenticating
                | ConnectionState::Operational
                | ConnectionState::Ready
        )
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self.get(),
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }

    pub fn is_ready(&self) -> bool {
        self.get() == ConnectionState::Ready
    }

    pub fn is_shutting_down(&self) -> bool {
        self.get() == ConnectionState::ShuttingDown
    }

    /// No further connection attempts will be made
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.get(),
            ConnectionState::FatalClosed | ConnectionState::ShuttingDown
        )
    }
}

/// Session counters
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    reconnects: AtomicU64,
    heartbeats_sent: AtomicU64,
    heartbeat_acks: AtomicU64,
    last_latency_ms: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_heartbeats(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack(&self, latency_ms: u64) {
        self.heartbeat_acks.fetch_add(1, Ordering::Relaxed);
        self.last_latency_ms.store(latency_ms, Ordering::Relaxed);
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeats_sent.load(Ordering::Relaxed)
    }

    pub fn heartbeat_acks(&self) -> u64 {
        self.heartbeat_acks.load(Ordering::Relaxed)
    }

    pub fn last_latency_ms(&self) -> u64 {
        self.last_latency_ms.load(Ordering::Relaxed)
    }
}
