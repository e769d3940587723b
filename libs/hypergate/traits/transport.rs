//! Transport seam between the session and the WebSocket implementation
//!
//! The session only ever talks to a [`Connection`]; production code uses the
//! tokio-tungstenite connector in `core::websocket`, tests plug in channels.

use crate::traits::error::Result;
use async_trait::async_trait;

/// A data frame exchanged with the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    /// Text message (JSON payloads)
    Text(String),
    /// Binary message (zlib-compressed JSON payloads)
    Binary(Vec<u8>),
}

impl WsMessage {
    pub fn len(&self) -> usize {
        match self {
            WsMessage::Text(text) => text.len(),
            WsMessage::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Close code and reason carried by a close frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Anything the transport can hand to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message(WsMessage),
    /// Peer closed the connection, optionally with a code and reason
    Close(Option<CloseFrame>),
}

/// One open duplex connection
#[async_trait]
pub trait Connection: Send {
    /// Send a data frame
    async fn send(&mut self, message: WsMessage) -> Result<()>;

    /// Wait for the next frame
    ///
    /// Returns `None` once the underlying stream has ended. Must be cancel-safe:
    /// the session polls it inside `tokio::select!`.
    async fn recv(&mut self) -> Option<Result<Frame>>;

    /// Initiate a close handshake with the given code and reason
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

/// Opens connections to a gateway URL
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>>;
}
