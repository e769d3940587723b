//! # HyperGate
//!
//! Persistent gateway session client: connects over WebSocket, authenticates,
//! keeps the connection alive with heartbeats, resumes after drops, and
//! delivers dispatch events once the session is ready.
//!
//! ## Features
//!
//! - **Single-owner session task**: every frame, timer and command is
//!   serialized through one `select!` loop
//! - **Resume on reconnect**: non-fatal closes resume with the last session
//!   ID and sequence number; only an authentication failure is fatal
//! - **Readiness gating**: dispatches are held until every guild is available
//!   and, optionally, every large guild's member list has been loaded
//! - **Pluggable seams**: transport, gateway discovery, reconnection strategy
//!   and dispatch handlers are traits
//!
//! ## Example
//!
//! ```rust,ignore
//! use hypergate::GatewayEvent;
//!
//! #[tokio::main]
//! async fn main() -> hypergate::Result<()> {
//!     let client = hypergate::builder().token("Bot my-token").build()?;
//!
//!     let events = client.events();
//!     std::thread::spawn(move || {
//!         while let Ok(event) = events.recv() {
//!             if let GatewayEvent::Dispatch { event, .. } = event {
//!                 println!("{}", event);
//!             }
//!         }
//!     });
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     client.shutdown().await
//! }
//! ```

pub mod core;
pub mod traits;

pub use traits::*;

pub use crate::core::{
    builder::{states, GatewayClientBuilder},
    client::{GatewayClient, Metrics},
    config::GatewayConfig,
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState},
    dispatcher::{DispatchOutcome, Dispatcher},
    events::GatewayEvent,
    protocol::{close_code, event, GatewayEnvelope, OpCode},
    session::{GatewayContext, GatewaySession, SessionCommand},
    store::{GatewayStore, GuildRecord, SharedStore},
    websocket::WebSocketConnector,
};

/// Start building a gateway client
pub fn builder() -> GatewayClientBuilder<states::NoToken> {
    GatewayClientBuilder::new()
}
