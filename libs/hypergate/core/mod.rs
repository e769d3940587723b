pub mod builder;
pub mod client;
pub mod config;
pub mod connection_state;
pub mod dispatcher;
pub mod events;
pub mod handlers;
pub mod heartbeat;
pub mod protocol;
pub mod readiness;
pub mod session;
pub mod store;
pub mod websocket;

pub use builder::GatewayClientBuilder;
pub use client::{GatewayClient, Metrics};
pub use config::GatewayConfig;
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use events::GatewayEvent;
pub use heartbeat::{HeartbeatEvent, HeartbeatMonitor};
pub use protocol::{GatewayEnvelope, OpCode};
pub use readiness::ReadinessTracker;
pub use session::{GatewayContext, GatewaySession, SessionCommand};
pub use store::{GatewayStore, GuildRecord, SharedStore};
pub use websocket::WebSocketConnector;
