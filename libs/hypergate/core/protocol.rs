//! Gateway wire protocol
//!
//! Opcodes, close codes, event names, the JSON envelope and the builders for
//! every payload the session sends.

use crate::core::config::GatewayConfig;
use crate::traits::{GatewayError, Result, WsMessage};
use flate2::read::ZlibDecoder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Read;

/// Gateway opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Dispatch = 0,
    Heartbeat = 1,
    Identify = 2,
    StatusUpdate = 3,
    VoiceStateUpdate = 4,
    VoiceServerPing = 5,
    Resume = 6,
    Reconnect = 7,
    RequestGuildMembers = 8,
    InvalidSession = 9,
    Hello = 10,
    HeartbeatAck = 11,
}

impl OpCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for OpCode {
    type Error = GatewayError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => OpCode::Dispatch,
            1 => OpCode::Heartbeat,
            2 => OpCode::Identify,
            3 => OpCode::StatusUpdate,
            4 => OpCode::VoiceStateUpdate,
            5 => OpCode::VoiceServerPing,
            6 => OpCode::Resume,
            7 => OpCode::Reconnect,
            8 => OpCode::RequestGuildMembers,
            9 => OpCode::InvalidSession,
            10 => OpCode::Hello,
            11 => OpCode::HeartbeatAck,
            other => return Err(GatewayError::Decode(format!("unknown opcode {}", other))),
        })
    }
}

/// Close codes the session reacts to
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const NO_STATUS: u16 = 1005;
    pub const ABNORMAL: u16 = 1006;
    /// Transport error with no close frame
    pub const TRANSPORT_ERROR: u16 = 0;

    pub const UNKNOWN_ERROR: u16 = 4000;
    pub const UNKNOWN_OPCODE: u16 = 4001;
    pub const DECODE_ERROR: u16 = 4002;
    pub const NOT_AUTHENTICATED: u16 = 4003;
    pub const AUTHENTICATION_FAILED: u16 = 4004;
    pub const ALREADY_AUTHENTICATED: u16 = 4005;
    pub const INVALID_SEQ: u16 = 4007;
    pub const RATE_LIMITED: u16 = 4008;
    pub const SESSION_TIMEOUT: u16 = 4009;
    pub const INVALID_SHARD: u16 = 4010;
    pub const SHARDING_REQUIRED: u16 = 4011;
}

/// Dispatch event names
pub mod event {
    pub const READY: &str = "READY";
    pub const RESUMED: &str = "RESUMED";
    pub const GUILD_CREATE: &str = "GUILD_CREATE";
    pub const GUILD_MEMBERS_CHUNK: &str = "GUILD_MEMBERS_CHUNK";
    pub const CHANNEL_CREATE: &str = "CHANNEL_CREATE";
    pub const MESSAGE_CREATE: &str = "MESSAGE_CREATE";
    pub const PRESENCE_UPDATE: &str = "PRESENCE_UPDATE";
}

/// The JSON envelope every gateway payload travels in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEnvelope {
    pub op: u8,
    #[serde(default)]
    pub d: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayEnvelope {
    /// Outbound envelope: opcode and data only
    pub fn new(op: OpCode, d: Value) -> Self {
        Self {
            op: op.code(),
            d: Some(d),
            s: None,
            t: None,
        }
    }

    pub fn opcode(&self) -> Result<OpCode> {
        OpCode::try_from(self.op)
    }

    pub fn to_message(&self) -> Result<WsMessage> {
        Ok(WsMessage::Text(serde_json::to_string(self)?))
    }
}

/// Decode an inbound frame, inflating binary (zlib) frames first
pub fn decode_frame(message: &WsMessage) -> Result<GatewayEnvelope> {
    match message {
        WsMessage::Text(text) => Ok(serde_json::from_str(text)?),
        WsMessage::Binary(bytes) => {
            let text = inflate(bytes)?;
            Ok(serde_json::from_str(&text)?)
        }
    }
}

fn inflate(bytes: &[u8]) -> Result<String> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| GatewayError::Decode(format!("zlib: {}", e)))?;
    Ok(text)
}

/// Identify payload for a fresh session
pub fn identify(config: &GatewayConfig) -> GatewayEnvelope {
    let agent = concat!("corduroy/", env!("CARGO_PKG_VERSION"));
    let mut d = json!({
        "token": config.token,
        "properties": {
            "$os": std::env::consts::OS,
            "$browser": agent,
            "$device": agent,
        },
        "compress": config.compress,
    });
    if let Some((id, count)) = config.shard {
        d["shard"] = json!([id, count]);
    }
    GatewayEnvelope::new(OpCode::Identify, d)
}

/// Resume payload replaying from `seq`
pub fn resume(token: &str, session_id: &str, seq: Option<u64>) -> GatewayEnvelope {
    GatewayEnvelope::new(
        OpCode::Resume,
        json!({
            "token": token,
            "session_id": session_id,
            "seq": seq,
        }),
    )
}

/// Heartbeat carrying the last sequence seen (null before any)
pub fn heartbeat(seq: Option<u64>) -> GatewayEnvelope {
    GatewayEnvelope::new(OpCode::Heartbeat, json!(seq))
}

/// Full member list request for a batch of guilds
pub fn request_guild_members(guild_ids: &[String], query: &str, limit: u32) -> GatewayEnvelope {
    GatewayEnvelope::new(
        OpCode::RequestGuildMembers,
        json!({
            "guild_id": guild_ids,
            "query": query,
            "limit": limit,
        }),
    )
}

/// Presence update
pub fn status_update(idle_since: Option<u64>, game: Option<Value>) -> GatewayEnvelope {
    GatewayEnvelope::new(
        OpCode::StatusUpdate,
        json!({
            "idle_since": idle_since,
            "game": game,
        }),
    )
}
