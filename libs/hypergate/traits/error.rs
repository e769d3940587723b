use thiserror::Error;

/// Main error type for hypergate
#[derive(Error, Debug)]
pub enum GatewayError {
    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection closed by the peer
    #[error("Connection closed ({code}): {reason}")]
    ConnectionClosed { code: u16, reason: String },

    /// The gateway rejected the token (close code 4004)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A frame could not be inflated or parsed
    #[error("Decode error: {0}")]
    Decode(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Gateway URL lookup failed
    #[error("Gateway discovery failed: {0}")]
    Discovery(String),

    /// Reconnection strategy gave up
    #[error("Reconnection failed after {attempts} attempts: {reason}")]
    ReconnectionFailed { attempts: usize, reason: String },

    /// REST layer error
    #[error(transparent)]
    Rest(#[from] hyperrest::RestError),

    /// Generic error
    #[error("Error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Decode(e.to_string())
    }
}

/// Result type for hypergate operations
pub type Result<T> = std::result::Result<T, GatewayError>;
