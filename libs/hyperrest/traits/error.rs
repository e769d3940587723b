use thiserror::Error;

/// Main error type for hyperrest
#[derive(Error, Debug)]
pub enum RestError {
    /// Transport-level failure (DNS, TLS, connection reset)
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Non-2xx response that is not retried
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    /// Transient server error that outlived the retry budget
    #[error("API error {status} after {attempts} attempts: {body}")]
    TransientExhausted {
        status: u16,
        body: String,
        attempts: usize,
    },

    /// Response body could not be decoded as JSON
    #[error("Deserialization failed: {0}")]
    Decode(String),

    /// The backlog was dropped before this request was released
    #[error("Request backlog closed before the request was released")]
    BacklogClosed,

    /// Client construction error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RestError {
    /// HTTP status of the response that caused this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::Status { status, .. } | RestError::TransientExhausted { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RestError {
    fn from(e: reqwest::Error) -> Self {
        RestError::Http(e.to_string())
    }
}

/// Result type for hyperrest operations
pub type Result<T> = std::result::Result<T, RestError>;
