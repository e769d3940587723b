//! # HyperRest
//!
//! Rate-limited REST client for the gateway service's HTTP API.
//!
//! ## Features
//!
//! - **Short-TTL response cache**: repeated GETs for the same path are served
//!   from memory until the entry expires
//! - **Quota tracking**: the server-advertised remaining quota and reset time
//!   are read from every response
//! - **Backlog queuing**: while throttled, requests wait in a FIFO backlog and
//!   are released in submission order when the quota resets
//! - **Transient retries**: 502/525 responses are retried a bounded number of times
//!
//! ## Example
//!
//! ```rust,ignore
//! use hyperrest::{RateLimitedClient, RestConfig};
//!
//! #[tokio::main]
//! async fn main() -> hyperrest::Result<()> {
//!     let client = RateLimitedClient::new(RestConfig::new("Bot my-token"))?;
//!     let gateway = client.get("gateway").await?;
//!     println!("Gateway: {}", gateway["url"]);
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod traits;

pub use crate::core::{
    cache::{fingerprint, ResponseCache},
    client::RateLimitedClient,
    config::RestConfig,
    http::ReqwestTransport,
};
pub use traits::*;

// Re-export the method type used throughout the public API
pub use reqwest::Method;
