pub mod cache;
pub mod client;
pub mod config;
pub mod http;

pub use cache::{fingerprint, ResponseCache};
pub use client::RateLimitedClient;
pub use config::RestConfig;
pub use http::ReqwestTransport;
