//! Core traits and types for the rate-limited REST client.
//!
//! - **HttpTransport**: issue a single HTTP request and return the raw response
//! - **RestError**: failures surfaced to callers once retry policies are exhausted

pub mod error;
pub mod transport;

pub use error::{RestError, Result};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, RequestOptions};
