//! Common test utilities for HyperRest integration tests

use async_trait::async_trait;
use hyperrest::{HttpRequest, HttpResponse, HttpTransport, RestConfig, RestError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Transport that replays a script of responses and records every call
///
/// When the script runs out, `fallback` is returned. Each scripted response
/// may carry a latency, so requests can overlap.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<(Duration, HttpResponse)>>,
    fallback: HttpResponse,
    calls: Mutex<Vec<(String, Instant)>>,
    created: Instant,
}

impl ScriptedTransport {
    pub fn new(script: Vec<HttpResponse>) -> Arc<Self> {
        Self::with_fallback(script, HttpResponse::new(200, "{}"))
    }

    pub fn with_fallback(script: Vec<HttpResponse>, fallback: HttpResponse) -> Arc<Self> {
        let script = script.into_iter().map(|response| (Duration::ZERO, response)).collect();
        Self::build(script, fallback)
    }

    /// Script where every response arrives after its latency
    pub fn with_latencies(script: Vec<(Duration, HttpResponse)>) -> Arc<Self> {
        Self::build(script.into(), HttpResponse::new(200, "{}"))
    }

    fn build(script: VecDeque<(Duration, HttpResponse)>, fallback: HttpResponse) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            fallback,
            calls: Mutex::new(Vec::new()),
            created: Instant::now(),
        })
    }

    /// Paths requested so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(path, _)| path.clone()).collect()
    }

    /// Paths with the time each call started, relative to creation
    pub fn call_times(&self) -> Vec<(String, Duration)> {
        self.calls
            .lock()
            .iter()
            .map(|(path, at)| (path.clone(), at.duration_since(self.created)))
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, RestError> {
        self.calls.lock().push((request.path.clone(), Instant::now()));
        let next = self.script.lock().pop_front();
        match next {
            Some((latency, response)) => {
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                Ok(response)
            }
            None => Ok(self.fallback.clone()),
        }
    }
}

pub fn test_config() -> RestConfig {
    RestConfig::new("Bot test-token")
}
