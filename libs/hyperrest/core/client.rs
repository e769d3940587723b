use crate::core::cache::{fingerprint, ResponseCache};
use crate::core::config::RestConfig;
use crate::core::http::ReqwestTransport;
use crate::traits::*;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Statuses treated as transient server failures
const TRANSIENT_STATUSES: [u16; 2] = [502, 525];

/// Throttling response status
const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Mutable rate limit state
///
/// Only ever locked for short, synchronous sections; never held across an await.
struct RateLimitState {
    /// True while requests must wait in the backlog
    throttled: bool,
    /// Earliest time the backlog may drain; throttles only ever extend it
    throttled_until: Option<Instant>,
    /// Continuations released in FIFO order when the quota resets
    backlog: VecDeque<oneshot::Sender<()>>,
    cache: ResponseCache,
}

struct Inner {
    config: RestConfig,
    transport: Arc<dyn HttpTransport>,
    state: Mutex<RateLimitState>,
}

/// REST client that never exceeds the server-advertised quota
///
/// Cloning is cheap; clones share the cache, the throttle flag and the backlog.
#[derive(Clone)]
pub struct RateLimitedClient {
    inner: Arc<Inner>,
}

impl RateLimitedClient {
    /// Create a client backed by `reqwest`
    pub fn new(config: RestConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client over a custom transport
    pub fn with_transport(config: RestConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let cache = ResponseCache::new(config.cache_ttl);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                state: Mutex::new(RateLimitState {
                    throttled: false,
                    throttled_until: None,
                    backlog: VecDeque::new(),
                    cache,
                }),
            }),
        }
    }

    /// Issue a request
    ///
    /// Cacheable GETs are answered from the cache while the entry is live.
    /// While throttled the request waits in the backlog and only hits the
    /// network once the backlog drains. 429 responses are re-queued,
    /// 502/525 responses are retried up to the configured budget, any other
    /// non-2xx status fails immediately.
    pub async fn request(
        &self,
        path: &str,
        method: Method,
        options: RequestOptions,
        cacheable: bool,
    ) -> Result<Value> {
        let key = fingerprint(&method, path);
        let is_get = method == Method::GET;

        if cacheable && is_get {
            if let Some(value) = self.inner.state.lock().cache.get(&key) {
                debug!("Cache hit for {} {}", method, path);
                return Ok(value);
            }
        }

        let waiter = {
            let mut state = self.inner.state.lock();
            if state.throttled {
                let (tx, rx) = oneshot::channel();
                state.backlog.push_back(tx);
                debug!("Client throttled, queued {} {} (backlog: {})", method, path, state.backlog.len());
                Some(rx)
            } else {
                None
            }
        };
        if let Some(rx) = waiter {
            rx.await.map_err(|_| RestError::BacklogClosed)?;
        }

        let request = HttpRequest {
            method,
            path: path.to_string(),
            options,
        };

        let mut transient_retries = 0;

        loop {
            let response = self.inner.transport.send(&request).await?;
            let status = response.status;

            if status != STATUS_TOO_MANY_REQUESTS && response.remaining() == Some(0) {
                let delay = response
                    .reset_after(Utc::now().timestamp_millis())
                    .unwrap_or(Duration::ZERO);
                debug!("Quota exhausted, next request will be rate limited for {:?}", delay);
                self.throttle_for(delay);
            }

            if status == STATUS_TOO_MANY_REQUESTS {
                let delay = response
                    .retry_after()
                    .unwrap_or(self.inner.config.default_retry_after);
                warn!("{} {} was rate limited, retrying in {:?}", request.method, request.path, delay);

                let (rx, until) = {
                    let mut state = self.inner.state.lock();
                    let (tx, rx) = oneshot::channel();
                    state.backlog.push_back(tx);
                    (rx, state.throttle_for(delay))
                };
                self.schedule_drain(until);

                rx.await.map_err(|_| RestError::BacklogClosed)?;
                continue;
            }

            if TRANSIENT_STATUSES.contains(&status) {
                if transient_retries >= self.inner.config.max_transient_retries {
                    warn!(
                        "{} {} failed with {} after {} attempts",
                        request.method,
                        request.path,
                        status,
                        transient_retries + 1
                    );
                    return Err(RestError::TransientExhausted {
                        status,
                        body: response.body,
                        attempts: transient_retries + 1,
                    });
                }

                transient_retries += 1;
                debug!(
                    "{} {} returned {}, retry {}/{}",
                    request.method,
                    request.path,
                    status,
                    transient_retries,
                    self.inner.config.max_transient_retries
                );
                tokio::time::sleep(self.inner.config.transient_retry_delay).await;
                continue;
            }

            if !response.is_success() {
                return Err(RestError::Status {
                    status,
                    body: response.body,
                });
            }

            let value = if response.body.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str::<Value>(&response.body)
                    .map_err(|e| RestError::Decode(e.to_string()))?
            };

            if is_get {
                self.inner.state.lock().cache.insert(key, value.clone());
            }

            return Ok(value);
        }
    }

    /// Cacheable GET
    pub async fn get(&self, path: &str) -> Result<Value> {
        self.request(path, Method::GET, RequestOptions::default(), true).await
    }

    /// POST with a JSON body
    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.request(path, Method::POST, RequestOptions::json(body), false)
            .await
    }

    /// Check if requests are currently being queued
    pub fn is_throttled(&self) -> bool {
        self.inner.state.lock().throttled
    }

    /// Number of requests waiting for the quota to reset
    pub fn backlog_len(&self) -> usize {
        self.inner.state.lock().backlog.len()
    }

    /// Drop every cached response
    pub fn clear_cache(&self) {
        self.inner.state.lock().cache.clear();
    }

    fn throttle_for(&self, delay: Duration) {
        let until = self.inner.state.lock().throttle_for(delay);
        self.schedule_drain(until);
    }

    fn schedule_drain(&self, at: Instant) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            inner.drain_backlog();
        });
    }
}

impl RateLimitState {
    /// Throttle for at least `delay`, returning when the backlog may drain
    fn throttle_for(&mut self, delay: Duration) -> Instant {
        let until = Instant::now() + delay;
        self.throttled = true;
        let until = match self.throttled_until {
            Some(current) if current > until => current,
            _ => until,
        };
        self.throttled_until = Some(until);
        until
    }
}

impl Inner {
    /// Release every queued request in submission order, then lift the throttle
    ///
    /// A drain scheduled before the throttle was extended does nothing; the
    /// extension scheduled its own.
    fn drain_backlog(&self) {
        let mut state = self.state.lock();
        if state.throttled_until.is_some_and(|until| Instant::now() < until) {
            debug!("Throttle was extended, keeping {} queued requests", state.backlog.len());
            return;
        }
        state.throttled_until = None;
        let released = state.backlog.len();

        while let Some(tx) = state.backlog.pop_front() {
            // A dropped receiver means the caller gave up on the request
            let _ = tx.send(());
        }
        state.throttled = false;

        if released > 0 {
            info!("Rate limit reset, released {} queued requests", released);
        } else {
            debug!("Rate limit reset");
        }
    }
}
