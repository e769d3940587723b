//! Heartbeat scheduling and acknowledgement tracking
//!
//! The monitor owns two timers and no task: the session polls
//! [`HeartbeatMonitor::next_event`] from its `select!` loop.
//!
//! ```text
//! start(N) ──> Beat (immediately) ──> record_sent() arms ack deadline (N)
//!                  │                          │
//!                  │ every N                  ├─ acknowledge() before N: disarmed
//!                  v                          └─ no ack within N: AckTimeout
//!                 Beat ...
//! ```
//!
//! A beat never pushes back a pending ack deadline; an unacknowledged beat
//! times out N after it was sent regardless of later beats.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};

/// What the monitor wants the session to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a heartbeat now
    Beat,
    /// The last heartbeat was not acknowledged in time
    AckTimeout,
}

#[derive(Debug, Default)]
pub struct HeartbeatMonitor {
    interval: Option<Duration>,
    ticker: Option<Interval>,
    ack_deadline: Option<Pin<Box<Sleep>>>,
    last_sent: Option<Instant>,
    latency: Option<Duration>,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start beating every `interval`, first beat immediately
    ///
    /// Any running schedule and pending ack deadline are cancelled first.
    pub fn start(&mut self, interval: Duration) {
        self.stop();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
        self.ticker = Some(ticker);
    }

    /// Cancel the schedule and any pending ack deadline
    pub fn stop(&mut self) {
        self.ticker = None;
        self.ack_deadline = None;
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn is_awaiting_ack(&self) -> bool {
        self.ack_deadline.is_some()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Round trip of the last acknowledged heartbeat
    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    /// Record that a heartbeat went out and arm its ack deadline
    pub fn record_sent(&mut self) {
        self.last_sent = Some(Instant::now());
        if self.ack_deadline.is_none() {
            if let Some(interval) = self.interval {
                self.ack_deadline = Some(Box::pin(tokio::time::sleep(interval)));
            }
        }
    }

    /// Disarm the ack deadline, returning the measured round trip
    pub fn acknowledge(&mut self) -> Option<Duration> {
        self.ack_deadline = None;
        let latency = self.last_sent.map(|sent| sent.elapsed());
        if latency.is_some() {
            self.latency = latency;
        }
        latency
    }

    /// Wait for the next heartbeat event
    ///
    /// Never resolves while stopped. Cancel-safe.
    pub async fn next_event(&mut self) -> HeartbeatEvent {
        let ack_deadline = &mut self.ack_deadline;
        let ticker = &mut self.ticker;

        let ack = async move {
            match ack_deadline {
                Some(deadline) => deadline.as_mut().await,
                None => pending::<()>().await,
            }
        };
        let tick = async move {
            match ticker {
                Some(ticker) => {
                    ticker.tick().await;
                }
                None => pending::<()>().await,
            }
        };

        let event = tokio::select! {
            biased;
            _ = ack => HeartbeatEvent::AckTimeout,
            _ = tick => HeartbeatEvent::Beat,
        };

        if event == HeartbeatEvent::AckTimeout {
            self.ack_deadline = None;
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(45_000);

    #[tokio::test(start_paused = true)]
    async fn test_first_beat_is_immediate_then_periodic() {
        let mut monitor = HeartbeatMonitor::new();
        let start = Instant::now();
        monitor.start(INTERVAL);

        assert_eq!(monitor.next_event().await, HeartbeatEvent::Beat);
        assert_eq!(start.elapsed(), Duration::ZERO);
        monitor.record_sent();
        monitor.acknowledge();

        assert_eq!(monitor.next_event().await, HeartbeatEvent::Beat);
        assert_eq!(start.elapsed(), INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_beat_times_out() {
        let mut monitor = HeartbeatMonitor::new();
        let start = Instant::now();
        monitor.start(INTERVAL);

        assert_eq!(monitor.next_event().await, HeartbeatEvent::Beat);
        monitor.record_sent();

        assert_eq!(monitor.next_event().await, HeartbeatEvent::AckTimeout);
        assert_eq!(start.elapsed(), INTERVAL);
        assert!(!monitor.is_awaiting_ack());
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_beat_does_not_extend_deadline() {
        let mut monitor = HeartbeatMonitor::new();
        let start = Instant::now();
        monitor.start(Duration::from_secs(10));

        assert_eq!(monitor.next_event().await, HeartbeatEvent::Beat);
        monitor.record_sent();
        tokio::time::advance(Duration::from_secs(4)).await;
        monitor.record_sent();

        assert_eq!(monitor.next_event().await, HeartbeatEvent::AckTimeout);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledge_measures_latency() {
        let mut monitor = HeartbeatMonitor::new();
        monitor.start(INTERVAL);
        monitor.next_event().await;
        monitor.record_sent();

        tokio::time::advance(Duration::from_millis(120)).await;
        assert_eq!(monitor.acknowledge(), Some(Duration::from_millis(120)));
        assert_eq!(monitor.latency(), Some(Duration::from_millis(120)));
        assert!(!monitor.is_awaiting_ack());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_monitor_never_fires() {
        let mut monitor = HeartbeatMonitor::new();
        monitor.start(INTERVAL);
        monitor.next_event().await;
        monitor.record_sent();
        monitor.stop();

        let waited = tokio::time::timeout(INTERVAL * 4, monitor.next_event()).await;
        assert!(waited.is_err());
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_schedule() {
        let mut monitor = HeartbeatMonitor::new();
        monitor.start(INTERVAL);
        monitor.next_event().await;
        monitor.record_sent();

        let restarted = Instant::now();
        monitor.start(Duration::from_secs(5));
        assert!(!monitor.is_awaiting_ack());
        assert_eq!(monitor.next_event().await, HeartbeatEvent::Beat);
        assert_eq!(restarted.elapsed(), Duration::ZERO);
        assert_eq!(monitor.interval(), Some(Duration::from_secs(5)));
    }
}
