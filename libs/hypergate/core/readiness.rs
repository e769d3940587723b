//! Readiness gating
//!
//! Readiness fires exactly once per session, after every guild listed in
//! READY is available (or the unavailable-guild deadline passes) and, when
//! member loading is enabled, after every large guild's member list arrived.
//!
//! The tracker only keeps state and timers; the session decides what to send.
//! Member-request pacing is suspended while the connection is down, so
//! batches only go out on an authenticated connection.

use std::collections::{HashSet, VecDeque};
use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};

/// Outcome of recording the guilds listed in READY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Nothing to wait for
    Complete,
    /// Waiting on this many unavailable guilds
    Pending(usize),
}

/// Outcome of a supervisory chunk check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkTick {
    /// No large guild pending or in flight
    Complete,
    /// These batches were queued for sending
    Queued(usize),
    /// Member lists still in flight
    Waiting,
}

/// Timer expiries the session must act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessEvent {
    /// The unavailable-guild deadline passed
    DeadlineElapsed,
    /// Time for a supervisory chunk check
    ChunkCheck,
    /// Send a member request for this batch now
    SendBatch(Vec<String>),
}

#[derive(Debug)]
pub struct ReadinessTracker {
    unavailable_timeout: Duration,
    check_interval: Duration,
    stagger: Duration,
    batch_size: usize,

    begun: bool,
    fired: bool,
    unavailable: HashSet<String>,
    deadline: Option<Pin<Box<Sleep>>>,

    /// Keeps running after readiness so large guilds joining later are paced too
    chunk_ticker: Option<Interval>,
    /// Large guilds awaiting a member request, in arrival order
    large_pending: Vec<String>,
    /// Large guilds whose member request was queued or sent, in queue order
    large_sent: Vec<String>,
    suspended: bool,
    outbox: VecDeque<Vec<String>>,
    stagger_timer: Option<Pin<Box<Sleep>>>,
    last_batch_at: Option<Instant>,
}

impl ReadinessTracker {
    pub fn new(
        unavailable_timeout: Duration,
        check_interval: Duration,
        stagger: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            unavailable_timeout,
            check_interval,
            stagger,
            batch_size: batch_size.max(1),
            begun: false,
            fired: false,
            unavailable: HashSet::new(),
            deadline: None,
            chunk_ticker: None,
            large_pending: Vec::new(),
            large_sent: Vec::new(),
            suspended: false,
            outbox: VecDeque::new(),
            stagger_timer: None,
            last_batch_at: None,
        }
    }

    /// READY has been processed at least once
    pub fn has_begun(&self) -> bool {
        self.begun
    }

    pub fn is_ready(&self) -> bool {
        self.fired
    }

    pub fn is_chunking(&self) -> bool {
        self.chunk_ticker.is_some()
    }

    /// Record the guilds READY listed as unavailable
    ///
    /// Arms the deadline when there is anything to wait for.
    pub fn begin<I>(&mut self, unavailable: I) -> Availability
    where
        I: IntoIterator<Item = String>,
    {
        self.begun = true;
        self.unavailable = unavailable.into_iter().collect();
        if self.unavailable.is_empty() {
            return Availability::Complete;
        }
        self.deadline = Some(Box::pin(tokio::time::sleep(self.unavailable_timeout)));
        Availability::Pending(self.unavailable.len())
    }

    /// A guild became available
    ///
    /// Returns true when this was the last one being waited on. The deadline
    /// is disarmed so the completion is only reported once.
    pub fn guild_available(&mut self, guild_id: &str) -> bool {
        if self.deadline.is_none() || !self.unavailable.remove(guild_id) {
            return false;
        }
        if self.unavailable.is_empty() {
            self.deadline = None;
            return true;
        }
        false
    }

    /// Give up on the remaining unavailable guilds
    ///
    /// Returns the guilds that never showed up.
    pub fn deadline_elapsed(&mut self) -> Vec<String> {
        self.deadline = None;
        self.unavailable.drain().collect()
    }

    /// Start the supervisory chunk check, first check immediately
    ///
    /// The check is never stopped, so large guilds that join after readiness
    /// are requested at the same pace.
    pub fn start_chunking(&mut self) {
        if self.chunk_ticker.is_some() {
            return;
        }
        self.chunk_ticker = Some(self.new_ticker());
    }

    fn new_ticker(&self) -> Interval {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Stop pacing member requests until [`resume`](Self::resume)
    ///
    /// Unsent batches and guilds whose members never arrived go back to the
    /// front of the pending queue. Returns how many guilds were requeued.
    pub fn suspend(&mut self) -> usize {
        self.suspended = true;
        self.stagger_timer = None;
        self.outbox.clear();

        let mut requeued = std::mem::take(&mut self.large_sent);
        let count = requeued.len();
        requeued.append(&mut self.large_pending);
        self.large_pending = requeued;
        count
    }

    /// Resume pacing on a fresh authenticated connection
    ///
    /// The next chunk check runs immediately.
    pub fn resume(&mut self) {
        if !self.suspended {
            return;
        }
        self.suspended = false;
        if self.chunk_ticker.is_some() {
            self.chunk_ticker = Some(self.new_ticker());
        }
    }

    /// Queue a large guild for a member request
    pub fn enqueue_large(&mut self, guild_id: String) {
        if self.large_sent.contains(&guild_id) || self.large_pending.contains(&guild_id) {
            return;
        }
        self.large_pending.push(guild_id);
    }

    pub fn pending_large(&self) -> &[String] {
        &self.large_pending
    }

    pub fn in_flight(&self) -> usize {
        self.large_sent.len()
    }

    /// Nothing pending and nothing in flight
    pub fn chunking_done(&self) -> bool {
        self.large_pending.is_empty() && self.large_sent.is_empty()
    }

    /// Supervisory check: move pending guilds into staggered batches
    pub fn chunk_tick(&mut self) -> ChunkTick {
        if self.chunking_done() {
            return ChunkTick::Complete;
        }
        if self.large_pending.is_empty() {
            return ChunkTick::Waiting;
        }

        let pending = std::mem::take(&mut self.large_pending);
        let mut queued = 0;
        for batch in pending.chunks(self.batch_size) {
            self.large_sent.extend_from_slice(batch);
            self.outbox.push_back(batch.to_vec());
            queued += 1;
        }
        if self.stagger_timer.is_none() {
            self.arm_stagger();
        }
        ChunkTick::Queued(queued)
    }

    /// A guild's member list is complete
    pub fn member_chunk_complete(&mut self, guild_id: &str) -> bool {
        match self.large_sent.iter().position(|id| id == guild_id) {
            Some(index) => {
                self.large_sent.remove(index);
                true
            }
            None => false,
        }
    }

    /// Mark readiness, returning true only the first time
    pub fn mark_ready(&mut self) -> bool {
        if self.fired {
            return false;
        }
        self.fired = true;
        self.deadline = None;
        true
    }

    fn arm_stagger(&mut self) {
        let now = Instant::now();
        let at = self
            .last_batch_at
            .map(|last| (last + self.stagger).max(now))
            .unwrap_or(now);
        self.stagger_timer = Some(Box::pin(tokio::time::sleep_until(at)));
    }

    /// Wait for the next timer expiry
    ///
    /// Never resolves when no timer is armed. While suspended only the
    /// unavailable-guild deadline can fire. Cancel-safe.
    pub async fn next_event(&mut self) -> ReadinessEvent {
        let suspended = self.suspended;
        let deadline = &mut self.deadline;
        let stagger = &mut self.stagger_timer;
        let ticker = &mut self.chunk_ticker;

        let deadline = async move {
            match deadline {
                Some(sleep) => sleep.as_mut().await,
                None => pending::<()>().await,
            }
        };
        let stagger = async move {
            match stagger {
                Some(sleep) if !suspended => sleep.as_mut().await,
                _ => pending::<()>().await,
            }
        };
        let tick = async move {
            match ticker {
                Some(ticker) if !suspended => {
                    ticker.tick().await;
                }
                _ => pending::<()>().await,
            }
        };

        let fired = tokio::select! {
            biased;
            _ = deadline => Fired::Deadline,
            _ = stagger => Fired::Stagger,
            _ = tick => Fired::Tick,
        };

        match fired {
            Fired::Deadline => {
                self.deadline = None;
                ReadinessEvent::DeadlineElapsed
            }
            Fired::Tick => ReadinessEvent::ChunkCheck,
            Fired::Stagger => {
                self.stagger_timer = None;
                let batch = self.outbox.pop_front().unwrap_or_default();
                self.last_batch_at = Some(Instant::now());
                if !self.outbox.is_empty() {
                    self.arm_stagger();
                }
                ReadinessEvent::SendBatch(batch)
            }
        }
    }
}

enum Fired {
    Deadline,
    Stagger,
    Tick,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ReadinessTracker {
        ReadinessTracker::new(
            Duration::from_secs(60),
            Duration::from_secs(5),
            Duration::from_secs(1),
            50,
        )
    }

    fn ids(range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| i.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_unavailable_guilds_completes_immediately() {
        let mut tracker = tracker();
        assert_eq!(tracker.begin(Vec::new()), Availability::Complete);
        assert!(tracker.has_begun());

        let waited = tokio::time::timeout(Duration::from_secs(120), tracker.next_event()).await;
        assert!(waited.is_err(), "no timer should be armed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_available_guild_completes_once() {
        let mut tracker = tracker();
        assert_eq!(
            tracker.begin(vec!["A".into(), "B".into(), "C".into()]),
            Availability::Pending(3)
        );

        assert!(!tracker.guild_available("A"));
        assert!(!tracker.guild_available("unknown"));
        assert!(!tracker.guild_available("B"));
        assert!(tracker.guild_available("C"));
        assert!(!tracker.guild_available("C"));

        let waited = tokio::time::timeout(Duration::from_secs(120), tracker.next_event()).await;
        assert!(waited.is_err(), "deadline must be disarmed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_after_timeout() {
        let mut tracker = tracker();
        let start = Instant::now();
        tracker.begin(vec!["A".into(), "B".into()]);
        tracker.guild_available("A");

        assert_eq!(tracker.next_event().await, ReadinessEvent::DeadlineElapsed);
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        assert_eq!(tracker.deadline_elapsed(), vec!["B".to_string()]);

        // Late arrivals no longer complete anything
        assert!(!tracker.guild_available("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_guilds_are_batched_and_staggered() {
        let mut tracker = tracker();
        for id in ids(0..120) {
            tracker.enqueue_large(id);
        }
        tracker.start_chunking();

        let start = Instant::now();
        assert_eq!(tracker.next_event().await, ReadinessEvent::ChunkCheck);
        assert_eq!(tracker.chunk_tick(), ChunkTick::Queued(3));
        assert!(tracker.pending_large().is_empty());
        assert_eq!(tracker.in_flight(), 120);

        let mut batches = Vec::new();
        while batches.len() < 3 {
            if let ReadinessEvent::SendBatch(batch) = tracker.next_event().await {
                batches.push((start.elapsed(), batch));
            }
        }

        assert_eq!(batches[0].1, ids(0..50));
        assert_eq!(batches[1].1, ids(50..100));
        assert_eq!(batches[2].1, ids(100..120));
        assert_eq!(batches[0].0, Duration::ZERO);
        assert!(batches[1].0 - batches[0].0 >= Duration::from_secs(1));
        assert!(batches[2].0 - batches[1].0 >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunking_completes_when_members_arrive() {
        let mut tracker = tracker();
        tracker.enqueue_large("g1".into());
        tracker.enqueue_large("g1".into());
        tracker.start_chunking();

        assert_eq!(tracker.next_event().await, ReadinessEvent::ChunkCheck);
        assert_eq!(tracker.chunk_tick(), ChunkTick::Queued(1));
        assert_eq!(
            tracker.next_event().await,
            ReadinessEvent::SendBatch(vec!["g1".to_string()])
        );

        // Already sent, so not queued again
        tracker.enqueue_large("g1".into());
        assert!(tracker.pending_large().is_empty());

        assert_eq!(tracker.next_event().await, ReadinessEvent::ChunkCheck);
        assert_eq!(tracker.chunk_tick(), ChunkTick::Waiting);

        assert!(tracker.member_chunk_complete("g1"));
        assert!(tracker.chunking_done());
        assert_eq!(tracker.chunk_tick(), ChunkTick::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_requeues_unanswered_guilds_in_order() {
        let mut tracker = tracker();
        for id in ids(0..120) {
            tracker.enqueue_large(id);
        }
        tracker.start_chunking();

        assert_eq!(tracker.next_event().await, ReadinessEvent::ChunkCheck);
        assert_eq!(tracker.chunk_tick(), ChunkTick::Queued(3));
        assert_eq!(tracker.next_event().await, ReadinessEvent::SendBatch(ids(0..50)));
        assert!(tracker.member_chunk_complete("7"));

        // Dropped after the first batch: 49 unanswered, 70 never sent
        tracker.enqueue_large("late".into());
        assert_eq!(tracker.suspend(), 119);
        assert!(tracker.is_suspended());
        assert_eq!(tracker.in_flight(), 0);

        let mut expected: Vec<String> = ids(0..120).into_iter().filter(|id| id != "7").collect();
        expected.push("late".to_string());
        assert_eq!(tracker.pending_large(), expected.as_slice());
        assert!(!tracker.chunking_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspended_tracker_sends_nothing_until_resumed() {
        let mut tracker = tracker();
        tracker.enqueue_large("g1".into());
        tracker.start_chunking();
        assert_eq!(tracker.next_event().await, ReadinessEvent::ChunkCheck);
        tracker.suspend();

        let waited = tokio::time::timeout(Duration::from_secs(30), tracker.next_event()).await;
        assert!(waited.is_err(), "no pacing events while suspended");

        let resumed_at = Instant::now();
        tracker.resume();
        assert_eq!(tracker.next_event().await, ReadinessEvent::ChunkCheck);
        assert_eq!(resumed_at.elapsed(), Duration::ZERO);
        assert_eq!(tracker.chunk_tick(), ChunkTick::Queued(1));
        assert_eq!(
            tracker.next_event().await,
            ReadinessEvent::SendBatch(vec!["g1".to_string()])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_still_fires_while_suspended() {
        let mut tracker = tracker();
        tracker.begin(vec!["A".into()]);
        tracker.suspend();
        assert_eq!(tracker.next_event().await, ReadinessEvent::DeadlineElapsed);
    }

    #[test]
    fn test_mark_ready_only_once() {
        let mut tracker = tracker();
        assert!(tracker.mark_ready());
        assert!(!tracker.mark_ready());
        assert!(tracker.is_ready());
    }
}
