//! Fixed-window broadcast admission control
//!
//! Each window admits up to `max_per_window` NORMAL messages. Anything over
//! the limit waits in a bounded FIFO queue; when the queue is full the oldest
//! entry is dropped. While entries are waiting, new messages join the back
//! of the queue even if the window has room, so FIFO order survives the
//! window boundary.
//!
//! The limiter does no I/O and takes the current time as an argument, which
//! keeps it deterministic under test.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::socket_server::Message;

/// A message waiting for window capacity
#[derive(Debug, Clone)]
pub struct QueuedBroadcast {
    pub message: Message,
    pub channel: Option<String>,
    pub enqueued_at: Instant,
}

/// Outcome of [`RateLimiter::enqueue`]
#[derive(Debug)]
pub struct Enqueued {
    /// Queue length after the push
    pub queue_len: usize,
    /// Entry evicted to make room, if the queue was full
    pub dropped: Option<QueuedBroadcast>,
}

/// Serializable limiter state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterSnapshot {
    pub max_per_window: u32,
    pub window_ms: u64,
    pub count_in_window: u32,
    pub queue_len: usize,
    pub queue_bound: usize,
    pub dropped: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_per_window: u32,
    queue_bound: usize,
    window_start: Instant,
    count_in_window: u32,
    queue: VecDeque<QueuedBroadcast>,
    dropped: u64,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            window: config.window(),
            max_per_window: config.max_messages_per_second,
            queue_bound: config.burst_limit,
            window_start: now,
            count_in_window: 0,
            queue: VecDeque::new(),
            dropped: 0,
        }
    }

    /// Start a new window if the current one has elapsed
    pub fn roll_window(&mut self, now: Instant) {
        if now.saturating_duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.count_in_window = 0;
        }
    }

    fn capacity(&self) -> u32 {
        self.max_per_window.saturating_sub(self.count_in_window)
    }

    /// Claim a slot for an immediate send.
    ///
    /// Fails when the window is exhausted or older messages are still queued.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.roll_window(now);
        if !self.queue.is_empty() || self.capacity() == 0 {
            return false;
        }
        self.count_in_window += 1;
        true
    }

    /// Queue a message; evicts the oldest entry when full
    pub fn enqueue(&mut self, message: Message, channel: Option<String>, now: Instant) -> Enqueued {
        let mut dropped = None;
        if self.queue.len() >= self.queue_bound.max(1) {
            dropped = self.queue.pop_front();
            self.dropped += 1;
        }
        self.queue.push_back(QueuedBroadcast {
            message,
            channel,
            enqueued_at: now,
        });
        Enqueued {
            queue_len: self.queue.len(),
            dropped,
        }
    }

    /// Pop as many queued entries as the current window allows, oldest first.
    /// Each returned entry has been counted against the window.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<QueuedBroadcast> {
        self.roll_window(now);
        let n = (self.capacity() as usize).min(self.queue.len());
        self.count_in_window += n as u32;
        self.queue.drain(..n).collect()
    }

    /// Discard everything queued, counting it as dropped
    pub fn clear(&mut self) -> usize {
        let n = self.queue.len();
        self.queue.clear();
        self.dropped += n as u64;
        n
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    pub fn reset_counters(&mut self) {
        self.dropped = 0;
    }

    /// State as of `now`; an elapsed window reports zero usage
    pub fn snapshot(&self, now: Instant) -> RateLimiterSnapshot {
        let count_in_window = if now.saturating_duration_since(self.window_start) >= self.window {
            0
        } else {
            self.count_in_window
        };
        RateLimiterSnapshot {
            max_per_window: self.max_per_window,
            window_ms: self.window.as_millis() as u64,
            count_in_window,
            queue_len: self.queue.len(),
            queue_bound: self.queue_bound,
            dropped: self.dropped,
        }
    }
}
