//! Debounced, single-flight request scheduling with bounded retry.
//!
//! A [`RequestScheduler`] owns one deadline, one token counter and the retry
//! count for one kind of request (detect or upload). It does no I/O: the panel
//! polls it from `tick`, issues the request when it says [`Tick::Ready`], and
//! reports the outcome back through [`RequestScheduler::finish`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::constants::{MAX_RETRIES, RETRY_BASE_MS, RETRY_GROWTH, RETRY_MAX_MS};
use crate::token::{RequestToken, TokenCounter};

/// Exponential backoff: `min(max, base * growth^retry)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub base_ms: u64,
    pub growth: f32,
    pub max_ms: u64,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_ms: RETRY_BASE_MS,
            growth: RETRY_GROWTH,
            max_ms: RETRY_MAX_MS,
            max_retries: MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let ms = self.base_ms as f64 * (self.growth as f64).powi(retry as i32);
        Duration::from_millis(ms.min(self.max_ms as f64).round() as u64)
    }

    /// Same policy with a different retry limit.
    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }
}

/// Result of polling the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Nothing armed.
    Idle,
    /// Armed, deadline not reached.
    Waiting,
    /// Deadline reached while a request was in flight; re-armed after the
    /// busy delay.
    Deferred,
    /// Deadline reached and nothing in flight: issue the request now.
    Ready,
}

/// What to do with a completed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Current and successful: apply the result.
    Commit,
    /// Superseded: drop without touching state.
    Stale,
    /// Current but failed: a retry is armed after the given delay.
    Retry(Duration),
    /// Current but failed and out of retries: idle until re-triggered.
    Exhausted,
}

#[derive(Debug)]
pub struct RequestScheduler {
    name: &'static str,
    policy: RetryPolicy,
    busy_delay: Duration,
    deadline: Option<Instant>,
    in_flight: Option<RequestToken>,
    tokens: TokenCounter,
    retries: u32,
}

impl RequestScheduler {
    pub fn new(name: &'static str, policy: RetryPolicy, busy_delay: Duration) -> Self {
        Self {
            name,
            policy,
            busy_delay,
            deadline: None,
            in_flight: None,
            tokens: TokenCounter::new(),
            retries: 0,
        }
    }

    /// User-initiated: arm after `delay` and reset the retry count.
    pub fn trigger(&mut self, now: Instant, delay: Duration) {
        self.retries = 0;
        self.schedule(now, delay);
    }

    /// Clear any pending deadline and arm a new one.
    pub fn schedule(&mut self, now: Instant, delay: Duration) {
        if self.tokens.is_retired() {
            return;
        }
        self.deadline = Some(now + delay);
        log::debug!("{}: armed in {} ms", self.name, delay.as_millis());
    }

    /// Drop the pending deadline, if any.
    pub fn cancel(&mut self) {
        if self.deadline.take().is_some() {
            log::debug!("{}: cancelled", self.name);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn in_flight(&self) -> Option<RequestToken> {
        self.in_flight
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Nothing armed and nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.deadline.is_none() && self.in_flight.is_none()
    }

    pub fn poll(&mut self, now: Instant) -> Tick {
        let Some(deadline) = self.deadline else {
            return Tick::Idle;
        };
        if now < deadline {
            return Tick::Waiting;
        }
        if self.in_flight.is_some() {
            self.deadline = Some(now + self.busy_delay);
            log::debug!("{}: busy, re-checking in {} ms", self.name, self.busy_delay.as_millis());
            return Tick::Deferred;
        }
        self.deadline = None;
        Tick::Ready
    }

    /// Issue the token for a request about to be sent.
    pub fn begin(&mut self) -> RequestToken {
        let token = self.tokens.issue();
        self.in_flight = Some(token);
        log::debug!("{}: issued {}", self.name, token);
        token
    }

    /// Make the in-flight request (if any) stale. It still occupies the
    /// single in-flight slot until its completion arrives.
    pub fn invalidate(&mut self) {
        self.tokens.invalidate();
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.tokens.is_current(token)
    }

    /// Record the completion of the request carrying `token`.
    pub fn finish(&mut self, token: RequestToken, ok: bool, now: Instant) -> Disposition {
        if self.in_flight == Some(token) {
            self.in_flight = None;
        }
        if !self.tokens.is_current(token) {
            log::debug!("{}: dropping stale response {}", self.name, token);
            return Disposition::Stale;
        }
        // Each token commits at most once.
        self.tokens.invalidate();

        if ok {
            self.retries = 0;
            return Disposition::Commit;
        }

        if self.retries >= self.policy.max_retries {
            log::warn!(
                "{}: giving up after {} retries",
                self.name,
                self.retries
            );
            return Disposition::Exhausted;
        }

        self.retries += 1;
        let delay = self.policy.delay_for(self.retries);
        self.deadline = Some(now + delay);
        log::debug!(
            "{}: retry {} in {} ms",
            self.name,
            self.retries,
            delay.as_millis()
        );
        Disposition::Retry(delay)
    }

    /// Teardown: clear the deadline and make sure nothing is current again.
    pub fn retire(&mut self) {
        self.deadline = None;
        self.in_flight = None;
        self.tokens.retire();
    }
}
