//! Deadline-bounded polling.
//!
//! A backend-driven page is fetched by asking repeatedly until the backend
//! has it. [`Poller::run`] drives that loop as a small state machine over
//! [`PollStep`]s and stops on the first of:
//!
//! - a ready value,
//! - a definitive rejection,
//! - the deadline, measured from the first attempt.
//!
//! "Not ready" and transient failures only extend the loop. Time is read
//! through a [`Clock`] so tests can run a 300 s deadline in microseconds.

use crate::config::PollConfig;
use crate::error::ExtractError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Time source for the poll loop.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time and tokio timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock that only moves when slept on. Sleeping returns immediately.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    /// Total simulated time slept so far.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Outcome of one poll attempt.
#[derive(Debug)]
pub enum PollStep<T> {
    Ready(T),
    /// Not available yet; ask again after the interval.
    NotReady,
    /// The attempt failed in a way worth retrying.
    Transient(String),
    /// The attempt failed definitively; stop polling.
    Rejected(ExtractError),
}

/// Final result of a poll loop.
#[derive(Debug)]
pub enum PollOutcome<T> {
    Ready { value: T, attempts: u32 },
    Rejected { error: ExtractError, attempts: u32 },
    DeadlineExceeded {
        attempts: u32,
        last_error: Option<String>,
    },
}

/// Runs poll loops with a fixed interval and deadline.
#[derive(Clone)]
pub struct Poller {
    config: PollConfig,
    clock: Arc<dyn Clock>,
}

impl Poller {
    pub fn new(config: PollConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Call `attempt` (with the 1-based attempt number) until it settles or
    /// the deadline passes. The sleep before the last attempt is shortened
    /// so the loop never overruns the deadline.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> PollOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = PollStep<T>>,
    {
        let PollConfig { interval, deadline } = self.config;
        let started = self.clock.now();
        let mut attempts = 0u32;
        let mut last_error = None;

        loop {
            attempts += 1;
            match attempt(attempts).await {
                PollStep::Ready(value) => return PollOutcome::Ready { value, attempts },
                PollStep::Rejected(error) => return PollOutcome::Rejected { error, attempts },
                PollStep::NotReady => {
                    debug!("poll attempt {} not ready", attempts);
                }
                PollStep::Transient(err) => {
                    debug!("poll attempt {} failed transiently: {}", attempts, err);
                    last_error = Some(err);
                }
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed >= deadline {
                break;
            }
            self.clock.sleep(interval.min(deadline - elapsed)).await;
            if self.clock.now().saturating_duration_since(started) >= deadline {
                break;
            }
        }

        PollOutcome::DeadlineExceeded {
            attempts,
            last_error,
        }
    }
}
