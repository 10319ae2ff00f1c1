//! Client-side admission control for inference calls
//!
//! Sliding window with a minimum spacing between admissions. One limiter
//! is shared by every pipeline invocation in the process.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::error::{ExtractError, Result};

/// Outcome of one [`RateLimiter::allow`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted,
    /// Retry after `wait`
    Denied { wait: Duration },
}

impl Admission {
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Snapshot for caller-side backpressure decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimiterStats {
    pub current_requests: usize,
    pub max_requests: usize,
    pub window: Duration,
    pub min_interval: Duration,
    /// At or above 80% of `max_requests`
    pub near_limit: bool,
}

#[derive(Debug, Default)]
struct State {
    admitted: VecDeque<Instant>,
    last_admission: Option<Instant>,
}

impl State {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.admitted.front() {
            if now.duration_since(*oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Thread-safe sliding-window limiter
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    min_interval: Duration,
    state: Mutex<State>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration, min_interval: Duration) -> Self {
        Self {
            max_requests,
            window,
            min_interval,
            state: Mutex::new(State {
                admitted: VecDeque::with_capacity(max_requests),
                last_admission: None,
            }),
        }
    }

    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window(), config.min_interval())
    }

    /// Admit now or report how long to wait
    pub fn allow(&self) -> Admission {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(last) = state.last_admission {
            let since = now.duration_since(last);
            if since < self.min_interval {
                return Admission::Denied {
                    wait: self.min_interval - since,
                };
            }
        }

        state.prune(now, self.window);

        if state.admitted.len() >= self.max_requests {
            let wait = state.admitted.front().map_or(self.window, |oldest| {
                self.window.saturating_sub(now.duration_since(*oldest))
            });
            return Admission::Denied { wait };
        }

        state.admitted.push_back(now);
        state.last_admission = Some(now);
        Admission::Granted
    }

    /// Block until admitted, or fail with `Cancelled` once `cancel` is true
    pub async fn wait(&self, cancel: &mut watch::Receiver<bool>) -> Result<()> {
        loop {
            if *cancel.borrow() {
                return Err(ExtractError::Cancelled);
            }

            let wait = match self.allow() {
                Admission::Granted => return Ok(()),
                Admission::Denied { wait } => wait,
            };
            debug!(wait_ms = wait.as_millis(), "Rate limited, waiting");

            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                changed = cancel.changed() => {
                    if changed.is_err() {
                        // Sender gone: cancellation can no longer arrive.
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> RateLimiterStats {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.prune(now, self.window);
        let current_requests = state.admitted.len();

        RateLimiterStats {
            current_requests,
            max_requests: self.max_requests,
            window: self.window,
            min_interval: self.min_interval,
            near_limit: current_requests * 5 >= self.max_requests * 4,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
