//! Rate limiting module
//!
//! Rolling-window call ceiling shared by the model gateway and the web tools.
//! A caller that would exceed the ceiling is delayed until the oldest call in
//! the window expires; it is never rejected. There is no queue: waiters
//! simply re-check after sleeping, so ordering between waiters is not fair.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rolling-window rate limiter
#[derive(Debug)]
pub struct RateWindow {
    name: String,
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateWindow {
    /// Create a limiter allowing `max_calls` per `window`
    ///
    /// A `max_calls` of zero is treated as one.
    pub fn new(name: impl Into<String>, max_calls: usize, window: Duration) -> Self {
        Self {
            name: name.into(),
            max_calls: max_calls.max(1),
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Limiter with a per-minute ceiling
    pub fn per_minute(name: impl Into<String>, max_calls: usize) -> Self {
        Self::new(name, max_calls, Duration::from_secs(60))
    }

    /// Wait until a call is allowed, then record it
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();

        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                Self::prune(&mut calls, now, self.window);

                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    let waited = now.duration_since(started);
                    debug!(
                        limiter = %self.name,
                        in_window = calls.len(),
                        max = self.max_calls,
                        "Rate window slot acquired"
                    );
                    return waited;
                }

                // The front entry is the oldest; it leaves the window first
                match calls.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            warn!(
                limiter = %self.name,
                wait_ms = wait.as_millis() as u64,
                max = self.max_calls,
                window_secs = self.window.as_secs(),
                "Rate ceiling reached, delaying call"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Calls currently counted in the window
    pub async fn in_window(&self) -> usize {
        let mut calls = self.calls.lock().await;
        Self::prune(&mut calls, Instant::now(), self.window);
        calls.len()
    }

    fn prune(calls: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = calls.front() {
            if now.duration_since(*oldest) >= window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }
}
