//! Per-domain sliding-window rate limiter.
//!
//! The only state shared between concurrent units of work. Each domain has
//! its own lock guarding its request history; callers for the same domain
//! queue on that lock, callers for different domains never contend beyond
//! the brief map lookup.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

type History = Arc<Mutex<VecDeque<Instant>>>;

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    domains: Mutex<HashMap<String, History>>,
}

impl RateLimiter {
    pub fn per_minute(requests: u32) -> Self {
        Self::with_window(requests as usize, Duration::from_secs(60))
    }

    pub fn with_window(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until a request to `domain` fits in the window, then record it.
    pub async fn acquire(&self, domain: &str) {
        let history = {
            let mut domains = self.domains.lock().await;
            Arc::clone(domains.entry(domain.to_string()).or_default())
        };

        let mut history = history.lock().await;
        loop {
            let now = Instant::now();
            match wait_needed(&mut history, now, self.max_requests, self.window) {
                None => {
                    history.push_back(now);
                    return;
                }
                Some(wait) => {
                    debug!(domain, wait_ms = wait.as_millis() as u64, "Rate limit reached; waiting");
                    sleep(wait).await;
                }
            }
        }
    }
}

/// Drop timestamps older than `window` and report how long to wait before
/// another request fits, or `None` if one fits now.
pub fn wait_needed(
    history: &mut VecDeque<Instant>,
    now: Instant,
    max_requests: usize,
    window: Duration,
) -> Option<Duration> {
    while let Some(&oldest) = history.front() {
        if now.duration_since(oldest) >= window {
            history.pop_front();
        } else {
            break;
        }
    }
    if history.len() < max_requests {
        return None;
    }
    history
        .front()
        .map(|&oldest| window.saturating_sub(now.duration_since(oldest)))
}
