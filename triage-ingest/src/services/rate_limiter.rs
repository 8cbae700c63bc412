//! Admission control for the ingestion boundary and judgment-service calls
//!
//! Window-by-reset counting rather than a true sliding window: a hit either
//! lands in the key's current window or starts a fresh one. Two instances
//! run in the service, one keyed by API key at the ingestion boundary and
//! one keyed by organization in front of the analysis orchestrator.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};

use chrono::{DateTime, Utc};

/// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window (0 when denied)
    pub remaining: u32,
    /// When the current window ends
    pub reset_at: DateTime<Utc>,
}

struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Keyed request counter with a fixed window and limit
///
/// Safe for concurrent use; ingestion calls run in parallel and share one
/// instance per concern.
pub struct SlidingWindowLimiter {
    windows: Mutex<HashMap<String, Window>>,
    window: chrono::Duration,
    max_requests: u32,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window: chrono::Duration::from_std(window)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            max_requests,
        }
    }

    /// Record a hit for `key` and decide whether it is admitted
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = Utc::now();
        let mut windows = self.windows.lock().expect("limiter table poisoned");

        // Opportunistic sweep of expired windows to bound memory.
        if rand::random::<f64>() < 0.01 {
            windows.retain(|_, w| w.reset_at > now);
        }

        let window = windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            reset_at: now + self.window,
        });

        if window.reset_at <= now {
            // Previous window expired; this hit starts a fresh one.
            window.count = 0;
            window.reset_at = now + self.window;
        }

        if window.count >= self.max_requests {
            tracing::debug!(key, limit = self.max_requests, "Rate limit exceeded");
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: window.reset_at,
            };
        }

        window.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: self.max_requests - window.count,
            reset_at: window.reset_at,
        }
    }

    /// Configured per-window limit
    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    /// Number of tracked keys (debugging/tests)
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().expect("limiter table poisoned").len()
    }
}
