// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-principal token bucket rate limiting with periodic idle-bucket
// reclamation. All state is process-local; there is no cross-node
// coordination.

use printbroker_core::PrintBrokerError;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{instrument, warn};

/// A single principal's token bucket.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    refill_rate: f64, // tokens per second
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_rate,
            tokens: capacity as f64,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn consume(&mut self, cost: f64) -> bool {
        self.refill();
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    fn wait_time(&mut self, cost: f64) -> f64 {
        self.refill();
        if self.tokens >= cost {
            0.0
        } else {
            (cost - self.tokens) / self.refill_rate
        }
    }

    fn idle_for(&self) -> Duration {
        Instant::now().duration_since(self.last_refill)
    }
}

/// Token-bucket rate limiter keyed by principal (the `client_id` claim).
pub struct RateLimiter {
    requests_per_minute: u32,
    refill_rate: f64,
    burst_size: u32,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32, burst_size: u32) -> Self {
        Self {
            requests_per_minute,
            refill_rate: requests_per_minute as f64 / 60.0,
            burst_size,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts to charge `cost` tokens to `principal`. Returns `Ok(())` on
    /// success, or `Err(RateLimited { retry_after_secs })` on refusal.
    #[instrument(skip(self))]
    pub fn check(&self, principal: &str, cost: u32) -> Result<(), PrintBrokerError> {
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets
            .entry(principal.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst_size, self.refill_rate));

        if bucket.consume(cost as f64) {
            Ok(())
        } else {
            let retry_after_secs = bucket.wait_time(cost as f64);
            warn!(principal, retry_after_secs, "rate limit exceeded");
            Err(PrintBrokerError::RateLimited { retry_after_secs })
        }
    }

    pub fn remaining(&self, principal: &str) -> u32 {
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets
            .entry(principal.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst_size, self.refill_rate));
        bucket.refill();
        bucket.tokens as u32
    }

    pub fn reset(&self, principal: &str) {
        self.buckets
            .lock()
            .expect("rate limiter mutex poisoned")
            .remove(principal);
    }

    /// Evicts buckets that have not been touched for longer than `max_idle`.
    /// Intended to run on a periodic background task (spec default interval
    /// 300s, max_idle 600s).
    #[instrument(skip(self))]
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let before = buckets.len();
        buckets.retain(|_, bucket| bucket.idle_for() <= max_idle);
        before - buckets.len()
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    pub fn burst_size(&self) -> u32 {
        self.burst_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_bucket_allows_exactly_burst_requests() {
        let limiter = RateLimiter::new(60, 5);
        for _ in 0..5 {
            limiter.check("client-a", 1).expect("within burst");
        }
        let err = limiter.check("client-a", 1).unwrap_err();
        assert!(matches!(err, PrintBrokerError::RateLimited { .. }));
    }

    #[test]
    fn distinct_principals_do_not_share_budget() {
        let limiter = RateLimiter::new(60, 2);
        limiter.check("a", 1).unwrap();
        limiter.check("a", 1).unwrap();
        assert!(limiter.check("a", 1).is_err());
        // b's budget is untouched by a's exhaustion.
        limiter.check("b", 1).unwrap();
        limiter.check("b", 1).unwrap();
    }

    #[test]
    fn reset_restores_full_burst() {
        let limiter = RateLimiter::new(60, 1);
        limiter.check("a", 1).unwrap();
        assert!(limiter.check("a", 1).is_err());
        limiter.reset("a");
        limiter.check("a", 1).unwrap();
    }

    #[test]
    fn sweep_evicts_only_idle_buckets() {
        let limiter = RateLimiter::new(60, 5);
        limiter.check("a", 1).unwrap();
        let evicted = limiter.sweep_idle(Duration::from_secs(0));
        // Even a bucket touched "now" has near-zero idle time; with a
        // zero max_idle everything not touched in the same instant evicts.
        assert!(evicted <= 1);
    }
}
