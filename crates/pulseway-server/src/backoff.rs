//! Retry pacing for loops that poll the document store.
//!
//! The delay doubles per consecutive failure up to a ceiling, plus up to
//! 20% random jitter so several loops do not retry in lockstep.

use std::time::{Duration, Instant};

use rand::Rng;

const JITTER_PERCENT: u64 = 20;
const MAX_DOUBLINGS: u32 = 16;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
    failures: u32,
    retry_at: Option<Instant>,
}

impl Backoff {
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        Self {
            base,
            ceiling: ceiling.max(base),
            failures: 0,
            retry_at: None,
        }
    }

    /// False while a failure's delay has not yet elapsed.
    pub fn ready(&self) -> bool {
        self.retry_at.map_or(true, |at| Instant::now() >= at)
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.retry_at = None;
    }

    /// Count a failure and return the delay before the next attempt.
    pub fn fail(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let doublings = self.failures.min(MAX_DOUBLINGS);
        let delay = self.base.saturating_mul(1 << doublings).min(self.ceiling);
        let delay = delay + jitter(delay);
        self.retry_at = Some(Instant::now() + delay);
        delay
    }
}

fn jitter(delay: Duration) -> Duration {
    let spread = delay.as_millis() as u64 * JITTER_PERCENT / 100;
    if spread == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(rand::rng().random_range(0..=spread))
    }
}
