use std::time::{Duration, Instant};

use rand::Rng;

/// Tracks per-identity reconnect state: exponential backoff capped at 60s,
/// reset to 1s on a successful connect, and a failure count windowed to the
/// last 15 minutes so a burst of old failures doesn't itself trip the
/// unauthenticated threshold.
pub struct ReconnectState {
    backoff: Duration,
    failures: Vec<Instant>,
}

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const FAILURE_WINDOW: Duration = Duration::from_secs(15 * 60);
const FAILURE_THRESHOLD: usize = 10;

impl Default for ReconnectState {
    fn default() -> Self {
        Self { backoff: MIN_BACKOFF, failures: Vec::new() }
    }
}

impl ReconnectState {
    pub fn on_success(&mut self) {
        self.backoff = MIN_BACKOFF;
    }

    /// Records a failed reconnect attempt and returns the jittered delay to
    /// wait before retrying: `min(backoff * 2 * rand(0.8..1.2), 60s)`.
    pub fn on_failure(&mut self) -> Duration {
        let now = Instant::now();
        self.failures.push(now);
        self.failures.retain(|t| now.duration_since(*t) < FAILURE_WINDOW);

        let jitter: f64 = rand::thread_rng().gen_range(0.8..1.2);
        let next = (self.backoff.as_secs_f64() * 2.0 * jitter).min(MAX_BACKOFF.as_secs_f64());
        self.backoff = Duration::from_secs_f64(next);
        self.backoff
    }

    /// `true` once 10+ reconnect failures have landed within the last 15
    /// minutes: the identity should be marked unauthenticated and its
    /// channels put on hold.
    pub fn should_mark_unauthenticated(&self) -> bool {
        self.failures.len() >= FAILURE_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_resets() {
        let mut state = ReconnectState::default();
        let d1 = state.on_failure();
        assert!(d1.as_secs_f64() >= 1.6 && d1.as_secs_f64() <= 2.4);
        let d2 = state.on_failure();
        assert!(d2 > d1);
        state.on_success();
        assert_eq!(state.backoff, MIN_BACKOFF);
    }

    #[test]
    fn flags_unauthenticated_after_ten_failures_in_window() {
        let mut state = ReconnectState::default();
        for _ in 0..9 {
            state.on_failure();
        }
        assert!(!state.should_mark_unauthenticated());
        state.on_failure();
        assert!(state.should_mark_unauthenticated());
    }
}
