use std::time::Duration;

use rand::Rng;

/// Per-task restart policy: `(max_retries, initial_backoff, max_backoff,
/// multiplier)` per spec §4.14, the same shape `ingest_core::retry::RetryPolicy`
/// uses for per-call retries, generalised here to whole-task restarts.
#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Restart count resets once a task has run this long without dying —
    /// the "per rolling window" qualifier in spec §4.14, so a task that
    /// flaps once after weeks of stable running isn't one crash away from
    /// permanent death.
    pub rolling_window: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            rolling_window: Duration::from_secs(600),
        }
    }
}

impl RestartPolicy {
    pub fn backoff_for(&self, restart_count: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(restart_count as i32);
        let jitter: f64 = rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_secs_f64(base.min(self.max_backoff.as_secs_f64()) * jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_with_restart_count_but_stays_capped() {
        let policy = RestartPolicy::default();
        let early = policy.backoff_for(0);
        let later = policy.backoff_for(10);
        assert!(early < Duration::from_secs(2));
        assert!(later <= Duration::from_secs_f64(policy.max_backoff.as_secs_f64() * 1.2));
    }
}
