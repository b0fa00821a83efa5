use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::SupervisorError;
use crate::health::{TaskHealth, TaskState};
use crate::policy::RestartPolicy;

pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
pub type TaskFactory = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

struct TaskSpec {
    name: String,
    factory: TaskFactory,
    policy: RestartPolicy,
}

/// Restarts stage tasks with exponential backoff. Each task races its
/// next launch attempt against a `watch::Receiver<bool>` shutdown signal
/// inside a `tokio::select!`, the same shape as a single polling loop,
/// generalised here to many independently-restarted tasks.
pub struct Supervisor {
    tasks: Vec<TaskSpec>,
    health: Arc<DashMap<String, TaskHealth>>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            health: Arc::new(DashMap::new()),
        }
    }

    /// Registers a stage under `name`. `factory` is called once per launch
    /// attempt (including every restart) to produce a fresh future — it must
    /// not assume it only ever runs once.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, policy: RestartPolicy, factory: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        self.health.insert(name.clone(), TaskHealth::new(&name));
        self.tasks.push(TaskSpec {
            name,
            factory: Arc::new(move || Box::pin(factory())),
            policy,
        });
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle { health: self.health.clone() }
    }

    /// Launches every registered task and restarts each independently until
    /// `shutdown` broadcasts `true` or a task exhausts its restart budget,
    /// in which case that task's error is surfaced once every task has wound
    /// down.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), SupervisorError> {
        info!(tasks = self.tasks.len(), "supervisor starting");
        let mut set = JoinSet::new();
        for spec in self.tasks {
            let health = self.health.clone();
            let shutdown_rx = shutdown.clone();
            set.spawn(run_task(spec, health, shutdown_rx));
        }

        let mut first_fatal = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(%e, "supervised task exhausted its restart budget");
                    first_fatal.get_or_insert(e);
                }
                Err(join_err) => error!(%join_err, "supervised task panicked"),
            }
        }

        match first_fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct SupervisorHandle {
    health: Arc<DashMap<String, TaskHealth>>,
}

impl SupervisorHandle {
    pub fn health(&self) -> Vec<TaskHealth> {
        self.health.iter().map(|e| e.value().clone()).collect()
    }
}

async fn run_task(spec: TaskSpec, health: Arc<DashMap<String, TaskHealth>>, mut shutdown: watch::Receiver<bool>) -> Result<(), SupervisorError> {
    let mut restart_count: u32 = 0;
    let mut last_start = Instant::now();

    loop {
        set_state(&health, &spec.name, TaskState::Running, restart_count, Duration::ZERO, None);

        let outcome = tokio::select! {
            result = (spec.factory)() => Some(result),
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(task = %spec.name, "supervisor shutdown, stopping task");
                    return Ok(());
                }
                None
            }
        };

        let Some(result) = outcome else { continue };

        let elapsed = last_start.elapsed();
        if reset_restart_count(elapsed, spec.policy.rolling_window) {
            restart_count = 0;
        }

        let error_text = match &result {
            Ok(()) => "task exited without error".to_string(),
            Err(e) => e.to_string(),
        };
        warn!(task = %spec.name, error = %error_text, restart_count, "task terminated, evaluating restart");

        if restart_count >= spec.policy.max_retries {
            set_state(&health, &spec.name, TaskState::Failed, restart_count, Duration::ZERO, Some(error_text.clone()));
            metrics::counter!("supervisor_task_failed_total", "task" => spec.name.clone()).increment(1);
            return Err(SupervisorError::RestartBudgetExhausted(spec.name.clone()));
        }

        let backoff = spec.policy.backoff_for(restart_count);
        restart_count += 1;
        set_state(&health, &spec.name, TaskState::Backoff, restart_count, backoff, Some(error_text));
        metrics::counter!("supervisor_task_restarted_total", "task" => spec.name.clone()).increment(1);

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return Ok(());
                }
            }
        }
        last_start = Instant::now();
    }
}

/// True once a task has run longer than its rolling window without dying,
/// clearing the restart counter so flapping recovery after long uptime
/// doesn't spend down the same budget as a true crash loop.
fn reset_restart_count(elapsed: Duration, rolling_window: Duration) -> bool {
    elapsed >= rolling_window
}

fn set_state(
    health: &DashMap<String, TaskHealth>,
    name: &str,
    state: TaskState,
    restart_count: u32,
    current_backoff: Duration,
    last_error: Option<String>,
) {
    health.insert(
        name.to_string(),
        TaskHealth { name: name.to_string(), state, restart_count, current_backoff, last_error },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_window_elapsed_resets_restart_count() {
        assert!(reset_restart_count(Duration::from_secs(601), Duration::from_secs(600)));
        assert!(!reset_restart_count(Duration::from_secs(1), Duration::from_secs(600)));
    }

    #[tokio::test]
    async fn task_restarts_until_budget_exhausted_then_reports_fatal() {
        let mut supervisor = Supervisor::new();
        let policy = RestartPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 1.0,
            rolling_window: Duration::from_secs(600),
        };
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        supervisor.register("flaky", policy, move || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err::<(), anyhow::Error>(anyhow::anyhow!("boom"))
            }
        });

        let handle = supervisor.handle();
        let (_tx, rx) = watch::channel(false);
        let result = supervisor.run(rx).await;

        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
        let health = handle.health();
        assert_eq!(health[0].state, TaskState::Failed);
    }

    #[tokio::test]
    async fn shutdown_signal_stops_task_without_fatal() {
        let mut supervisor = Supervisor::new();
        let policy = RestartPolicy::default();
        supervisor.register("steady", policy, || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });

        let (tx, rx) = watch::channel(false);
        let run = tokio::spawn(supervisor.run(rx));
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let result = run.await.unwrap();
        assert!(result.is_ok());
    }
}
