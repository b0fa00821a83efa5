use std::time::Duration;

use chrono::Utc;
use deadpool_postgres::Pool;
use ingest_eventbus::EventLogClient;
use ingest_supervisor::RestartPolicy;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::error::Result;

const DEFAULT_BATCH: i64 = 100;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Drains `outbox_events` and republishes each row verbatim onto the event
/// log, per spec §4.15. Retry scheduling on failure reuses C14's backoff
/// policy rather than inventing a second one.
pub struct OutboxRelay {
    pub pool: Pool,
    pub event_log: EventLogClient,
    pub retry_policy: RestartPolicy,
    pub batch_size: i64,
    pub poll_interval: Duration,
}

impl OutboxRelay {
    pub fn new(pool: Pool, event_log: EventLogClient) -> Self {
        Self {
            pool,
            event_log,
            retry_policy: RestartPolicy::default(),
            batch_size: DEFAULT_BATCH,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Runs the poll-publish-flip loop until `shutdown` broadcasts `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            let processed = self.run_once().await?;
            if processed == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return Ok(());
                        }
                    }
                }
            } else if *shutdown.borrow() {
                return Ok(());
            }
        }
    }

    /// One batch pass: fetch pending/due rows, publish each, flip its
    /// status. Returns the number of rows processed, so callers (and tests)
    /// can tell an empty poll from actual work.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<usize> {
        let rows = ingest_db::fetch_pending_outbox(&self.pool, self.batch_size).await?;
        let count = rows.len();

        for row in rows {
            let payload = row.payload.to_string();
            match self.event_log.publish_raw(&row.stream, &row.event, &payload).await {
                Ok(_) => {
                    ingest_db::mark_outbox_sent(&self.pool, row.id).await?;
                    metrics::counter!("outbox_relayed_total", "status" => "sent").increment(1);
                }
                Err(e) => {
                    warn!(outbox_id = %row.id, error = %e, "outbox publish failed, scheduling retry");
                    let backoff = self.retry_policy.backoff_for(row.retry_count.max(0) as u32);
                    let next_retry_at = Utc::now() + chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::seconds(60));
                    ingest_db::mark_outbox_failed(&self.pool, row.id, &e.to_string(), next_retry_at).await?;
                    metrics::counter!("outbox_relayed_total", "status" => "failed").increment(1);
                }
            }
        }

        if count > 0 {
            debug!(count, "outbox batch processed");
        }
        Ok(count)
    }
}
