use std::future::Future;
use std::time::Duration;

use ingest_core::ErrorCategory;
use ingest_eventbus::{Delivery, EventLogClient};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const CONSUME_BATCH: usize = 20;
const CONSUME_BLOCK: Duration = Duration::from_millis(2000);
const RECLAIM_EVERY_EMPTY_POLLS: u32 = 20;
const RECLAIM_MIN_IDLE: Duration = Duration::from_secs(60);

/// Drives one stage's consume/handle/ack cycle until `shutdown` broadcasts
/// `true`. Every stage crate exposes a `handle(&Delivery) -> Result<bool,
/// E>` that never acks itself, so this is the one place the ack/DLQ/retry
/// policy named by `ingest_core::ErrorCategory` actually runs.
pub async fn run_stage_loop<E, F, Fut>(
    event_log: EventLogClient,
    topic: &'static str,
    group: &'static str,
    consumer: String,
    mut shutdown: watch::Receiver<bool>,
    handle: F,
) -> anyhow::Result<()>
where
    E: ingest_core::StageError,
    F: Fn(Delivery) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let mut empty_polls = 0u32;

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let batch = tokio::select! {
            res = event_log.consume(topic, group, &consumer, CONSUME_BATCH, CONSUME_BLOCK) => res,
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return Ok(());
                }
                continue;
            }
        };

        let deliveries = match batch {
            Ok(d) => d,
            Err(e) => {
                warn!(topic, group, error = %e, "consume failed, backing off");
                tokio::time::sleep(Duration::from_secs(2)).await;
                continue;
            }
        };

        if deliveries.is_empty() {
            empty_polls += 1;
            if empty_polls >= RECLAIM_EVERY_EMPTY_POLLS {
                empty_polls = 0;
                match event_log.reclaim(topic, group, &consumer, RECLAIM_MIN_IDLE).await {
                    Ok(reclaimed) if !reclaimed.is_empty() => {
                        info!(topic, group, count = reclaimed.len(), "reclaimed stale pending entries");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(topic, group, error = %e, "reclaim failed"),
                }
            }
            continue;
        }
        empty_polls = 0;

        for delivery in deliveries {
            let id = delivery.id.clone();
            let event_type = delivery.envelope.topic().to_string();
            let envelope_json = serde_json::to_string(&delivery.envelope).unwrap_or_default();
            let started = std::time::Instant::now();
            let outcome = handle(delivery).await;
            metrics::histogram!("events_processing_duration_seconds", "event_type" => event_type.clone(), "consumer" => group)
                .record(started.elapsed().as_secs_f64());

            match outcome {
                Ok(true) => {
                    if let Err(e) = event_log.ack(topic, group, &id).await {
                        warn!(topic, group, id, error = %e, "ack failed");
                    }
                    metrics::counter!("events_consumed_total", "event_type" => event_type, "consumer" => group).increment(1);
                }
                Ok(false) => {
                    debug!(topic, group, id, "handler requested no-ack, leaving pending");
                }
                Err(e) => handle_error(&event_log, topic, group, &id, &event_type, &envelope_json, e).await,
            }
        }
    }
}

async fn handle_error<E: ingest_core::StageError>(
    event_log: &EventLogClient,
    topic: &str,
    group: &str,
    id: &str,
    event_type: &str,
    envelope_json: &str,
    err: E,
) {
    let category = err.category();
    metrics::counter!("events_failed_total", "event_type" => event_type.to_string(), "consumer" => group.to_string(), "error_type" => format!("{:?}", category))
        .increment(1);

    match category {
        ErrorCategory::Transient => {
            warn!(topic, group, id, error = %err, "transient error, leaving pending for redelivery");
        }
        ErrorCategory::FloodWait(wait_ms) => {
            warn!(topic, group, id, wait_ms, error = %err, "flood wait, leaving pending");
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }
        ErrorCategory::AuthFailed => {
            error!(topic, group, id, error = %err, "auth failure, leaving pending for operator intervention");
        }
        ErrorCategory::Idempotent => {
            debug!(topic, group, id, "already processed, acking silently");
            let _ = event_log.ack(topic, group, id).await;
        }
        ErrorCategory::ResourceSkip => {
            warn!(topic, group, id, error = %err, "resource skip, acking without downstream publish");
            let _ = event_log.ack(topic, group, id).await;
        }
        ErrorCategory::Permanent => {
            let reason = err.dlq_reason().unwrap_or("permanent_error");
            let details = serde_json::json!({ "error": err.to_string(), "stage": group });
            if let Err(dlq_err) = event_log.dead_letter(topic, envelope_json, reason, &details).await {
                error!(topic, group, id, error = %dlq_err, "dead-letter publish failed, leaving pending");
                return;
            }
            if let Err(e) = event_log.ack(topic, group, id).await {
                warn!(topic, group, id, error = %e, "ack after dead-letter failed");
            }
        }
    }
}
