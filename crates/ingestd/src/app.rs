use std::sync::Arc;

use ingest_core::config::IngestConfig;
use ingest_eventbus::EventLogClient;
use ingest_objectstore::ObjectStore;
use ingest_supervisor::{RestartPolicy, Supervisor};
use tokio::sync::watch;
use tracing::info;

use crate::adapters::{HttpEmbeddingAdapter, HttpOcrFallbackAdapter, HttpTaggingAdapter, HttpVisionAdapter};
use crate::runner::run_stage_loop;

/// Everything wired up and ready to hand to a [`Supervisor`]. Kept around
/// (rather than dropped once tasks are registered) so `SupervisorHandle`
/// consumers and the metrics exporter can still reach the shared clients.
pub struct Runtime {
    pub supervisor: Supervisor,
    pub shutdown_tx: watch::Sender<bool>,
}

/// Builds every client the pipeline needs, constructs each stage, and
/// registers it with the supervisor under the restart policy named in
/// `config.supervisor` — the one place that turns config into a running
/// system, fanning out into many supervised consumer loops instead of a
/// single request router.
pub async fn build(config: IngestConfig) -> anyhow::Result<Runtime> {
    let restart_policy = RestartPolicy {
        max_retries: config.supervisor.max_retries,
        initial_backoff: std::time::Duration::from_secs(config.supervisor.initial_backoff_s),
        max_backoff: std::time::Duration::from_secs(config.supervisor.max_backoff_s),
        multiplier: config.supervisor.multiplier,
        ..RestartPolicy::default()
    };

    let pool = ingest_db::build_pool(&config.database)?;
    {
        let client = pool.get().await?;
        ingest_db::init_schema(&client).await?;
        info!("schema ensured");
    }

    let redis_client = redis::Client::open(config.redis.url.clone())?;
    let redis_conn = redis_client.get_connection_manager().await?;
    let event_log = EventLogClient::new(redis_conn.clone());

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(config.blob.region.clone()))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            config.blob.access_key.clone(),
            config.blob.secret_key.clone(),
            None,
            None,
            "ingestd-config",
        ))
        .endpoint_url(config.blob.endpoint.clone())
        .load()
        .await;
    let s3_client = aws_sdk_s3::Client::new(&s3_config);
    let store = Arc::new(ObjectStore::new(s3_client, config.blob.bucket.clone()));

    let qdrant = qdrant_client::Qdrant::from_url(&config.qdrant.url).build()?;
    let vector_store = Arc::new(ingest_indexing::VectorStore::new(qdrant));

    let graph = neo4rs::Graph::new(&config.graph.neo4j_url, &config.graph.neo4j_user, &config.graph.neo4j_password).await?;

    let tagging_adapter: Arc<dyn ingest_tagging::AiTaggingAdapter> =
        Arc::new(HttpTaggingAdapter::new(config.adapters.tagging.clone()));
    let vision_adapter: Arc<dyn ingest_vision::VisionAdapter> =
        Arc::new(HttpVisionAdapter::new(config.adapters.vision.clone()));
    let ocr_adapter: Option<Arc<dyn ingest_vision::OcrFallbackAdapter>> = if config.vision.allow_ocr_fallback {
        Some(Arc::new(HttpOcrFallbackAdapter::new(config.adapters.ocr_fallback.clone())))
    } else {
        None
    };
    let embedding_adapter: Arc<dyn ingest_indexing::EmbeddingAdapter> =
        Arc::new(HttpEmbeddingAdapter::new(config.adapters.embedding.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut supervisor = Supervisor::new();

    register_telegram_identities(
        &mut supervisor,
        &config,
        &event_log,
        &pool,
        store.clone(),
        redis_conn.clone(),
        &restart_policy,
        &shutdown_rx,
    );

    register_tagging(
        &mut supervisor,
        &event_log,
        &pool,
        redis_conn.clone(),
        tagging_adapter.clone(),
        &restart_policy,
        &shutdown_rx,
    );
    register_enrichment(&mut supervisor, &config, &event_log, &pool, store.clone(), &restart_policy, &shutdown_rx);
    register_vision(
        &mut supervisor,
        &config,
        &event_log,
        &pool,
        store.clone(),
        redis_conn.clone(),
        vision_adapter,
        ocr_adapter,
        &restart_policy,
        &shutdown_rx,
    );
    register_albums(&mut supervisor, &event_log, &pool, store.clone(), redis_conn.clone(), &restart_policy, &shutdown_rx);
    register_indexing(
        &mut supervisor,
        &config,
        &event_log,
        &pool,
        store.clone(),
        vector_store,
        graph,
        embedding_adapter,
        &restart_policy,
        &shutdown_rx,
    );
    register_retag(&mut supervisor, &event_log, &pool, tagging_adapter, &restart_policy, &shutdown_rx);
    register_outbox(&mut supervisor, &pool, &event_log, &restart_policy, &shutdown_rx);

    Ok(Runtime { supervisor, shutdown_tx })
}

fn register_tagging(
    supervisor: &mut Supervisor,
    event_log: &EventLogClient,
    pool: &deadpool_postgres::Pool,
    redis_conn: redis::aio::ConnectionManager,
    adapter: Arc<dyn ingest_tagging::AiTaggingAdapter>,
    policy: &RestartPolicy,
    shutdown_rx: &watch::Receiver<bool>,
) {
    let event_log = event_log.clone();
    let pool = pool.clone();
    supervisor.register("ingest-tagging", policy.clone(), move || {
        let event_log = event_log.clone();
        let pool = pool.clone();
        let adapter = adapter.clone();
        let redis_conn = redis_conn.clone();
        let shutdown_rx = shutdown_rx.clone();
        async move {
            let stage = Arc::new(ingest_tagging::TaggingStage {
                event_log: event_log.clone(),
                adapter,
                cache: ingest_tagging::TaggingCache::new(redis_conn),
                pool,
            });
            stage.ensure_group().await?;
            run_stage_loop(event_log, "posts.parsed", "ingest-tagging", "ingestd-0".to_string(), shutdown_rx, move |d| {
                let stage = stage.clone();
                async move { stage.handle(&d).await }
            })
            .await
        }
    });
}

fn register_enrichment(
    supervisor: &mut Supervisor,
    config: &IngestConfig,
    event_log: &EventLogClient,
    pool: &deadpool_postgres::Pool,
    store: Arc<ObjectStore>,
    policy: &RestartPolicy,
    shutdown_rx: &watch::Receiver<bool>,
) {
    let event_log = event_log.clone();
    let pool = pool.clone();
    let crawl_config = config.crawl.clone();
    supervisor.register("ingest-enrichment", policy.clone(), move || {
        let event_log = event_log.clone();
        let pool = pool.clone();
        let store = store.clone();
        let crawl_config = crawl_config.clone();
        let shutdown_rx = shutdown_rx.clone();
        async move {
            let stage = Arc::new(ingest_enrichment::EnrichmentStage {
                event_log: event_log.clone(),
                http: reqwest::Client::builder().timeout(std::time::Duration::from_secs(crawl_config.fetch_timeout_s)).build()?,
                store,
                pool,
                config: crawl_config,
                budget: Arc::new(tokio::sync::Semaphore::new(8)),
            });
            stage.ensure_group().await?;
            run_stage_loop(event_log, "posts.tagged", "ingest-enrichment", "ingestd-0".to_string(), shutdown_rx, move |d| {
                let stage = stage.clone();
                async move { stage.handle(&d).await }
            })
            .await
        }
    });
}

#[allow(clippy::too_many_arguments)]
fn register_vision(
    supervisor: &mut Supervisor,
    config: &IngestConfig,
    event_log: &EventLogClient,
    pool: &deadpool_postgres::Pool,
    store: Arc<ObjectStore>,
    redis_conn: redis::aio::ConnectionManager,
    adapter: Arc<dyn ingest_vision::VisionAdapter>,
    ocr_fallback: Option<Arc<dyn ingest_vision::OcrFallbackAdapter>>,
    policy: &RestartPolicy,
    shutdown_rx: &watch::Receiver<bool>,
) {
    let event_log = event_log.clone();
    let pool = pool.clone();
    let vision_config = config.vision.clone();
    supervisor.register("ingest-vision", policy.clone(), move || {
        let event_log = event_log.clone();
        let pool = pool.clone();
        let store = store.clone();
        let redis_conn = redis_conn.clone();
        let adapter = adapter.clone();
        let ocr_fallback = ocr_fallback.clone();
        let vision_config = vision_config.clone();
        let shutdown_rx = shutdown_rx.clone();
        async move {
            let stage = Arc::new(ingest_vision::VisionStage {
                event_log: event_log.clone(),
                redis: redis_conn.clone(),
                pool,
                store,
                adapter,
                ocr_fallback,
                budget: ingest_vision::BudgetGate::new(redis_conn, vision_config.per_tenant_daily_token_budget),
                config: vision_config,
            });
            stage.ensure_group().await?;
            run_stage_loop(event_log, "posts.vision.uploaded", "ingest-vision", "ingestd-0".to_string(), shutdown_rx, move |d| {
                let stage = stage.clone();
                async move { stage.handle(&d).await }
            })
            .await
        }
    });
}

fn register_albums(
    supervisor: &mut Supervisor,
    event_log: &EventLogClient,
    pool: &deadpool_postgres::Pool,
    store: Arc<ObjectStore>,
    redis_conn: redis::aio::ConnectionManager,
    policy: &RestartPolicy,
    shutdown_rx: &watch::Receiver<bool>,
) {
    let event_log = event_log.clone();
    let pool = pool.clone();
    supervisor.register("ingest-albums", policy.clone(), move || {
        let event_log = event_log.clone();
        let pool = pool.clone();
        let store = store.clone();
        let redis_conn = redis_conn.clone();
        let shutdown_rx = shutdown_rx.clone();
        async move {
            let stage = Arc::new(ingest_albums::AlbumAssembler {
                event_log: event_log.clone(),
                redis: redis_conn,
                pool,
                store,
            });
            stage.ensure_group().await?;

            // AlbumAssembler reads two streams into one state machine
            // (albums.parsed seeds a state, posts.vision.analyzed fills
            // it in), so it needs two independent consumer loops over the
            // same handle().
            let parsed_stage = stage.clone();
            let parsed_log = event_log.clone();
            let parsed_shutdown = shutdown_rx.clone();
            let parsed_loop = run_stage_loop(parsed_log, "albums.parsed", "ingest-albums", "ingestd-0".to_string(), parsed_shutdown, move |d| {
                let stage = parsed_stage.clone();
                async move { stage.handle(&d).await }
            });

            let analyzed_loop = run_stage_loop(event_log, "posts.vision.analyzed", "ingest-albums", "ingestd-0".to_string(), shutdown_rx, move |d| {
                let stage = stage.clone();
                async move { stage.handle(&d).await }
            });

            tokio::try_join!(parsed_loop, analyzed_loop)?;
            Ok(())
        }
    });
}

#[allow(clippy::too_many_arguments)]
fn register_indexing(
    supervisor: &mut Supervisor,
    config: &IngestConfig,
    event_log: &EventLogClient,
    pool: &deadpool_postgres::Pool,
    store: Arc<ObjectStore>,
    vector_store: Arc<ingest_indexing::VectorStore>,
    graph: neo4rs::Graph,
    embedding_adapter: Arc<dyn ingest_indexing::EmbeddingAdapter>,
    policy: &RestartPolicy,
    shutdown_rx: &watch::Receiver<bool>,
) {
    let event_log = event_log.clone();
    let pool = pool.clone();
    let indexing_config = config.indexing.clone();
    let graph_config = config.graph.clone();
    let trim_interval_msgs = config.stream.trim_interval_msgs;
    supervisor.register("ingest-indexing", policy.clone(), move || {
        let event_log = event_log.clone();
        let pool = pool.clone();
        let store = store.clone();
        let vector_store = vector_store.clone();
        let graph = graph.clone();
        let embedding_adapter = embedding_adapter.clone();
        let indexing_config = indexing_config.clone();
        let graph_config = graph_config.clone();
        let shutdown_rx = shutdown_rx.clone();
        async move {
            let stage = Arc::new(ingest_indexing::IndexingStage {
                event_log: event_log.clone(),
                pool,
                store,
                vector_store,
                graph,
                embedding_adapter,
                embedding_dim: indexing_config.embedding_dim,
                embedding_provider: indexing_config.embedding_provider.clone(),
                graph_config,
                config: indexing_config,
                semaphore: Arc::new(tokio::sync::Semaphore::new(4)),
            });
            stage.ensure_group().await?;

            // Spec §4.12: between batches, drive the log's Trim using the
            // minimum pending ID across every consumer group of this topic.
            // "Between batches" is approximated here as "every
            // trim_interval_msgs processed deliveries".
            let processed = Arc::new(std::sync::atomic::AtomicU32::new(0));
            run_stage_loop(event_log, "posts.enriched", "ingest-indexing", "ingestd-0".to_string(), shutdown_rx, move |d| {
                let stage = stage.clone();
                let processed = processed.clone();
                async move {
                    let outcome = stage.handle(&d).await;
                    if outcome.is_ok() {
                        let count = processed.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
                        if count >= trim_interval_msgs {
                            processed.store(0, std::sync::atomic::Ordering::Relaxed);
                            if let Err(e) = stage.trim(&["ingest-indexing"]).await {
                                tracing::warn!(error = %e, "posts.enriched trim failed");
                            }
                        }
                    }
                    outcome
                }
            })
            .await
        }
    });
}

fn register_retag(
    supervisor: &mut Supervisor,
    event_log: &EventLogClient,
    pool: &deadpool_postgres::Pool,
    adapter: Arc<dyn ingest_tagging::AiTaggingAdapter>,
    policy: &RestartPolicy,
    shutdown_rx: &watch::Receiver<bool>,
) {
    let event_log = event_log.clone();
    let pool = pool.clone();
    supervisor.register("ingest-retag", policy.clone(), move || {
        let event_log = event_log.clone();
        let pool = pool.clone();
        let adapter = adapter.clone();
        let shutdown_rx = shutdown_rx.clone();
        async move {
            let stage = Arc::new(ingest_retag::RetagStage { event_log: event_log.clone(), adapter, pool });
            stage.ensure_group().await?;
            run_stage_loop(event_log, "posts.vision.analyzed", "ingest-retag", "ingestd-0".to_string(), shutdown_rx, move |d| {
                let stage = stage.clone();
                async move { stage.handle(&d).await }
            })
            .await
        }
    });
}

fn register_outbox(
    supervisor: &mut Supervisor,
    pool: &deadpool_postgres::Pool,
    event_log: &EventLogClient,
    policy: &RestartPolicy,
    shutdown_rx: &watch::Receiver<bool>,
) {
    let pool = pool.clone();
    let event_log = event_log.clone();
    supervisor.register("ingest-outbox", policy.clone(), move || {
        let pool = pool.clone();
        let event_log = event_log.clone();
        let shutdown_rx = shutdown_rx.clone();
        async move {
            let relay = ingest_outbox::OutboxRelay::new(pool, event_log);
            relay.run(shutdown_rx).await?;
            Ok(())
        }
    });
}

/// Bootstraps one [`ingest_telegram::IngestionWorker`] per configured
/// account, each wired to a [`ingest_media::TelegramMediaProcessor`] as its
/// [`ingest_telegram::MediaSink`] — the seam the two crates were split
/// across specifically so neither depends on the other directly.
#[allow(clippy::too_many_arguments)]
fn register_telegram_identities(
    supervisor: &mut Supervisor,
    config: &IngestConfig,
    event_log: &EventLogClient,
    pool: &deadpool_postgres::Pool,
    store: Arc<ObjectStore>,
    redis_conn: redis::aio::ConnectionManager,
    policy: &RestartPolicy,
    shutdown_rx: &watch::Receiver<bool>,
) {
    let writer = Arc::new(ingest_db::AtomicBatchWriter::new(pool.clone()));
    let media_config = config.media.clone();
    let quota_limits = ingest_objectstore::QuotaLimits {
        bucket_total_gb: config.quota.bucket_total_gb,
        bucket_emergency_gb: config.quota.bucket_emergency_gb,
        per_tenant_gb: config.quota.per_tenant_gb,
        ..ingest_objectstore::QuotaLimits::default()
    };

    for account in &config.telegram.accounts {
        let account = account.clone();
        let event_log = event_log.clone();
        let writer = writer.clone();
        let store = store.clone();
        let media_config = media_config.clone();
        let quota_limits = quota_limits.clone();
        let redis_conn = redis_conn.clone();
        let shutdown_rx = shutdown_rx.clone();
        let name = format!("ingest-telegram:{}", account.platform_id);

        supervisor.register(name, policy.clone(), move || {
            let account = account.clone();
            let event_log = event_log.clone();
            let writer = writer.clone();
            let store = store.clone();
            let media_config = media_config.clone();
            let quota_limits = quota_limits.clone();
            let redis_conn = redis_conn.clone();
            let mut shutdown_rx = shutdown_rx.clone();
            async move {
                let client: Arc<dyn ingest_telegram::PlatformClient> =
                    Arc::new(ingest_telegram::TeloxideClient::new(&account.bot_token)?);

                let media_sink = Arc::new(ingest_media::TelegramMediaProcessor {
                    client: client.clone(),
                    store,
                    limits: quota_limits,
                    media_config,
                    event_log: event_log.clone(),
                });

                let channels = account
                    .channels
                    .iter()
                    .map(|ch| ingest_telegram::WatchedChannel {
                        descriptor: ingest_db::ChannelDescriptor {
                            platform_channel_id: ch.platform_channel_id,
                            tenant_id: account.tenant_id.clone(),
                            title: ch.title.clone(),
                        },
                        user_id: account.platform_id.to_string(),
                    })
                    .collect();

                let worker = ingest_telegram::IngestionWorker {
                    account_id: account.platform_id.to_string(),
                    client,
                    floodwait: ingest_ratelimit::FloodWaitManager::new(redis_conn),
                    writer,
                    event_log,
                    media_sink,
                    channels,
                };

                tokio::select! {
                    res = worker.run() => res.map_err(anyhow::Error::from),
                    _ = shutdown_rx.changed() => Ok(()),
                }
            }
        });
    }
}
