use std::time::Instant;

use deadpool_postgres::Pool;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::types::{MediaObject, PostRecord, WrittenPost};

/// Descriptor for the posting identity, carried once per batch.
#[derive(Debug, Clone)]
pub struct UserDescriptor {
    pub platform_id: i64,
    pub encrypted_session: Option<String>,
}

/// Descriptor for the channel the batch belongs to.
#[derive(Debug, Clone)]
pub struct ChannelDescriptor {
    pub platform_channel_id: i64,
    pub tenant_id: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BatchWriteOutcome {
    pub channel_id: Uuid,
    pub written: Vec<WrittenPost>,
}

/// One DB transaction per spec §4.5: upsert identity/membership, upsert
/// channel, gate on an active subscription, then bulk-upsert posts.
pub struct AtomicBatchWriter {
    pool: Pool,
}

impl AtomicBatchWriter {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, posts))]
    pub async fn write_batch(
        &self,
        user: &UserDescriptor,
        channel: &ChannelDescriptor,
        posts: &[PostRecord],
    ) -> Result<BatchWriteOutcome> {
        let start = Instant::now();
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await.map_err(DbError::from_pg)?;

        // 1. Upsert identity.
        let identity_row = tx
            .query_one(
                "INSERT INTO identities (platform_id, encrypted_session)
                 VALUES ($1, $2)
                 ON CONFLICT (platform_id) DO UPDATE
                   SET encrypted_session = COALESCE(NULLIF(EXCLUDED.encrypted_session, ''), identities.encrypted_session),
                       updated_at = now()
                 RETURNING id",
                &[&user.platform_id, &user.encrypted_session],
            )
            .await
            .map_err(DbError::from_pg)?;
        let identity_id: Uuid = identity_row.get("id");
        metrics::counter!("db_users_upserted_total").increment(1);

        // Membership (tenant, identity).
        tx.execute(
            "INSERT INTO memberships (tenant_id, identity_id)
             VALUES ($1, $2)
             ON CONFLICT (tenant_id, identity_id) DO NOTHING",
            &[&channel.tenant_id, &identity_id],
        )
        .await
        .map_err(DbError::from_pg)?;

        // 2. Upsert channel.
        let channel_row = tx
            .query_one(
                "INSERT INTO channels (platform_channel_id, tenant_id, title)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (platform_channel_id) DO UPDATE
                   SET title = COALESCE(NULLIF(EXCLUDED.title, ''), channels.title),
                       updated_at = now()
                 RETURNING id",
                &[&channel.platform_channel_id, &channel.tenant_id, &channel.title],
            )
            .await
            .map_err(DbError::from_pg)?;
        let channel_id: Uuid = channel_row.get("id");
        metrics::counter!("db_channels_upserted_total").increment(1);

        // 3. Ensure an active subscription, creating/activating it for
        // system parsing permission when the channel itself is active.
        let sub_row = tx
            .query_opt(
                "SELECT is_active FROM subscriptions
                 WHERE identity_id = $1 AND channel_id = $2
                 FOR UPDATE",
                &[&identity_id, &channel_id],
            )
            .await
            .map_err(DbError::from_pg)?;

        let channel_active: bool = tx
            .query_one("SELECT is_active FROM channels WHERE id = $1", &[&channel_id])
            .await
            .map_err(DbError::from_pg)?
            .get("is_active");

        match sub_row {
            Some(row) => {
                let is_active: bool = row.get("is_active");
                if !is_active {
                    if channel_active {
                        tx.execute(
                            "UPDATE subscriptions SET is_active = true
                             WHERE identity_id = $1 AND channel_id = $2",
                            &[&identity_id, &channel_id],
                        )
                        .await
                        .map_err(DbError::from_pg)?;
                    } else {
                        metrics::counter!("db_subscription_check_failures_total", "reason" => "subscription_inactive")
                            .increment(1);
                        return Err(DbError::SubscriptionInactive);
                    }
                }
            }
            None => {
                if channel_active {
                    tx.execute(
                        "INSERT INTO subscriptions (identity_id, channel_id, is_active)
                         VALUES ($1, $2, true)",
                        &[&identity_id, &channel_id],
                    )
                    .await
                    .map_err(DbError::from_pg)?;
                } else {
                    metrics::counter!("db_subscription_check_failures_total", "reason" => "no_subscription").increment(1);
                    return Err(DbError::NoSubscription);
                }
            }
        }

        // 4. Bulk upsert posts, merging counters with GREATEST and
        // detecting genuinely new rows via `xmax = 0` (open question 2).
        let mut written = Vec::with_capacity(posts.len());
        for post in posts {
            let row = tx
                .query_one(
                    "INSERT INTO posts
                        (tenant_id, channel_id, platform_message_id, text, posted_at,
                         has_media, is_forward, is_reply, views, reactions, forwards, replies,
                         is_edited, edited_at)
                     VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)
                     ON CONFLICT (channel_id, platform_message_id) DO UPDATE SET
                        text = COALESCE(NULLIF(EXCLUDED.text, ''), posts.text),
                        views = GREATEST(posts.views, EXCLUDED.views),
                        reactions = GREATEST(posts.reactions, EXCLUDED.reactions),
                        forwards = GREATEST(posts.forwards, EXCLUDED.forwards),
                        replies = GREATEST(posts.replies, EXCLUDED.replies),
                        is_edited = EXCLUDED.is_edited OR posts.is_edited,
                        edited_at = COALESCE(EXCLUDED.edited_at, posts.edited_at),
                        updated_at = now()
                     RETURNING id, (xmax = 0) AS inserted",
                    &[
                        &channel.tenant_id,
                        &channel_id,
                        &post.platform_message_id,
                        &post.text,
                        &post.posted_at,
                        &post.has_media,
                        &post.is_forward,
                        &post.is_reply,
                        &post.views,
                        &post.reactions,
                        &post.forwards,
                        &post.replies,
                        &post.is_edited,
                        &post.edited_at,
                    ],
                )
                .await
                .map_err(DbError::from_pg)?;

            written.push(WrittenPost {
                id: row.get("id"),
                platform_message_id: post.platform_message_id,
                inserted: row.get("inserted"),
            });
        }

        // HWM advances only after commit (invariant 5); commit first, then
        // advance below.
        tx.commit().await.map_err(DbError::from_pg)?;

        if let Some(max_id) = posts.iter().map(|p| p.platform_message_id).max() {
            self.advance_high_water_mark(channel_id, max_id).await?;
        }

        metrics::counter!("db_posts_insert_success_total").increment(written.len() as u64);
        metrics::histogram!("db_batch_commit_latency_seconds").record(start.elapsed().as_secs_f64());

        Ok(BatchWriteOutcome { channel_id, written })
    }

    /// `Channel.high_water_mark` is monotonic non-decreasing (invariant 5).
    async fn advance_high_water_mark(&self, channel_id: Uuid, platform_message_id: i64) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE channels SET high_water_mark = GREATEST(high_water_mark, $2)
                 WHERE id = $1",
                &[&channel_id, &platform_message_id],
            )
            .await
            .map_err(DbError::from_pg)?;
        Ok(())
    }

    /// Idempotent CAS bookkeeping. Failures here never roll back the
    /// enclosing post transaction: media is already durable in the blob
    /// store and these rows can be reconciled later.
    #[instrument(skip(self, media))]
    pub async fn save_media_to_cas(&self, post_id: Uuid, media: &[(MediaObject, i32, String)]) {
        let client = match self.pool.get().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "media CAS write skipped: pool unavailable");
                return;
            }
        };

        for (obj, position, role) in media {
            let upsert = client
                .execute(
                    "INSERT INTO media_objects (sha256, mime, size_bytes, blob_key, refs_count)
                     VALUES ($1, $2, $3, $4, 1)
                     ON CONFLICT (sha256) DO UPDATE SET
                        refs_count = media_objects.refs_count + 1,
                        last_seen_at = now()",
                    &[&obj.sha256, &obj.mime, &obj.size_bytes, &obj.blob_key],
                )
                .await;
            match upsert {
                Ok(_) => metrics::counter!("media_objects_upserted_total", "status" => "existing").increment(1),
                Err(e) => {
                    warn!(error = %e, sha256 = %obj.sha256, "media object upsert failed, will reconcile later");
                    continue;
                }
            }

            let map_insert = client
                .execute(
                    "INSERT INTO post_media_map (post_id, sha256, position, role)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (post_id, sha256) DO NOTHING",
                    &[&post_id, &obj.sha256, position, role],
                )
                .await;
            if let Ok(n) = map_insert {
                if n > 0 {
                    metrics::counter!("post_media_map_inserted_total").increment(1);
                }
            }
        }
        metrics::counter!("media_objects_refs_updated_total").increment(media.len() as u64);
    }

    /// Sidecar counters update; never aborts the parent post transaction.
    pub async fn save_forwards_reactions_replies(&self, post_id: Uuid, forwards: i64, reactions: i64, replies: i64) {
        let client = match self.pool.get().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "sidecar counters skipped: pool unavailable");
                return;
            }
        };
        if let Err(e) = client
            .execute(
                "UPDATE posts SET
                    forwards = GREATEST(forwards, $2),
                    reactions = GREATEST(reactions, $3),
                    replies = GREATEST(replies, $4)
                 WHERE id = $1",
                &[&post_id, &forwards, &reactions, &replies],
            )
            .await
        {
            warn!(error = %e, %post_id, "sidecar counters update failed");
        }
    }
}
