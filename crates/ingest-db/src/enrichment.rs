use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::types::{EnrichmentKind, PostEnrichment};

/// Current `PostEnrichment` row for `(post_id, kind)`, if any. Callers
/// compare `version` (the stage's content hash) against a freshly computed
/// one to decide whether anything actually changed before emitting a
/// downstream event.
pub async fn fetch_enrichment(pool: &Pool, post_id: Uuid, kind: EnrichmentKind) -> Result<Option<PostEnrichment>> {
    let client = pool.get().await?;
    let kind_str = kind.as_str();
    let row = client
        .query_opt(
            "SELECT post_id, kind, payload, version, metadata, updated_at FROM post_enrichments
             WHERE post_id = $1 AND kind = $2",
            &[&post_id, &kind_str],
        )
        .await
        .map_err(DbError::from_pg)?;

    Ok(row.map(|row| PostEnrichment {
        post_id: row.get("post_id"),
        kind,
        payload: row.get("payload"),
        version: row.get("version"),
        metadata: row.get("metadata"),
        updated_at: row.get("updated_at"),
    }))
}

/// Upserts the enrichment payload unconditionally, but only bumps
/// `updated_at` when `version` actually changed from the stored value —
/// the idempotency contract every enrichment-writing stage (tags, crawl,
/// vision) shares.
pub async fn upsert_enrichment(
    pool: &Pool,
    post_id: Uuid,
    kind: EnrichmentKind,
    payload: serde_json::Value,
    version: &str,
) -> Result<()> {
    let client = pool.get().await?;
    let kind_str = kind.as_str();
    client
        .execute(
            "INSERT INTO post_enrichments (post_id, kind, payload, version, updated_at)
             VALUES ($1, $2, $3, $4, now())
             ON CONFLICT (post_id, kind) DO UPDATE SET
                payload = EXCLUDED.payload,
                version = EXCLUDED.version,
                updated_at = CASE
                    WHEN post_enrichments.version = EXCLUDED.version THEN post_enrichments.updated_at
                    ELSE now()
                END",
            &[&post_id, &kind_str, &payload, &version],
        )
        .await
        .map_err(DbError::from_pg)?;
    Ok(())
}

/// Same idempotency contract as [`upsert_enrichment`], but also replaces
/// `metadata` unconditionally. Used by the retag stage to stamp the
/// `vision_version`/`features_hash` that produced a given tags row, so a
/// later `posts.vision.analyzed` delivery for the same post can tell
/// whether it has already been accounted for.
pub async fn upsert_enrichment_with_metadata(
    pool: &Pool,
    post_id: Uuid,
    kind: EnrichmentKind,
    payload: serde_json::Value,
    version: &str,
    metadata: serde_json::Value,
) -> Result<()> {
    let client = pool.get().await?;
    let kind_str = kind.as_str();
    client
        .execute(
            "INSERT INTO post_enrichments (post_id, kind, payload, version, metadata, updated_at)
             VALUES ($1, $2, $3, $4, $5, now())
             ON CONFLICT (post_id, kind) DO UPDATE SET
                payload = EXCLUDED.payload,
                version = EXCLUDED.version,
                metadata = EXCLUDED.metadata,
                updated_at = CASE
                    WHEN post_enrichments.version = EXCLUDED.version THEN post_enrichments.updated_at
                    ELSE now()
                END",
            &[&post_id, &kind_str, &payload, &version, &metadata],
        )
        .await
        .map_err(DbError::from_pg)?;
    Ok(())
}
