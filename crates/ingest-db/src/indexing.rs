use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::types::{IndexingPhaseStatus, IndexingStatus, PostForIndexing};

/// Loads the post, its owning channel's `tenant_id` (the DB-lookup fallback
/// in the tenant resolution chain), and its `tags`/`vision`/`crawl`
/// enrichment payloads in a single statement.
pub async fn fetch_post_for_indexing(pool: &Pool, post_id: Uuid) -> Result<Option<PostForIndexing>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT p.id, p.tenant_id, p.channel_id, p.text, p.posted_at, p.is_processed,
                    c.tenant_id AS channel_tenant_id, c.title AS channel_title,
                    tags_pe.payload AS tags_payload,
                    vision_pe.payload AS vision_payload,
                    crawl_pe.payload AS crawl_payload
             FROM posts p
             JOIN channels c ON c.id = p.channel_id
             LEFT JOIN post_enrichments tags_pe ON tags_pe.post_id = p.id AND tags_pe.kind = 'tags'
             LEFT JOIN post_enrichments vision_pe ON vision_pe.post_id = p.id AND vision_pe.kind = 'vision'
             LEFT JOIN post_enrichments crawl_pe ON crawl_pe.post_id = p.id AND crawl_pe.kind = 'crawl'
             WHERE p.id = $1",
            &[&post_id],
        )
        .await
        .map_err(DbError::from_pg)?;

    Ok(row.map(|row| PostForIndexing {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        channel_id: row.get("channel_id"),
        channel_tenant_id: row.get("channel_tenant_id"),
        channel_title: row.get("channel_title"),
        text: row.get("text"),
        posted_at: row.get("posted_at"),
        is_processed: row.get("is_processed"),
        tags_payload: row.get("tags_payload"),
        vision_payload: row.get("vision_payload"),
        crawl_payload: row.get("crawl_payload"),
    }))
}

pub async fn upsert_indexing_status(pool: &Pool, status: &IndexingStatus) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            "INSERT INTO indexing_status (post_id, embedding_status, graph_status, vector_id, error_message, processing_completed_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (post_id) DO UPDATE SET
                embedding_status = EXCLUDED.embedding_status,
                graph_status = EXCLUDED.graph_status,
                vector_id = EXCLUDED.vector_id,
                error_message = EXCLUDED.error_message,
                processing_completed_at = EXCLUDED.processing_completed_at",
            &[
                &status.post_id,
                &status.embedding_status.as_str(),
                &status.graph_status.as_str(),
                &status.vector_id,
                &status.error_message,
                &status.processing_completed_at,
            ],
        )
        .await
        .map_err(DbError::from_pg)?;
    Ok(())
}

/// Flips `posts.is_processed` once both indexing phases reach a terminal
/// state (`completed` or `skipped`).
pub async fn mark_post_processed(pool: &Pool, post_id: Uuid) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute("UPDATE posts SET is_processed = true, updated_at = now() WHERE id = $1", &[&post_id])
        .await
        .map_err(DbError::from_pg)?;
    Ok(())
}

pub async fn fetch_indexing_status(pool: &Pool, post_id: Uuid) -> Result<Option<IndexingStatus>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT post_id, embedding_status, graph_status, vector_id, error_message, processing_completed_at
             FROM indexing_status WHERE post_id = $1",
            &[&post_id],
        )
        .await
        .map_err(DbError::from_pg)?;

    Ok(row.map(|row| {
        let embedding_status: String = row.get("embedding_status");
        let graph_status: String = row.get("graph_status");
        IndexingStatus {
            post_id: row.get("post_id"),
            embedding_status: parse_phase_status(&embedding_status),
            graph_status: parse_phase_status(&graph_status),
            vector_id: row.get("vector_id"),
            error_message: row.get("error_message"),
            processing_completed_at: row.get("processing_completed_at"),
        }
    }))
}

fn parse_phase_status(raw: &str) -> IndexingPhaseStatus {
    match raw {
        "processing" => IndexingPhaseStatus::Processing,
        "completed" => IndexingPhaseStatus::Completed,
        "skipped" => IndexingPhaseStatus::Skipped,
        "failed" => IndexingPhaseStatus::Failed,
        _ => IndexingPhaseStatus::Pending,
    }
}

pub fn is_terminal(status: IndexingPhaseStatus) -> bool {
    matches!(status, IndexingPhaseStatus::Completed | IndexingPhaseStatus::Skipped)
}
