use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::types::MediaObject;

/// The slice of a post and its channel C13 needs to re-run tagging: the
/// post's own text, plus the channel's platform id so the re-emitted
/// `posts.tagged` carries the same `channel_id` shape every other envelope
/// in the pipeline uses (the platform id, not the internal UUID).
#[derive(Debug, Clone)]
pub struct PostRetagContext {
    pub text: Option<String>,
    pub platform_channel_id: i64,
}

pub async fn fetch_post_retag_context(pool: &Pool, post_id: Uuid) -> Result<Option<PostRetagContext>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT p.text, c.platform_channel_id
             FROM posts p JOIN channels c ON c.id = p.channel_id
             WHERE p.id = $1",
            &[&post_id],
        )
        .await
        .map_err(DbError::from_pg)?;

    Ok(row.map(|row| PostRetagContext {
        text: row.get("text"),
        platform_channel_id: row.get("platform_channel_id"),
    }))
}

/// The media objects attached to a post, ordered by position, for C12's
/// `ImageContent` graph nodes.
pub async fn fetch_post_media_shas(pool: &Pool, post_id: Uuid) -> Result<Vec<MediaObject>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT m.sha256, m.mime, m.size_bytes, m.blob_key, m.first_seen_at, m.last_seen_at, m.refs_count
             FROM post_media_map pm
             JOIN media_objects m ON m.sha256 = pm.sha256
             WHERE pm.post_id = $1
             ORDER BY pm.position",
            &[&post_id],
        )
        .await
        .map_err(DbError::from_pg)?;

    Ok(rows
        .into_iter()
        .map(|row| MediaObject {
            sha256: row.get("sha256"),
            mime: row.get("mime"),
            size_bytes: row.get("size_bytes"),
            blob_key: row.get("blob_key"),
            first_seen_at: row.get("first_seen_at"),
            last_seen_at: row.get("last_seen_at"),
            refs_count: row.get("refs_count"),
        })
        .collect())
}
