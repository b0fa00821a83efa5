use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::types::Album;

pub async fn fetch_album(pool: &Pool, album_id: Uuid) -> Result<Option<Album>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT id, channel_id, platform_grouped_id, items_count, cover_media_sha256, caption, posted_at
             FROM albums WHERE id = $1",
            &[&album_id],
        )
        .await
        .map_err(DbError::from_pg)?;

    Ok(row.map(|row| Album {
        id: row.get("id"),
        channel_id: row.get("channel_id"),
        platform_grouped_id: row.get("platform_grouped_id"),
        items_count: row.get("items_count"),
        cover_media_sha256: row.get("cover_media_sha256"),
        caption: row.get("caption"),
        posted_at: row.get("posted_at"),
    }))
}

/// All member post ids of an album, in their original position order.
pub async fn fetch_album_member_post_ids(pool: &Pool, album_id: Uuid) -> Result<Vec<Uuid>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT post_id FROM album_items WHERE album_id = $1 ORDER BY position",
            &[&album_id],
        )
        .await
        .map_err(DbError::from_pg)?;
    Ok(rows.iter().map(|row| row.get("post_id")).collect())
}

/// Reverse lookup: which album (if any) a post belongs to. Used by the
/// assembler to decide whether an incoming `posts.vision.analyzed` event
/// should feed album state.
pub async fn fetch_album_id_for_post(pool: &Pool, post_id: Uuid) -> Result<Option<Uuid>> {
    let client = pool.get().await?;
    let row = client
        .query_opt("SELECT album_id FROM album_items WHERE post_id = $1", &[&post_id])
        .await
        .map_err(DbError::from_pg)?;
    Ok(row.map(|row| row.get("album_id")))
}
