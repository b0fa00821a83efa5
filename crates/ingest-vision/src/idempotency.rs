use deadpool_postgres::Pool;
use ingest_db::types::EnrichmentKind;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::Result;

fn processed_key(post_id: &str, sha256: &str) -> String {
    format!("vision:processed:{post_id}:{sha256}")
}

/// Dual idempotency check for `(tenant, post, sha256)`: a short-TTL KV key
/// guards against redelivery races, and `PostEnrichment(kind=vision)` is the
/// durable record consulted once the KV entry has expired.
pub async fn already_processed(
    conn: &ConnectionManager,
    pool: &Pool,
    post_id: Uuid,
    post_id_str: &str,
    sha256: &str,
) -> Result<bool> {
    let mut conn = conn.clone();
    let seen: Option<String> = conn.get(processed_key(post_id_str, sha256)).await?;
    if seen.is_some() {
        return Ok(true);
    }

    let enrichment = ingest_db::fetch_enrichment(pool, post_id, EnrichmentKind::Vision).await?;
    Ok(enrichment.map(|e| e.version == sha256).unwrap_or(false))
}

pub async fn mark_processed(conn: &ConnectionManager, post_id: &str, sha256: &str, ttl_h: u64) -> Result<()> {
    let mut conn = conn.clone();
    let _: () = conn.set_ex(processed_key(post_id, sha256), "1", ttl_h * 3600).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_key_is_scoped_to_post_and_sha() {
        assert_eq!(processed_key("p1", "abc"), "vision:processed:p1:abc");
    }
}
