use qdrant_client::qdrant::{
    CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId, PointStruct, PointsIdsList,
    RetrievedPoint, ScrollPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::instrument;
use uuid::Uuid;

use crate::error::Result;

/// One Qdrant collection per tenant (`t{tenant}_posts`, spec §3), vector size
/// fixed by whichever embedding provider is configured.
pub struct VectorStore {
    client: Qdrant,
}

impl VectorStore {
    pub fn new(client: Qdrant) -> Self {
        Self { client }
    }

    pub fn collection_name(tenant_id: &str) -> String {
        format!("t{tenant_id}_posts")
    }

    /// Creates the collection if it doesn't already exist. Safe to call on
    /// every indexing pass; the existence check makes this idempotent.
    #[instrument(skip(self))]
    pub async fn ensure_collection(&self, name: &str, vector_size: u64) -> Result<()> {
        if self.client.collection_exists(name).await? {
            return Ok(());
        }
        self.client
            .create_collection(
                CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
            )
            .await?;
        Ok(())
    }

    /// Upserts one point keyed by the post's UUID, so replays of the same
    /// post simply overwrite its vector/payload instead of duplicating it.
    #[instrument(skip(self, vector, payload))]
    pub async fn upsert(&self, collection: &str, post_id: Uuid, vector: Vec<f32>, payload: serde_json::Value) -> Result<()> {
        let payload: Payload = payload.try_into().unwrap_or_default();
        let point = PointStruct::new(post_id.to_string(), vector, payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, vec![point]))
            .await?;
        Ok(())
    }

    pub async fn delete(&self, collection: &str, post_id: Uuid) -> Result<()> {
        let point_id: PointId = post_id.to_string().into();
        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(PointsIdsList { ids: vec![point_id] }))
            .await?;
        Ok(())
    }

    /// Maintenance-only scan over a collection, e.g. to find stale points
    /// after a post's graph `expires_at` passes. Not on the hot indexing
    /// path.
    #[instrument(skip(self, filter))]
    pub async fn scroll_by_filter(&self, collection: &str, filter: Filter) -> Result<Vec<RetrievedPoint>> {
        let resp = self.client.scroll(ScrollPointsBuilder::new(collection).filter(filter)).await?;
        Ok(resp.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_name_matches_spec_prefix() {
        assert_eq!(VectorStore::collection_name("acme"), "tacme_posts");
    }
}
