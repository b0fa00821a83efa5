use deadpool_postgres::Client;

use crate::error::Result;

/// Initialise every table the writer needs. Safe to call on every startup;
/// each statement is `CREATE TABLE IF NOT EXISTS`.
pub async fn init_schema(client: &Client) -> Result<()> {
    create_identities_table(client).await?;
    create_memberships_table(client).await?;
    create_channels_table(client).await?;
    create_subscriptions_table(client).await?;
    create_posts_table(client).await?;
    create_media_objects_table(client).await?;
    create_post_media_map_table(client).await?;
    create_post_enrichments_table(client).await?;
    create_indexing_status_table(client).await?;
    create_albums_table(client).await?;
    create_album_items_table(client).await?;
    create_outbox_events_table(client).await?;
    Ok(())
}

async fn create_identities_table(client: &Client) -> Result<()> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS identities (
                id                 UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                platform_id        BIGINT NOT NULL UNIQUE,
                encrypted_session  TEXT,
                created_at         TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at         TIMESTAMPTZ NOT NULL DEFAULT now()
            );",
        )
        .await
        .map_err(crate::error::DbError::from_pg)
}

async fn create_memberships_table(client: &Client) -> Result<()> {
    // (tenant, identity) binding with a service tier; one identity may join
    // several tenants.
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS memberships (
                tenant_id     TEXT NOT NULL,
                identity_id   UUID NOT NULL REFERENCES identities(id),
                service_tier  TEXT NOT NULL DEFAULT 'free',
                created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (tenant_id, identity_id)
            );",
        )
        .await
        .map_err(crate::error::DbError::from_pg)
}

async fn create_channels_table(client: &Client) -> Result<()> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS channels (
                id                   UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                platform_channel_id  BIGINT NOT NULL UNIQUE,
                tenant_id            TEXT NOT NULL,
                title                TEXT,
                high_water_mark      BIGINT NOT NULL DEFAULT 0,
                is_active            BOOLEAN NOT NULL DEFAULT true,
                on_hold              BOOLEAN NOT NULL DEFAULT false,
                created_at           TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at           TIMESTAMPTZ NOT NULL DEFAULT now()
            );",
        )
        .await
        .map_err(crate::error::DbError::from_pg)
}

async fn create_subscriptions_table(client: &Client) -> Result<()> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS subscriptions (
                id           UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                identity_id  UUID NOT NULL REFERENCES identities(id),
                channel_id   UUID NOT NULL REFERENCES channels(id),
                is_active    BOOLEAN NOT NULL DEFAULT true,
                settings     JSONB NOT NULL DEFAULT '{}',
                created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (identity_id, channel_id)
            );",
        )
        .await
        .map_err(crate::error::DbError::from_pg)
}

async fn create_posts_table(client: &Client) -> Result<()> {
    // counters advance monotonically via GREATEST on upsert; is_edited and
    // edited_at are the only other mutable fields after first write.
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS posts (
                id                     UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                tenant_id              TEXT NOT NULL,
                channel_id             UUID NOT NULL REFERENCES channels(id),
                platform_message_id    BIGINT NOT NULL,
                text                   TEXT,
                posted_at              TIMESTAMPTZ NOT NULL,
                has_media              BOOLEAN NOT NULL DEFAULT false,
                is_forward             BOOLEAN NOT NULL DEFAULT false,
                is_reply               BOOLEAN NOT NULL DEFAULT false,
                views                  BIGINT NOT NULL DEFAULT 0,
                reactions              BIGINT NOT NULL DEFAULT 0,
                forwards               BIGINT NOT NULL DEFAULT 0,
                replies                BIGINT NOT NULL DEFAULT 0,
                is_edited              BOOLEAN NOT NULL DEFAULT false,
                edited_at              TIMESTAMPTZ,
                is_processed           BOOLEAN NOT NULL DEFAULT false,
                created_at             TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at             TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (channel_id, platform_message_id)
            );",
        )
        .await
        .map_err(crate::error::DbError::from_pg)
}

async fn create_media_objects_table(client: &Client) -> Result<()> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS media_objects (
                sha256          TEXT PRIMARY KEY,
                mime            TEXT NOT NULL,
                size_bytes      BIGINT NOT NULL,
                blob_key        TEXT NOT NULL,
                first_seen_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
                last_seen_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
                refs_count      BIGINT NOT NULL DEFAULT 0
            );",
        )
        .await
        .map_err(crate::error::DbError::from_pg)
}

async fn create_post_media_map_table(client: &Client) -> Result<()> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS post_media_map (
                post_id   UUID NOT NULL REFERENCES posts(id),
                sha256    TEXT NOT NULL REFERENCES media_objects(sha256),
                position  INTEGER NOT NULL,
                role      TEXT NOT NULL DEFAULT 'attachment',
                PRIMARY KEY (post_id, sha256)
            );",
        )
        .await
        .map_err(crate::error::DbError::from_pg)
}

async fn create_post_enrichments_table(client: &Client) -> Result<()> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS post_enrichments (
                post_id     UUID NOT NULL REFERENCES posts(id),
                kind        TEXT NOT NULL,
                payload     JSONB NOT NULL DEFAULT '{}',
                version     TEXT NOT NULL DEFAULT 'v1',
                metadata    JSONB NOT NULL DEFAULT '{}',
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (post_id, kind)
            );",
        )
        .await
        .map_err(crate::error::DbError::from_pg)
}

async fn create_indexing_status_table(client: &Client) -> Result<()> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS indexing_status (
                post_id                   UUID PRIMARY KEY REFERENCES posts(id),
                embedding_status          TEXT NOT NULL DEFAULT 'pending',
                graph_status              TEXT NOT NULL DEFAULT 'pending',
                vector_id                 TEXT,
                error_message             TEXT,
                processing_completed_at   TIMESTAMPTZ
            );",
        )
        .await
        .map_err(crate::error::DbError::from_pg)
}

async fn create_albums_table(client: &Client) -> Result<()> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS albums (
                id                    UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                channel_id            UUID NOT NULL REFERENCES channels(id),
                platform_grouped_id   BIGINT NOT NULL,
                items_count           INTEGER NOT NULL DEFAULT 0,
                cover_media_sha256    TEXT,
                caption               TEXT,
                posted_at             TIMESTAMPTZ NOT NULL,
                UNIQUE (channel_id, platform_grouped_id)
            );",
        )
        .await
        .map_err(crate::error::DbError::from_pg)
}

async fn create_album_items_table(client: &Client) -> Result<()> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS album_items (
                album_id  UUID NOT NULL REFERENCES albums(id),
                post_id   UUID NOT NULL REFERENCES posts(id),
                position  INTEGER NOT NULL,
                PRIMARY KEY (album_id, post_id)
            );",
        )
        .await
        .map_err(crate::error::DbError::from_pg)
}

async fn create_outbox_events_table(client: &Client) -> Result<()> {
    // C15's staging table: a write is durable here before it is ever
    // published to the event log.
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS outbox_events (
                id               UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                stream           TEXT NOT NULL,
                event            TEXT NOT NULL,
                idempotency_key  TEXT NOT NULL,
                payload          JSONB NOT NULL DEFAULT '{}',
                status           TEXT NOT NULL DEFAULT 'pending',
                retry_count      INTEGER NOT NULL DEFAULT 0,
                next_retry_at    TIMESTAMPTZ,
                last_error       TEXT,
                created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
                sent_at          TIMESTAMPTZ
            );
            CREATE INDEX IF NOT EXISTS idx_outbox_pending
                ON outbox_events (status, created_at);",
        )
        .await
        .map_err(crate::error::DbError::from_pg)
}
