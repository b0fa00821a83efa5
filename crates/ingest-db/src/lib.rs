pub mod albums;
pub mod enrichment;
pub mod error;
pub mod indexing;
pub mod outbox;
pub mod pool;
pub mod posts;
pub mod schema;
pub mod types;
pub mod writer;

pub use albums::{fetch_album, fetch_album_id_for_post, fetch_album_member_post_ids};
pub use enrichment::{fetch_enrichment, upsert_enrichment, upsert_enrichment_with_metadata};
pub use error::{DbError, FailureReason, Result};
pub use indexing::{
    fetch_indexing_status, fetch_post_for_indexing, is_terminal, mark_post_processed, upsert_indexing_status,
};
pub use outbox::{fetch_pending_outbox, insert_outbox, mark_outbox_failed, mark_outbox_sent, OutboxRow};
pub use pool::build_pool;
pub use posts::{fetch_post_media_shas, fetch_post_retag_context, PostRetagContext};
pub use schema::init_schema;
pub use writer::{AtomicBatchWriter, BatchWriteOutcome, ChannelDescriptor, UserDescriptor};
