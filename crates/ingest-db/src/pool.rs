use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use ingest_core::config::DatabaseConfig;
use tokio_postgres::NoTls;

use crate::error::Result;

/// Builds a connection pool from the structured `DatabaseConfig`, the same
/// single-object configuration style the rest of the crate uses.
pub fn build_pool(config: &DatabaseConfig) -> Result<Pool> {
    let mut pool_config = PoolConfig::new();
    pool_config.url = Some(config.url.clone());
    pool_config.pool = Some(deadpool_postgres::PoolConfig::new(config.max_pool_size as usize));

    let pool = pool_config.create_pool(Some(Runtime::Tokio1), NoTls)?;
    Ok(pool)
}
