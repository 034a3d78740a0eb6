//! Destination store: the session the whole run shares, and the seam
//! trait the orchestrator drives.

pub(crate) mod ddl;
pub(crate) mod insert;
pub(crate) mod maintain;
pub(crate) mod replace;

use anyhow::{Context as _, Result};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};

use sluice_types::{ReplacementPredicate, TableMapping};

use crate::config::ConnectionConfig;

/// Destination-side operations the pipeline needs, one method per
/// stage. A single session backs all datasets in a run; methods take
/// `&self` and execute serially.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Idempotent `CREATE SCHEMA IF NOT EXISTS`.
    async fn ensure_schema(&self, schema: &str) -> Result<()>;

    /// Delete the slice matched by `predicate`, or every row when
    /// absent. Returns rows deleted.
    async fn delete_rows(
        &self,
        mapping: &TableMapping,
        predicate: Option<&ReplacementPredicate>,
    ) -> Result<u64>;

    /// Append every row of `batch`, preserving column order. Returns
    /// rows written, which on success equals the batch's row count.
    async fn append_batch(&self, mapping: &TableMapping, batch: &RecordBatch) -> Result<u64>;

    /// Idempotent single-column index, deterministically named from
    /// table and column.
    async fn create_index(&self, mapping: &TableMapping, column: &str) -> Result<()>;

    /// Statistics-only refresh followed by reclaim-and-refresh.
    async fn refresh_statistics(&self, mapping: &TableMapping) -> Result<()>;
}

/// PostgreSQL destination session.
pub struct PostgresDestination {
    client: Client,
}

impl PostgresDestination {
    /// Connect to the destination using the provided config.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(&config.connection_string(), NoTls)
            .await
            .with_context(|| format!("destination connection to {} failed", config.endpoint()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("destination connection error: {e}");
            }
        });

        Ok(Self { client })
    }

    /// Cheap connectivity probe for `check`.
    pub async fn ping(&self) -> Result<()> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .context("destination connection test failed")?;
        Ok(())
    }
}

#[async_trait]
impl Destination for PostgresDestination {
    async fn ensure_schema(&self, schema: &str) -> Result<()> {
        ddl::ensure_schema(&self.client, schema).await
    }

    async fn delete_rows(
        &self,
        mapping: &TableMapping,
        predicate: Option<&ReplacementPredicate>,
    ) -> Result<u64> {
        replace::delete_rows(&self.client, mapping, predicate).await
    }

    async fn append_batch(&self, mapping: &TableMapping, batch: &RecordBatch) -> Result<u64> {
        insert::append_batch(&self.client, mapping, batch).await
    }

    async fn create_index(&self, mapping: &TableMapping, column: &str) -> Result<()> {
        ddl::create_index(&self.client, mapping, column).await
    }

    async fn refresh_statistics(&self, mapping: &TableMapping) -> Result<()> {
        maintain::refresh_statistics(&self.client, mapping).await
    }
}
