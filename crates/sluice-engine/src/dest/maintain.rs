//! Post-load table maintenance: planner statistics and space reclaim.

use anyhow::{anyhow, Context as _, Result};
use tokio_postgres::Client;

use sluice_types::TableMapping;

use crate::identifier::qualified_name;

/// Refresh planner statistics, then reclaim and refresh in one pass.
///
/// Both statements go through the simple-query path: VACUUM cannot run
/// inside a transaction block, which the extended protocol may open.
pub(crate) async fn refresh_statistics(client: &Client, mapping: &TableMapping) -> Result<()> {
    let table = qualified_name(mapping);

    client
        .batch_execute(&format!("ANALYZE {table}"))
        .await
        .with_context(|| format!("ANALYZE failed for {table}"))?;

    client
        .batch_execute(&format!("VACUUM ANALYZE {table}"))
        .await
        .map_err(|e| anyhow!("VACUUM ANALYZE failed for {table} (ANALYZE succeeded): {e}"))?;

    tracing::debug!(table = %mapping, "statistics refreshed");
    Ok(())
}
