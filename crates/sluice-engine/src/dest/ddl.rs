//! Schema and index DDL.

use anyhow::{anyhow, Context as _, Result};
use pg_escape::quote_identifier;
use tokio_postgres::Client;

use sluice_types::TableMapping;

use crate::identifier::{index_name, qualified_name, validate_identifier};

pub(crate) async fn ensure_schema(client: &Client, schema: &str) -> Result<()> {
    let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_identifier(schema));
    client
        .execute(&sql, &[])
        .await
        .with_context(|| format!("failed to create schema '{schema}'"))?;
    tracing::debug!(schema, "schema ensured");
    Ok(())
}

/// Create a single-column index if absent. The name is a pure function
/// of table and column, so repeated runs reuse the same index.
pub(crate) async fn create_index(
    client: &Client,
    mapping: &TableMapping,
    column: &str,
) -> Result<()> {
    validate_identifier(column).map_err(|e| anyhow!("invalid index column: {e}"))?;
    let name = index_name(&mapping.table, column).map_err(|e| anyhow!("invalid index name: {e}"))?;

    let sql = format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_identifier(&name),
        qualified_name(mapping),
        quote_identifier(column)
    );
    client
        .execute(&sql, &[])
        .await
        .with_context(|| format!("failed to create index {name} on {mapping}"))?;
    tracing::debug!(index = name, table = %mapping, "index ensured");
    Ok(())
}
