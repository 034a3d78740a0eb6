//! Warehouse source client: executes a query and materializes the
//! result as an Arrow `RecordBatch`.
//!
//! The statement is prepared first so column names and types are known
//! even for empty results, then each column is encoded into a typed
//! Arrow array.

use std::sync::{Arc, LazyLock};

use anyhow::{Context as _, Result};
use arrow::array::{
    Array, BinaryBuilder, BooleanArray, Date32Array, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, StringBuilder, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use pg_escape::quote_identifier;
use tokio_postgres::types::Type;
use tokio_postgres::{Client, Column, NoTls, Row};

use crate::config::ConnectionConfig;

/// Unix epoch date, the base for Arrow Date32 day offsets.
static UNIX_EPOCH_DATE: LazyLock<NaiveDate> =
    LazyLock::new(|| NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch date is always valid"));

/// A connection capable of executing a query string and returning a
/// tabular result. The engine treats it as read-only and reuses it
/// across every dataset in a run.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch(&self, query: &str) -> Result<RecordBatch>;
}

/// Source client over the PostgreSQL wire protocol (PostgreSQL,
/// Redshift, and compatible warehouses).
pub struct PostgresSource {
    client: Client,
}

impl PostgresSource {
    /// Connect to the source using the provided config.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(&config.connection_string(), NoTls)
            .await
            .with_context(|| format!("source connection to {} failed", config.endpoint()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("source connection error: {e}");
            }
        });

        Ok(Self { client })
    }

    /// Cheap connectivity probe for `check`.
    pub async fn ping(&self) -> Result<()> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .context("source connection test failed")?;
        Ok(())
    }
}

#[async_trait]
impl SourceClient for PostgresSource {
    async fn fetch(&self, query: &str) -> Result<RecordBatch> {
        let mut statement = self
            .client
            .prepare(query)
            .await
            .context("failed to prepare source query")?;

        // Columns without a native decode path are re-selected as text,
        // otherwise their values would be unrepresentable client-side.
        if statement.columns().iter().any(|c| needs_text_cast(c.type_())) {
            let wrapped = wrap_with_text_casts(query, statement.columns());
            statement = self
                .client
                .prepare(&wrapped)
                .await
                .context("failed to prepare cast-wrapped source query")?;
        }

        let rows = self
            .client
            .query(&statement, &[])
            .await
            .context("source query failed")?;

        let fields: Vec<Field> = statement
            .columns()
            .iter()
            .map(|col| Field::new(col.name(), arrow_type(col.type_()), true))
            .collect();
        let schema = Arc::new(Schema::new(fields));

        rows_to_record_batch(&rows, &schema)
    }
}

/// Map a PostgreSQL column type to its Arrow target. Anything without a
/// native mapping is carried as UTF-8.
fn arrow_type(pg_type: &Type) -> DataType {
    match *pg_type {
        Type::INT2 => DataType::Int16,
        Type::INT4 => DataType::Int32,
        Type::INT8 => DataType::Int64,
        Type::FLOAT4 => DataType::Float32,
        Type::FLOAT8 => DataType::Float64,
        Type::BOOL => DataType::Boolean,
        Type::TIMESTAMP | Type::TIMESTAMPTZ => DataType::Timestamp(TimeUnit::Microsecond, None),
        Type::DATE => DataType::Date32,
        Type::BYTEA => DataType::Binary,
        _ => DataType::Utf8,
    }
}

/// Whether a column must be re-selected as `col::text`. True for any
/// type that falls back to UTF-8 in Arrow but does not arrive as text
/// on the wire (NUMERIC, UUID, TIME, INTERVAL, arrays, ...); decoding
/// those as `String` directly would fail on every cell.
fn needs_text_cast(pg_type: &Type) -> bool {
    arrow_type(pg_type) == DataType::Utf8
        && !matches!(
            *pg_type,
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
        )
}

/// Re-select the user's query through a subquery, casting every column
/// without a native decode path to text under its original name.
fn wrap_with_text_casts(query: &str, columns: &[Column]) -> String {
    let select_list = text_cast_select_list(columns.iter().map(|c| (c.name(), c.type_())));
    let inner = query.trim().trim_end_matches(';');
    format!("SELECT {select_list} FROM ({inner}) AS src")
}

fn text_cast_select_list<'a>(columns: impl Iterator<Item = (&'a str, &'a Type)>) -> String {
    columns
        .map(|(name, pg_type)| {
            let name = quote_identifier(name);
            if needs_text_cast(pg_type) {
                format!("{name}::text AS {name}")
            } else {
                name.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Encode rows into a `RecordBatch` following the prepared schema.
fn rows_to_record_batch(rows: &[Row], schema: &Arc<Schema>) -> Result<RecordBatch> {
    let arrays: Vec<Arc<dyn Array>> = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| encode_column(rows, i, field.data_type()))
        .collect();

    RecordBatch::try_new(schema.clone(), arrays).context("failed to build record batch")
}

fn encode_column(rows: &[Row], idx: usize, data_type: &DataType) -> Arc<dyn Array> {
    match data_type {
        DataType::Int16 => {
            let vals: Vec<Option<i16>> = rows.iter().map(|r| r.try_get(idx).ok()).collect();
            Arc::new(Int16Array::from(vals))
        }
        DataType::Int32 => {
            let vals: Vec<Option<i32>> = rows.iter().map(|r| r.try_get(idx).ok()).collect();
            Arc::new(Int32Array::from(vals))
        }
        DataType::Int64 => {
            let vals: Vec<Option<i64>> = rows.iter().map(|r| r.try_get(idx).ok()).collect();
            Arc::new(Int64Array::from(vals))
        }
        DataType::Float32 => {
            let vals: Vec<Option<f32>> = rows.iter().map(|r| r.try_get(idx).ok()).collect();
            Arc::new(Float32Array::from(vals))
        }
        DataType::Float64 => {
            let vals: Vec<Option<f64>> = rows.iter().map(|r| r.try_get(idx).ok()).collect();
            Arc::new(Float64Array::from(vals))
        }
        DataType::Boolean => {
            let vals: Vec<Option<bool>> = rows.iter().map(|r| r.try_get(idx).ok()).collect();
            Arc::new(BooleanArray::from(vals))
        }
        DataType::Timestamp(_, _) => encode_timestamp(rows, idx),
        DataType::Date32 => encode_date(rows, idx),
        DataType::Binary => encode_binary(rows, idx),
        _ => encode_utf8(rows, idx),
    }
}

fn encode_timestamp(rows: &[Row], idx: usize) -> Arc<dyn Array> {
    let vals: Vec<Option<i64>> = rows
        .iter()
        .map(|r| {
            // TIMESTAMP decodes as NaiveDateTime, TIMESTAMPTZ as
            // DateTime<Utc>; tokio-postgres uses distinct FromSql impls.
            r.try_get::<_, NaiveDateTime>(idx)
                .map(|dt| dt.and_utc().timestamp_micros())
                .or_else(|_| {
                    r.try_get::<_, DateTime<Utc>>(idx)
                        .map(|dt| dt.timestamp_micros())
                })
                .ok()
        })
        .collect();
    Arc::new(TimestampMicrosecondArray::from(vals))
}

fn encode_date(rows: &[Row], idx: usize) -> Arc<dyn Array> {
    let vals: Vec<Option<i32>> = rows
        .iter()
        .map(|r| {
            r.try_get::<_, NaiveDate>(idx).ok().map(|d| {
                // Date32 is days since epoch; realistic dates fit in i32.
                #[allow(clippy::cast_possible_truncation)]
                let days = (d - *UNIX_EPOCH_DATE).num_days() as i32;
                days
            })
        })
        .collect();
    Arc::new(Date32Array::from(vals))
}

fn encode_binary(rows: &[Row], idx: usize) -> Arc<dyn Array> {
    let mut builder = BinaryBuilder::with_capacity(rows.len(), rows.len() * 64);
    for row in rows {
        match row.try_get::<_, Vec<u8>>(idx) {
            Ok(v) => builder.append_value(v),
            Err(_) => builder.append_null(),
        }
    }
    Arc::new(builder.finish())
}

fn encode_utf8(rows: &[Row], idx: usize) -> Arc<dyn Array> {
    let mut builder = StringBuilder::with_capacity(rows.len(), rows.len() * 32);
    for row in rows {
        match row.try_get::<_, String>(idx) {
            Ok(v) => builder.append_value(v),
            Err(_) => builder.append_null(),
        }
    }
    Arc::new(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pg_types_map_to_arrow() {
        assert_eq!(arrow_type(&Type::INT8), DataType::Int64);
        assert_eq!(arrow_type(&Type::BOOL), DataType::Boolean);
        assert_eq!(
            arrow_type(&Type::TIMESTAMPTZ),
            DataType::Timestamp(TimeUnit::Microsecond, None)
        );
        assert_eq!(arrow_type(&Type::DATE), DataType::Date32);
        // No native mapping: carried as text.
        assert_eq!(arrow_type(&Type::NUMERIC), DataType::Utf8);
        assert_eq!(arrow_type(&Type::VARCHAR), DataType::Utf8);
    }

    #[test]
    fn text_cast_only_for_types_without_a_decode_path() {
        // Falls back to UTF-8 and is not text on the wire.
        assert!(needs_text_cast(&Type::NUMERIC));
        assert!(needs_text_cast(&Type::UUID));
        assert!(needs_text_cast(&Type::TIME));
        assert!(needs_text_cast(&Type::INTERVAL));
        assert!(needs_text_cast(&Type::INT4_ARRAY));

        // Already text on the wire.
        assert!(!needs_text_cast(&Type::TEXT));
        assert!(!needs_text_cast(&Type::VARCHAR));
        assert!(!needs_text_cast(&Type::BPCHAR));

        // Has a native Arrow mapping.
        assert!(!needs_text_cast(&Type::INT8));
        assert!(!needs_text_cast(&Type::DATE));
        assert!(!needs_text_cast(&Type::TIMESTAMPTZ));
    }

    #[test]
    fn select_list_casts_unmapped_columns_under_their_name() {
        let cols = [
            ("id", &Type::INT8),
            ("amount", &Type::NUMERIC),
            ("label", &Type::TEXT),
        ];
        let list = text_cast_select_list(cols.into_iter());
        assert_eq!(list, "id, amount::text AS amount, label");
    }

    #[test]
    fn select_list_quotes_hostile_column_names() {
        let cols = [("total due", &Type::NUMERIC)];
        let list = text_cast_select_list(cols.into_iter());
        assert_eq!(list, "\"total due\"::text AS \"total due\"");
    }
}
