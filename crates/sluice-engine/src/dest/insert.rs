//! Bulk load via chunked multi-value INSERT.
//!
//! Columns are downcast once per batch, then each chunk is written as a
//! single parameterized statement. No synthetic row-index column is
//! ever added; the batch's columns go in as-is, in order.

use std::fmt::Write as _;
use std::sync::LazyLock;

use anyhow::{anyhow, Context as _, Result};
use arrow::array::{
    Array, BinaryArray, BooleanArray, Date32Array, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use pg_escape::quote_identifier;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

use sluice_types::TableMapping;

use crate::identifier::qualified_name;

/// PostgreSQL caps bind parameters per statement at u16::MAX.
const MAX_PARAMS_PER_STATEMENT: usize = 65_535;

/// Upper bound on rows per statement even for narrow tables.
const MAX_ROWS_PER_STATEMENT: usize = 1000;

static UNIX_EPOCH_DATE: LazyLock<NaiveDate> =
    LazyLock::new(|| NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch date is always valid"));

/// Append every row of `batch` to the destination table. Returns rows
/// written, which on success equals `batch.num_rows()`.
pub(crate) async fn append_batch(
    client: &Client,
    mapping: &TableMapping,
    batch: &RecordBatch,
) -> Result<u64> {
    let num_rows = batch.num_rows();
    let num_cols = batch.num_columns();
    if num_rows == 0 || num_cols == 0 {
        return Ok(0);
    }

    let table = qualified_name(mapping);
    let col_list = batch
        .schema()
        .fields()
        .iter()
        .map(|f| quote_identifier(f.name()).into_owned())
        .collect::<Vec<_>>()
        .join(", ");

    let typed_cols = downcast_columns(batch)?;
    let rows_per_chunk = (MAX_PARAMS_PER_STATEMENT / num_cols)
        .min(MAX_ROWS_PER_STATEMENT)
        .max(1);

    let mut total_rows: u64 = 0;

    for chunk_start in (0..num_rows).step_by(rows_per_chunk) {
        let chunk_end = (chunk_start + rows_per_chunk).min(num_rows);
        let chunk_size = chunk_end - chunk_start;

        let sql = insert_statement(&table, &col_list, num_cols, chunk_size);

        let mut params: Vec<SqlParam<'_>> = Vec::with_capacity(chunk_size * num_cols);
        for row_idx in chunk_start..chunk_end {
            for typed_col in &typed_cols {
                params.push(sql_param(typed_col, row_idx));
            }
        }

        let param_refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(SqlParam::as_tosql).collect();

        client.execute(&sql, &param_refs).await.with_context(|| {
            format!("INSERT failed for {table}, rows {chunk_start}-{chunk_end}")
        })?;

        total_rows += chunk_size as u64;
    }

    tracing::debug!(table = %mapping, rows = total_rows, "bulk load complete");
    Ok(total_rows)
}

/// Build a multi-value INSERT with `$n` placeholders for `num_rows`
/// rows of `num_cols` columns.
fn insert_statement(table: &str, col_list: &str, num_cols: usize, num_rows: usize) -> String {
    let header = format!("INSERT INTO {table} ({col_list}) VALUES ");
    let mut sql = String::with_capacity(header.len() + num_rows * num_cols * 6);
    sql.push_str(&header);

    let mut param = 0;
    for row in 0..num_rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for col in 0..num_cols {
            if col > 0 {
                sql.push_str(", ");
            }
            param += 1;
            let _ = write!(sql, "${param}");
        }
        sql.push(')');
    }

    sql
}

/// Pre-downcast Arrow column reference; one downcast per column per
/// batch instead of one per cell.
enum TypedColumn<'a> {
    Int16(&'a Int16Array),
    Int32(&'a Int32Array),
    Int64(&'a Int64Array),
    Float32(&'a Float32Array),
    Float64(&'a Float64Array),
    Boolean(&'a BooleanArray),
    Utf8(&'a StringArray),
    TimestampMicros(&'a TimestampMicrosecondArray),
    Date32(&'a Date32Array),
    Binary(&'a BinaryArray),
}

fn downcast_columns(batch: &RecordBatch) -> Result<Vec<TypedColumn<'_>>> {
    (0..batch.num_columns())
        .map(|i| {
            let col = batch.column(i);
            let downcast_err = |expected: &str| {
                anyhow!("downcast failed for column {i} (expected {expected})")
            };
            match col.data_type() {
                DataType::Int16 => Ok(TypedColumn::Int16(
                    col.as_any()
                        .downcast_ref()
                        .ok_or_else(|| downcast_err("Int16Array"))?,
                )),
                DataType::Int32 => Ok(TypedColumn::Int32(
                    col.as_any()
                        .downcast_ref()
                        .ok_or_else(|| downcast_err("Int32Array"))?,
                )),
                DataType::Int64 => Ok(TypedColumn::Int64(
                    col.as_any()
                        .downcast_ref()
                        .ok_or_else(|| downcast_err("Int64Array"))?,
                )),
                DataType::Float32 => Ok(TypedColumn::Float32(
                    col.as_any()
                        .downcast_ref()
                        .ok_or_else(|| downcast_err("Float32Array"))?,
                )),
                DataType::Float64 => Ok(TypedColumn::Float64(
                    col.as_any()
                        .downcast_ref()
                        .ok_or_else(|| downcast_err("Float64Array"))?,
                )),
                DataType::Boolean => Ok(TypedColumn::Boolean(
                    col.as_any()
                        .downcast_ref()
                        .ok_or_else(|| downcast_err("BooleanArray"))?,
                )),
                DataType::Utf8 => Ok(TypedColumn::Utf8(
                    col.as_any()
                        .downcast_ref()
                        .ok_or_else(|| downcast_err("StringArray"))?,
                )),
                DataType::Timestamp(TimeUnit::Microsecond, _) => Ok(TypedColumn::TimestampMicros(
                    col.as_any()
                        .downcast_ref()
                        .ok_or_else(|| downcast_err("TimestampMicrosecondArray"))?,
                )),
                DataType::Date32 => Ok(TypedColumn::Date32(
                    col.as_any()
                        .downcast_ref()
                        .ok_or_else(|| downcast_err("Date32Array"))?,
                )),
                DataType::Binary => Ok(TypedColumn::Binary(
                    col.as_any()
                        .downcast_ref()
                        .ok_or_else(|| downcast_err("BinaryArray"))?,
                )),
                other => Err(anyhow!("unsupported column type {other} at index {i}")),
            }
        })
        .collect()
}

/// Typed INSERT bind parameter.
enum SqlParam<'a> {
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    Float32(Option<f32>),
    Float64(Option<f64>),
    Boolean(Option<bool>),
    Text(Option<&'a str>),
    Timestamp(Option<NaiveDateTime>),
    Date(Option<NaiveDate>),
    Bytes(Option<&'a [u8]>),
}

impl SqlParam<'_> {
    fn as_tosql(&self) -> &(dyn ToSql + Sync) {
        match self {
            Self::Int16(v) => v,
            Self::Int32(v) => v,
            Self::Int64(v) => v,
            Self::Float32(v) => v,
            Self::Float64(v) => v,
            Self::Boolean(v) => v,
            Self::Text(v) => v,
            Self::Timestamp(v) => v,
            Self::Date(v) => v,
            Self::Bytes(v) => v,
        }
    }
}

fn sql_param<'a>(col: &TypedColumn<'a>, row_idx: usize) -> SqlParam<'a> {
    match col {
        TypedColumn::Int16(arr) => SqlParam::Int16(value_at(*arr, row_idx, Int16Array::value)),
        TypedColumn::Int32(arr) => SqlParam::Int32(value_at(*arr, row_idx, Int32Array::value)),
        TypedColumn::Int64(arr) => SqlParam::Int64(value_at(*arr, row_idx, Int64Array::value)),
        TypedColumn::Float32(arr) => {
            SqlParam::Float32(value_at(*arr, row_idx, Float32Array::value))
        }
        TypedColumn::Float64(arr) => {
            SqlParam::Float64(value_at(*arr, row_idx, Float64Array::value))
        }
        TypedColumn::Boolean(arr) => {
            if arr.is_null(row_idx) {
                SqlParam::Boolean(None)
            } else {
                SqlParam::Boolean(Some(arr.value(row_idx)))
            }
        }
        TypedColumn::Utf8(arr) => {
            if arr.is_null(row_idx) {
                SqlParam::Text(None)
            } else {
                SqlParam::Text(Some(arr.value(row_idx)))
            }
        }
        TypedColumn::TimestampMicros(arr) => {
            if arr.is_null(row_idx) {
                SqlParam::Timestamp(None)
            } else {
                SqlParam::Timestamp(
                    DateTime::from_timestamp_micros(arr.value(row_idx)).map(|dt| dt.naive_utc()),
                )
            }
        }
        TypedColumn::Date32(arr) => {
            if arr.is_null(row_idx) {
                SqlParam::Date(None)
            } else {
                let days = i64::from(arr.value(row_idx));
                SqlParam::Date(Some(*UNIX_EPOCH_DATE + Duration::days(days)))
            }
        }
        TypedColumn::Binary(arr) => {
            if arr.is_null(row_idx) {
                SqlParam::Bytes(None)
            } else {
                SqlParam::Bytes(Some(arr.value(row_idx)))
            }
        }
    }
}

fn value_at<A, T>(arr: &A, row_idx: usize, get: impl Fn(&A, usize) -> T) -> Option<T>
where
    A: Array,
{
    if arr.is_null(row_idx) {
        None
    } else {
        Some(get(arr, row_idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_statement_numbers_params_per_row() {
        let sql = insert_statement("a.b", "x, y", 2, 2);
        assert_eq!(sql, "INSERT INTO a.b (x, y) VALUES ($1, $2), ($3, $4)");
    }

    #[test]
    fn insert_statement_single_row() {
        let sql = insert_statement("analytics.sales", "id", 1, 1);
        assert_eq!(sql, "INSERT INTO analytics.sales (id) VALUES ($1)");
    }

    #[test]
    fn chunk_sizing_respects_param_limit() {
        // 100 columns: 65_535 / 100 = 655 rows per statement.
        let rows = (MAX_PARAMS_PER_STATEMENT / 100)
            .min(MAX_ROWS_PER_STATEMENT)
            .max(1);
        assert_eq!(rows, 655);

        // Narrow tables stay capped at the row bound.
        let rows = (MAX_PARAMS_PER_STATEMENT / 2)
            .min(MAX_ROWS_PER_STATEMENT)
            .max(1);
        assert_eq!(rows, 1000);
    }
}
