//! Destructive replace: delete the rows the load is about to supersede.

use anyhow::{Context as _, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use pg_escape::quote_identifier;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Client;

use sluice_types::{ReplacementPredicate, ScalarValue, TableMapping};

use crate::identifier::qualified_name;

/// Delete the slice matched by `predicate`, or all rows when absent.
/// The predicate value is bound as a parameter, never interpolated.
pub(crate) async fn delete_rows(
    client: &Client,
    mapping: &TableMapping,
    predicate: Option<&ReplacementPredicate>,
) -> Result<u64> {
    let sql = delete_statement(mapping, predicate);

    let deleted = match predicate {
        None => client
            .execute(&sql, &[])
            .await
            .with_context(|| format!("full delete on {mapping} failed"))?,
        Some(p) => match &p.value {
            ScalarValue::Text(text) => delete_text_slice(client, mapping, &p.column, text, &sql)
                .await
                .with_context(|| format!("scoped delete on {mapping} failed"))?,
            value => client
                .execute(&sql, &[bind_param(value)])
                .await
                .with_context(|| format!("scoped delete on {mapping} failed"))?,
        },
    };

    Ok(deleted)
}

/// Scoped delete for a text predicate value.
///
/// The column's type is learned from the prepared statement's inferred
/// parameter type, and the text is bound in that type: temporal columns
/// get a parsed chrono value, so a plan's ISO date slices a date or
/// timestamp column the same way a quoted literal would. Types that
/// take neither a text bind nor a temporal parse fall back to comparing
/// text forms.
async fn delete_text_slice(
    client: &Client,
    mapping: &TableMapping,
    column: &str,
    text: &str,
    sql: &str,
) -> Result<u64> {
    let statement = client.prepare(sql).await?;
    let param_type = statement
        .params()
        .first()
        .cloned()
        .unwrap_or(Type::TEXT);

    let deleted = match text_bind(text, &param_type)? {
        TextBind::Date(v) => client.execute(&statement, &[&v]).await?,
        TextBind::Timestamp(v) => client.execute(&statement, &[&v]).await?,
        TextBind::TimestampTz(v) => client.execute(&statement, &[&v]).await?,
        TextBind::Text(v) => client.execute(&statement, &[&v]).await?,
        TextBind::TextForm(v) => {
            let fallback = text_form_statement(mapping, column);
            client.execute(&fallback, &[&v]).await?
        }
    };
    Ok(deleted)
}

/// Build the DELETE statement for a mapping and optional predicate.
///
/// Numeric and boolean parameters carry an explicit cast so the server
/// accepts the bind type and promotes in the comparison. Text values
/// bind uncast; the parameter takes the column's own type.
fn delete_statement(mapping: &TableMapping, predicate: Option<&ReplacementPredicate>) -> String {
    let table = qualified_name(mapping);
    match predicate {
        None => format!("DELETE FROM {table}"),
        Some(p) => {
            let column = quote_identifier(&p.column);
            match p.value {
                ScalarValue::Int(_) => format!("DELETE FROM {table} WHERE {column} = $1::bigint"),
                ScalarValue::Float(_) => {
                    format!("DELETE FROM {table} WHERE {column} = $1::double precision")
                }
                ScalarValue::Bool(_) => format!("DELETE FROM {table} WHERE {column} = $1::boolean"),
                ScalarValue::Text(_) => format!("DELETE FROM {table} WHERE {column} = $1"),
            }
        }
    }
}

/// Last-resort statement comparing the column's text form, for column
/// types a plain text parameter cannot bind to (NUMERIC, UUID, ...).
fn text_form_statement(mapping: &TableMapping, column: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {}::text = $1",
        qualified_name(mapping),
        quote_identifier(column)
    )
}

fn bind_param(value: &ScalarValue) -> &(dyn ToSql + Sync) {
    match value {
        ScalarValue::Bool(v) => v,
        ScalarValue::Int(v) => v,
        ScalarValue::Float(v) => v,
        ScalarValue::Text(v) => v,
    }
}

/// A text predicate value converted for the column's parameter type.
#[derive(Debug, PartialEq)]
enum TextBind {
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Text(String),
    TextForm(String),
}

fn text_bind(text: &str, param_type: &Type) -> Result<TextBind> {
    match *param_type {
        Type::DATE => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(TextBind::Date)
            .with_context(|| format!("predicate value '{text}' is not a date")),
        Type::TIMESTAMP => parse_timestamp(text)
            .map(TextBind::Timestamp)
            .with_context(|| format!("predicate value '{text}' is not a timestamp")),
        Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| parse_timestamp(text).map(|dt| dt.and_utc()))
            .map(TextBind::TimestampTz)
            .with_context(|| format!("predicate value '{text}' is not a timestamp")),
        ref t if accepts_text_bind(t) => Ok(TextBind::Text(text.to_string())),
        _ => Ok(TextBind::TextForm(text.to_string())),
    }
}

/// A bare date parses to midnight, matching what the server does when
/// it coerces a date literal into a timestamp comparison.
fn parse_timestamp(text: &str) -> chrono::ParseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn accepts_text_bind(param_type: &Type) -> bool {
    matches!(
        *param_type,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_delete_statement() {
        let mapping = TableMapping::new("analytics", "sales");
        assert_eq!(
            delete_statement(&mapping, None),
            "DELETE FROM analytics.sales"
        );
    }

    #[test]
    fn text_predicate_binds_uncast() {
        let mapping = TableMapping::new("analytics", "sales");
        let predicate = ReplacementPredicate {
            column: "sale_date".to_string(),
            value: ScalarValue::Text("2025-07-01".to_string()),
        };
        assert_eq!(
            delete_statement(&mapping, Some(&predicate)),
            "DELETE FROM analytics.sales WHERE sale_date = $1"
        );
    }

    #[test]
    fn numeric_predicate_casts_the_bind() {
        let mapping = TableMapping::new("analytics", "sales");
        let predicate = ReplacementPredicate {
            column: "region_id".to_string(),
            value: ScalarValue::Int(7),
        };
        assert_eq!(
            delete_statement(&mapping, Some(&predicate)),
            "DELETE FROM analytics.sales WHERE region_id = $1::bigint"
        );
    }

    #[test]
    fn hostile_column_is_quoted() {
        let mapping = TableMapping::new("a", "b");
        let predicate = ReplacementPredicate {
            column: "col\" OR 1=1 --".to_string(),
            value: ScalarValue::Bool(true),
        };
        let sql = delete_statement(&mapping, Some(&predicate));
        assert_eq!(
            sql,
            "DELETE FROM a.b WHERE \"col\"\" OR 1=1 --\" = $1::boolean"
        );
    }

    #[test]
    fn text_form_fallback_compares_text() {
        let mapping = TableMapping::new("a", "b");
        assert_eq!(
            text_form_statement(&mapping, "amount"),
            "DELETE FROM a.b WHERE amount::text = $1"
        );
    }

    #[test]
    fn date_column_gets_a_parsed_date() {
        let bind = text_bind("2025-07-01", &Type::DATE).unwrap();
        let expected = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        assert_eq!(bind, TextBind::Date(expected));
    }

    #[test]
    fn bare_date_against_timestamp_column_means_midnight() {
        let bind = text_bind("2025-07-01", &Type::TIMESTAMP).unwrap();
        let expected = NaiveDate::from_ymd_opt(2025, 7, 1)
            .unwrap()
            .and_time(NaiveTime::MIN);
        assert_eq!(bind, TextBind::Timestamp(expected));
    }

    #[test]
    fn full_timestamp_forms_parse() {
        let expected = NaiveDate::from_ymd_opt(2025, 7, 1)
            .unwrap()
            .and_hms_opt(13, 30, 0)
            .unwrap();
        assert_eq!(
            text_bind("2025-07-01 13:30:00", &Type::TIMESTAMP).unwrap(),
            TextBind::Timestamp(expected)
        );
        assert_eq!(
            text_bind("2025-07-01T13:30:00", &Type::TIMESTAMP).unwrap(),
            TextBind::Timestamp(expected)
        );
    }

    #[test]
    fn rfc3339_offset_normalizes_to_utc() {
        let bind = text_bind("2025-07-01T02:00:00+02:00", &Type::TIMESTAMPTZ).unwrap();
        let expected = NaiveDate::from_ymd_opt(2025, 7, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(bind, TextBind::TimestampTz(expected));
    }

    #[test]
    fn text_columns_bind_directly() {
        assert_eq!(
            text_bind("north", &Type::VARCHAR).unwrap(),
            TextBind::Text("north".to_string())
        );
        assert_eq!(
            text_bind("north", &Type::TEXT).unwrap(),
            TextBind::Text("north".to_string())
        );
    }

    #[test]
    fn unbindable_types_fall_back_to_text_form() {
        assert_eq!(
            text_bind("7.50", &Type::NUMERIC).unwrap(),
            TextBind::TextForm("7.50".to_string())
        );
        assert_eq!(
            text_bind("a0eebc99-1", &Type::UUID).unwrap(),
            TextBind::TextForm("a0eebc99-1".to_string())
        );
    }

    #[test]
    fn unparseable_temporal_value_errors() {
        assert!(text_bind("not-a-date", &Type::DATE).is_err());
        assert!(text_bind("not-a-time", &Type::TIMESTAMP).is_err());
    }
}
