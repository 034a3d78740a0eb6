//! Identifier validation and quoting.
//!
//! Alias, table, and column names arrive from plan files and are
//! untrusted; everything interpolated into statement text passes
//! through `quote_identifier`, and names we compose ourselves (index
//! names) are validated against PostgreSQL identifier rules first.

use pg_escape::quote_identifier;
use sluice_types::TableMapping;

/// PostgreSQL truncates identifiers beyond this length.
const MAX_IDENTIFIER_BYTES: usize = 63;

/// Validate a name against PostgreSQL unquoted-identifier rules.
pub fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("identifier must not be empty".to_string());
    }

    if name.len() > MAX_IDENTIFIER_BYTES {
        return Err(format!(
            "identifier '{}' exceeds PostgreSQL maximum length of {} bytes (got {})",
            name,
            MAX_IDENTIFIER_BYTES,
            name.len()
        ));
    }

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err("identifier must not be empty".to_string());
    };
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(format!(
            "identifier must start with a letter or underscore, got '{first}'"
        ));
    }

    for ch in chars {
        if !ch.is_ascii_alphanumeric() && ch != '_' {
            return Err(format!("identifier contains invalid character '{ch}'"));
        }
    }

    Ok(())
}

/// Build a schema-qualified table name: `"schema"."table"`.
#[must_use]
pub fn qualified_name(mapping: &TableMapping) -> String {
    format!(
        "{}.{}",
        quote_identifier(&mapping.schema),
        quote_identifier(&mapping.table)
    )
}

/// Deterministic secondary index name for (table, column).
///
/// Repeated runs produce the same name, so `CREATE INDEX IF NOT EXISTS`
/// never accumulates duplicates.
pub fn index_name(table: &str, column: &str) -> Result<String, String> {
    let name = format!("idx_{table}_{column}");
    validate_identifier(&name)?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(validate_identifier("sales").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("sale_date_2025").is_ok());
    }

    #[test]
    fn rejects_empty_and_overlong() {
        assert!(validate_identifier("").is_err());
        let long = "a".repeat(64);
        assert!(validate_identifier(&long).is_err());
        let max = "a".repeat(63);
        assert!(validate_identifier(&max).is_ok());
    }

    #[test]
    fn rejects_bad_first_char_and_injection_chars() {
        assert!(validate_identifier("1sales").is_err());
        assert!(validate_identifier("sales; DROP TABLE x").is_err());
        assert!(validate_identifier("sa-les").is_err());
    }

    #[test]
    fn qualified_name_quotes_only_when_needed() {
        let plain = TableMapping::new("analytics", "sales");
        assert_eq!(qualified_name(&plain), "analytics.sales");

        let hostile = TableMapping::new("an alytics", "sa\"les");
        assert_eq!(qualified_name(&hostile), "\"an alytics\".\"sa\"\"les\"");
    }

    #[test]
    fn index_name_is_deterministic() {
        assert_eq!(index_name("sales", "sale_date").unwrap(), "idx_sales_sale_date");
        assert_eq!(
            index_name("sales", "sale_date").unwrap(),
            index_name("sales", "sale_date").unwrap()
        );
    }

    #[test]
    fn index_name_rejects_hostile_columns() {
        assert!(index_name("sales", "x); DROP INDEX y").is_err());
    }
}
