//! Destination table resolution for dataset aliases.

use sluice_types::{StageError, TableMapping};

/// Derive the destination (schema, table) for an alias.
///
/// An explicit override wins verbatim; otherwise the alias is split on
/// its first `.`. An alias with no separator, or with an empty half,
/// yields [`StageError::UnresolvableTableName`] and the dataset is
/// skipped without affecting the rest of the batch.
pub fn resolve_table(
    alias: &str,
    override_mapping: Option<&TableMapping>,
) -> Result<TableMapping, StageError> {
    if let Some(mapping) = override_mapping {
        return Ok(mapping.clone());
    }

    match alias.split_once('.') {
        Some((schema, table)) if !schema.is_empty() && !table.is_empty() => {
            Ok(TableMapping::new(schema, table))
        }
        _ => Err(StageError::UnresolvableTableName {
            alias: alias.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_verbatim() {
        let override_mapping = TableMapping::new("ops", "daily_sales");
        let resolved = resolve_table("analytics.sales", Some(&override_mapping)).unwrap();
        assert_eq!(resolved, override_mapping);
    }

    #[test]
    fn splits_on_first_separator() {
        let resolved = resolve_table("analytics.sales", None).unwrap();
        assert_eq!(resolved, TableMapping::new("analytics", "sales"));

        // Only the first `.` splits; the rest stays in the table name.
        let resolved = resolve_table("a.b.c", None).unwrap();
        assert_eq!(resolved, TableMapping::new("a", "b.c"));
    }

    #[test]
    fn plain_alias_is_unresolvable() {
        let err = resolve_table("plain", None).unwrap_err();
        assert_eq!(
            err,
            StageError::UnresolvableTableName {
                alias: "plain".to_string()
            }
        );
    }

    #[test]
    fn empty_halves_are_unresolvable() {
        assert!(resolve_table(".sales", None).is_err());
        assert!(resolve_table("analytics.", None).is_err());
        assert!(resolve_table(".", None).is_err());
    }
}
