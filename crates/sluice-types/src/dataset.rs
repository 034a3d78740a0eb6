//! Dataset descriptions and per-alias overrides.
//!
//! The alias is the join key across every optional map: a plan entry's
//! table override, replacement predicate, and index columns are all
//! looked up by the same alias string.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One unit of work: a source query mapped to one destination table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSpec {
    /// Caller-chosen identifier, may carry a `schema.table` hint.
    pub alias: String,
    /// Query text executed verbatim against the source connection.
    pub source_query: String,
}

impl DatasetSpec {
    #[must_use]
    pub fn new(alias: impl Into<String>, source_query: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            source_query: source_query.into(),
        }
    }
}

/// Resolved destination identity for a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    pub schema: String,
    pub table: String,
}

impl TableMapping {
    #[must_use]
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Typed scalar bound as a SQL parameter, never interpolated.
///
/// Untagged so plan YAML can write `value: 42` or `value: "2025-07-01"`
/// directly. Variant order matters for untagged deserialization: bool
/// before integer before float before string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Scopes a replace to the slice where `column = value` instead of the
/// whole table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementPredicate {
    pub column: String,
    pub value: ScalarValue,
}

/// The full batch handed to the orchestrator: datasets in run order plus
/// the optional per-alias override maps.
#[derive(Debug, Clone, Default)]
pub struct ReplicationPlan {
    pub datasets: Vec<DatasetSpec>,
    pub table_overrides: HashMap<String, TableMapping>,
    pub predicates: HashMap<String, ReplacementPredicate>,
    pub index_columns: HashMap<String, Vec<String>>,
}

impl ReplicationPlan {
    #[must_use]
    pub fn new(datasets: Vec<DatasetSpec>) -> Self {
        Self {
            datasets,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_value_yaml_forms() {
        let v: ScalarValue = serde_yaml::from_str("42").unwrap();
        assert_eq!(v, ScalarValue::Int(42));

        let v: ScalarValue = serde_yaml::from_str("true").unwrap();
        assert_eq!(v, ScalarValue::Bool(true));

        let v: ScalarValue = serde_yaml::from_str("2.5").unwrap();
        assert_eq!(v, ScalarValue::Float(2.5));

        let v: ScalarValue = serde_yaml::from_str("\"2025-07-01\"").unwrap();
        assert_eq!(v, ScalarValue::Text("2025-07-01".to_string()));
    }

    #[test]
    fn table_mapping_display() {
        let m = TableMapping::new("analytics", "sales");
        assert_eq!(m.to_string(), "analytics.sales");
    }
}
