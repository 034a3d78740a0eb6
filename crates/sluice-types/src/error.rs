//! Typed per-stage failure model.
//!
//! Every error kind is caught at the stage boundary where it occurs and
//! recorded in the dataset's report; none propagate out of the
//! orchestrator, so a single dataset can never fail the batch.

use serde::{Deserialize, Serialize};

/// Failure of one pipeline stage for one dataset.
///
/// `SourceQuery`, `UnresolvableTableName`, and `Load` abort the
/// dataset's remaining stages; the rest are best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum StageError {
    #[error("source query failed: {0}")]
    SourceQuery(String),

    #[error("cannot derive a destination table for alias '{alias}'")]
    UnresolvableTableName { alias: String },

    #[error("schema ensure failed: {0}")]
    SchemaEnsure(String),

    #[error("replace delete failed: {0}")]
    Replacement(String),

    #[error("bulk load failed: {0}")]
    Load(String),

    #[error("index creation failed: {0}")]
    Index(String),

    #[error("statistics refresh failed: {0}")]
    Statistics(String),
}

impl StageError {
    /// Whether this failure aborts the dataset's remaining stages.
    #[must_use]
    pub fn aborts_dataset(&self) -> bool {
        matches!(
            self,
            Self::SourceQuery(_) | Self::UnresolvableTableName { .. } | Self::Load(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_cause() {
        let err = StageError::Load("INSERT failed for analytics.sales".to_string());
        assert_eq!(
            err.to_string(),
            "bulk load failed: INSERT failed for analytics.sales"
        );
    }

    #[test]
    fn unresolvable_names_the_alias() {
        let err = StageError::UnresolvableTableName {
            alias: "plain".to_string(),
        };
        assert!(err.to_string().contains("'plain'"));
    }

    #[test]
    fn abort_classification() {
        assert!(StageError::SourceQuery(String::new()).aborts_dataset());
        assert!(StageError::Load(String::new()).aborts_dataset());
        assert!(!StageError::Replacement(String::new()).aborts_dataset());
        assert!(!StageError::Index(String::new()).aborts_dataset());
        assert!(!StageError::Statistics(String::new()).aborts_dataset());
        assert!(!StageError::SchemaEnsure(String::new()).aborts_dataset());
    }
}
