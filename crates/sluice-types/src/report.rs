//! Structured run report returned by the orchestrator.
//!
//! Replaces print-based status reporting: every stage attempt produces
//! exactly one [`StageReport`] entry, success and failure both, so the
//! caller decides on presentation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dataset::TableMapping;
use crate::error::StageError;

/// Pipeline stage for one dataset, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetching,
    Resolving,
    EnsuringSchema,
    Replacing,
    Loading,
    Indexing,
    Refreshing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetching => "fetching",
            Self::Resolving => "resolving",
            Self::EnsuringSchema => "ensuring_schema",
            Self::Replacing => "replacing",
            Self::Loading => "loading",
            Self::Indexing => "indexing",
            Self::Refreshing => "refreshing",
        };
        f.write_str(s)
    }
}

/// Outcome of one stage attempt.
///
/// `Warn` marks a best-effort stage that failed without aborting the
/// dataset; `Failed` marks a failure that ended the dataset's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ok,
    Warn,
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Failed => "fail",
        };
        f.write_str(s)
    }
}

/// One stage attempt for one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    /// Human-readable outcome: row counts on success, cause on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Terminal state of one dataset's pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum DatasetOutcome {
    /// All stages ran; best-effort stages may still have warned.
    Done,
    /// An unrecoverable failure ended this dataset's run early.
    Aborted { stage: Stage, reason: String },
}

/// Full record of one dataset's pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetReport {
    pub alias: String,
    /// Resolved destination, absent when resolution never succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<TableMapping>,
    pub rows_loaded: u64,
    pub stages: Vec<StageReport>,
    pub outcome: DatasetOutcome,
}

impl DatasetReport {
    #[must_use]
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            mapping: None,
            rows_loaded: 0,
            stages: Vec::new(),
            outcome: DatasetOutcome::Done,
        }
    }

    /// Record a successful stage.
    pub fn stage_ok(&mut self, stage: Stage, detail: impl Into<String>) {
        self.stages.push(StageReport {
            stage,
            status: StageStatus::Ok,
            detail: Some(detail.into()),
        });
    }

    /// Record a best-effort stage failure; the dataset keeps running.
    pub fn stage_warn(&mut self, stage: Stage, err: &StageError) {
        self.stages.push(StageReport {
            stage,
            status: StageStatus::Warn,
            detail: Some(err.to_string()),
        });
    }

    /// Record an unrecoverable stage failure and mark the dataset aborted.
    pub fn abort(&mut self, stage: Stage, err: &StageError) {
        self.stages.push(StageReport {
            stage,
            status: StageStatus::Failed,
            detail: Some(err.to_string()),
        });
        self.outcome = DatasetOutcome::Aborted {
            stage,
            reason: err.to_string(),
        };
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, DatasetOutcome::Aborted { .. })
    }
}

/// Aggregate report for one run of the whole dataset schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub datasets: Vec<DatasetReport>,
}

impl RunReport {
    #[must_use]
    pub fn completed(&self) -> usize {
        self.datasets.iter().filter(|d| !d.is_aborted()).count()
    }

    #[must_use]
    pub fn aborted(&self) -> usize {
        self.datasets.iter().filter(|d| d.is_aborted()).count()
    }

    #[must_use]
    pub fn rows_loaded(&self) -> u64 {
        self.datasets.iter().map(|d| d.rows_loaded).sum()
    }

    #[must_use]
    pub fn any_aborted(&self) -> bool {
        self.aborted() > 0
    }
}
