//! Shared data model for the sluice replication engine.

pub mod dataset;
pub mod error;
pub mod report;

pub use dataset::{DatasetSpec, ReplacementPredicate, ReplicationPlan, ScalarValue, TableMapping};
pub use error::StageError;
pub use report::{DatasetOutcome, DatasetReport, RunReport, Stage, StageReport, StageStatus};
