//! Replication orchestrator.
//!
//! Drives each dataset through fetch, resolve, schema ensure, replace,
//! load, index, and statistics refresh, in that order. Failures are
//! caught at the stage boundary: source, resolution, and load failures
//! abort the dataset; replace, schema, index, and statistics failures
//! are best-effort and the dataset keeps going. One dataset's outcome
//! never affects another's, and the batch as a whole never fails.

use sluice_types::{DatasetReport, DatasetSpec, ReplicationPlan, RunReport, Stage, StageError};

use crate::dest::Destination;
use crate::resolve::resolve_table;
use crate::source::SourceClient;

/// Run the whole dataset schedule in its given order and return the
/// structured report. The destination session and source client are
/// shared across all datasets.
pub async fn run_replication(
    source: &dyn SourceClient,
    dest: &dyn Destination,
    plan: &ReplicationPlan,
) -> RunReport {
    let mut run = RunReport::default();

    for spec in &plan.datasets {
        let report = run_dataset(source, dest, spec, plan).await;
        if report.is_aborted() {
            tracing::warn!(alias = %spec.alias, "dataset aborted");
        } else {
            tracing::info!(
                alias = %spec.alias,
                rows = report.rows_loaded,
                "dataset complete"
            );
        }
        run.datasets.push(report);
    }

    tracing::info!(
        completed = run.completed(),
        aborted = run.aborted(),
        rows_loaded = run.rows_loaded(),
        "replication run finished"
    );

    run
}

async fn run_dataset(
    source: &dyn SourceClient,
    dest: &dyn Destination,
    spec: &DatasetSpec,
    plan: &ReplicationPlan,
) -> DatasetReport {
    let alias = spec.alias.as_str();
    let mut report = DatasetReport::new(alias);
    tracing::info!(alias, "starting dataset");

    // Fetching: materialize the source result. Nothing downstream can
    // run without it.
    let batch = match source.fetch(&spec.source_query).await {
        Ok(batch) => {
            report.stage_ok(Stage::Fetching, format!("{} rows", batch.num_rows()));
            batch
        }
        Err(e) => {
            let err = StageError::SourceQuery(format!("{e:#}"));
            tracing::error!(alias, %err, "source query failed");
            report.abort(Stage::Fetching, &err);
            return report;
        }
    };

    // Resolving: the mapping feeds every remaining stage.
    let mapping = match resolve_table(alias, plan.table_overrides.get(alias)) {
        Ok(mapping) => {
            report.stage_ok(Stage::Resolving, mapping.to_string());
            report.mapping = Some(mapping.clone());
            mapping
        }
        Err(err) => {
            tracing::error!(alias, %err, "table resolution failed");
            report.abort(Stage::Resolving, &err);
            return report;
        }
    };

    // Schema ensure is best effort; if the schema truly is missing the
    // load will fail on its own terms.
    match dest.ensure_schema(&mapping.schema).await {
        Ok(()) => report.stage_ok(Stage::EnsuringSchema, mapping.schema.clone()),
        Err(e) => {
            let err = StageError::SchemaEnsure(format!("{e:#}"));
            tracing::warn!(alias, %err, "schema ensure failed");
            report.stage_warn(Stage::EnsuringSchema, &err);
        }
    }

    // Replacing: best-effort delete. A failure here is tolerated so a
    // first-time load against a missing table can still proceed.
    match dest.delete_rows(&mapping, plan.predicates.get(alias)).await {
        Ok(deleted) => {
            report.stage_ok(Stage::Replacing, format!("{deleted} rows deleted"));
        }
        Err(e) => {
            let err = StageError::Replacement(format!("{e:#}"));
            tracing::warn!(alias, table = %mapping, %err, "replace delete failed");
            report.stage_warn(Stage::Replacing, &err);
        }
    }

    // Loading: hard dependency for everything downstream.
    match dest.append_batch(&mapping, &batch).await {
        Ok(rows) => {
            report.rows_loaded = rows;
            report.stage_ok(Stage::Loading, format!("{rows} rows loaded"));
        }
        Err(e) => {
            let err = StageError::Load(format!("{e:#}"));
            tracing::error!(alias, table = %mapping, %err, "bulk load failed");
            report.abort(Stage::Loading, &err);
            return report;
        }
    }

    // Indexing: per-column, independently attempted.
    if let Some(columns) = plan.index_columns.get(alias) {
        let mut failed = Vec::new();
        for column in columns {
            if let Err(e) = dest.create_index(&mapping, column).await {
                tracing::warn!(alias, column, err = format!("{e:#}"), "index creation failed");
                failed.push(format!("{column}: {e:#}"));
            }
        }
        if failed.is_empty() {
            report.stage_ok(Stage::Indexing, format!("{} indexes ensured", columns.len()));
        } else {
            let err = StageError::Index(failed.join("; "));
            report.stage_warn(Stage::Indexing, &err);
        }
    }

    // Refreshing: terminal stage, nothing depends on it.
    match dest.refresh_statistics(&mapping).await {
        Ok(()) => report.stage_ok(Stage::Refreshing, "statistics refreshed"),
        Err(e) => {
            let err = StageError::Statistics(format!("{e:#}"));
            tracing::warn!(alias, table = %mapping, %err, "statistics refresh failed");
            report.stage_warn(Stage::Refreshing, &err);
        }
    }

    report
}
