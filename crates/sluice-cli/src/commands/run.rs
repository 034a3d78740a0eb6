use std::path::Path;

use anyhow::{Context, Result};

use sluice_engine::config;
use sluice_engine::{run_replication, PostgresDestination, PostgresSource};
use sluice_types::{DatasetOutcome, DatasetReport, RunReport};

/// Execute the `run` command: parse the plan, connect both sides, and
/// drive the full dataset schedule.
pub async fn execute(plan_path: &Path, json: bool) -> Result<()> {
    let plan_file = config::parse_plan(plan_path)
        .with_context(|| format!("Failed to parse plan: {}", plan_path.display()))?;
    let plan = plan_file.replication_plan();

    tracing::info!(
        plan = plan_file.plan,
        source = plan_file.source.endpoint(),
        destination = plan_file.destination.endpoint(),
        datasets = plan.datasets.len(),
        "Plan parsed"
    );

    let source = PostgresSource::connect(&plan_file.source).await?;
    let destination = PostgresDestination::connect(&plan_file.destination).await?;

    let report = run_replication(&source, &destination, &plan).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&plan_file.plan, &report);
    }

    if report.any_aborted() {
        anyhow::bail!(
            "{} of {} dataset(s) aborted",
            report.aborted(),
            report.datasets.len()
        );
    }
    Ok(())
}

fn print_report(plan_name: &str, report: &RunReport) {
    for dataset in &report.datasets {
        print_dataset(dataset);
    }

    println!("Plan '{}' finished.", plan_name);
    println!("  Datasets completed: {}", report.completed());
    println!("  Datasets aborted:   {}", report.aborted());
    println!("  Rows loaded:        {}", report.rows_loaded());
}

fn print_dataset(dataset: &DatasetReport) {
    match &dataset.mapping {
        Some(mapping) => println!("{} -> {}", dataset.alias, mapping),
        None => println!("{}", dataset.alias),
    }
    for stage in &dataset.stages {
        let detail = stage.detail.as_deref().unwrap_or("");
        println!("  {:16} {:5} {}", stage.stage.to_string(), stage.status.to_string(), detail);
    }
    if let DatasetOutcome::Aborted { stage, reason } = &dataset.outcome {
        println!("  aborted during {stage}: {reason}");
    }
}
