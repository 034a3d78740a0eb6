use std::path::Path;

use anyhow::{Context, Result};

use sluice_engine::config;
use sluice_engine::{PostgresDestination, PostgresSource};

/// Execute the `check` command: validate the plan file and probe both
/// connections.
pub async fn execute(plan_path: &Path) -> Result<()> {
    let plan_file = config::parse_plan(plan_path)
        .with_context(|| format!("Failed to parse plan: {}", plan_path.display()))?;
    println!("Plan structure: OK ({} dataset(s))", plan_file.datasets.len());

    let source_ok = match probe_source(&plan_file).await {
        Ok(()) => {
            println!("Source:        OK ({})", plan_file.source.endpoint());
            true
        }
        Err(e) => {
            println!("Source:        FAILED\n  {e:#}");
            false
        }
    };

    let dest_ok = match probe_destination(&plan_file).await {
        Ok(()) => {
            println!("Destination:   OK ({})", plan_file.destination.endpoint());
            true
        }
        Err(e) => {
            println!("Destination:   FAILED\n  {e:#}");
            false
        }
    };

    if source_ok && dest_ok {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}

async fn probe_source(plan_file: &config::PlanFile) -> Result<()> {
    PostgresSource::connect(&plan_file.source).await?.ping().await
}

async fn probe_destination(plan_file: &config::PlanFile) -> Result<()> {
    PostgresDestination::connect(&plan_file.destination)
        .await?
        .ping()
        .await
}
