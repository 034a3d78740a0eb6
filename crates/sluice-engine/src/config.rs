//! Plan YAML parsing with environment variable substitution.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use sluice_types::{DatasetSpec, ReplacementPredicate, ReplicationPlan, TableMapping};

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error if any referenced environment variable is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let mut missing = Vec::new();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => {
                missing.push(var_name.to_string());
            }
        }
    }

    if !missing.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }

    Ok(result)
}

/// Connection parameters for one side of the replication.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
}

fn default_port() -> u16 {
    5432
}

impl ConnectionConfig {
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            self.host, self.port, self.user, self.password, self.database
        )
    }

    /// Endpoint label for logs and check output, without credentials.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// One dataset entry in the plan file.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetEntry {
    pub alias: String,
    pub query: String,
    /// Explicit destination override; otherwise the alias is split.
    #[serde(default)]
    pub table: Option<TableMapping>,
    /// Scope the replace to `column = value` instead of the whole table.
    #[serde(default)]
    pub replace_where: Option<ReplacementPredicate>,
    /// Columns to provision single-column indexes for, in order.
    #[serde(default)]
    pub indexes: Vec<String>,
}

/// Parsed plan file: connections plus the dataset schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanFile {
    pub plan: String,
    pub source: ConnectionConfig,
    pub destination: ConnectionConfig,
    pub datasets: Vec<DatasetEntry>,
}

impl PlanFile {
    /// Flatten the per-dataset entries into the orchestrator's plan:
    /// datasets in file order plus the alias-keyed override maps.
    #[must_use]
    pub fn replication_plan(&self) -> ReplicationPlan {
        let mut table_overrides = HashMap::new();
        let mut predicates = HashMap::new();
        let mut index_columns = HashMap::new();
        let mut datasets = Vec::with_capacity(self.datasets.len());

        for entry in &self.datasets {
            datasets.push(DatasetSpec::new(&entry.alias, &entry.query));
            if let Some(table) = &entry.table {
                table_overrides.insert(entry.alias.clone(), table.clone());
            }
            if let Some(predicate) = &entry.replace_where {
                predicates.insert(entry.alias.clone(), predicate.clone());
            }
            if !entry.indexes.is_empty() {
                index_columns.insert(entry.alias.clone(), entry.indexes.clone());
            }
        }

        ReplicationPlan {
            datasets,
            table_overrides,
            predicates,
            index_columns,
        }
    }
}

/// Parse a plan YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_plan_str(yaml_str: &str) -> Result<PlanFile> {
    let substituted = substitute_env_vars(yaml_str)?;
    let plan: PlanFile = serde_yaml::from_str(&substituted).context("Failed to parse plan YAML")?;
    Ok(plan)
}

/// Parse a plan YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_plan(path: &Path) -> Result<PlanFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file: {}", path.display()))?;
    parse_plan_str(&content)
}
