//! Loading of `InfraConfig` from `CHE_*` variables and of the replication
//! config from its YAML file.

use std::path::Path;

use anyhow::{Context, Result};
use che_common::ReplicationConfig;

use crate::domain::InfraConfig;

const ENV_PREFIX: &str = "CHE_";

/// Read `InfraConfig` from the process environment.
pub fn load_infra_config() -> Result<InfraConfig> {
    envy::prefixed(ENV_PREFIX)
        .from_env()
        .context("failed to load config from CHE_* env vars")
}

/// Read `InfraConfig` from explicit `(name, value)` pairs.
pub fn infra_config_from_vars<I>(vars: I) -> Result<InfraConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    envy::prefixed(ENV_PREFIX)
        .from_iter(vars)
        .context("failed to load config from CHE_* variables")
}

/// Read the replication config. A missing file yields the defaults.
pub fn load_replication_config(path: &Path) -> Result<ReplicationConfig> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "replication config not found, using defaults");
        return Ok(ReplicationConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
}
