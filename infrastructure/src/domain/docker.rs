//! Docker target environment: one container per machine.

use std::collections::BTreeMap;

use che_common::Warning;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::environment::{
    ContainerEnvironment, InternalRecipe, MachineConfig, RuntimeEnvironment,
};
use crate::domain::error::InfrastructureError;
use crate::domain::memory::deserialize_mem_limit;

/// Build instructions for a container created from a Dockerfile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerBuildContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile_content: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, String>,
}

/// Low-level container specification. Field names follow compose so a compose
/// service deserializes straight into it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerContainerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<DockerBuildContext>,
    #[serde(
        deserialize_with = "deserialize_environment",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expose: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_hosts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(
        deserialize_with = "deserialize_mem_limit",
        skip_serializing_if = "Option::is_none"
    )]
    pub mem_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
    #[serde(
        deserialize_with = "deserialize_command",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub command: Vec<String>,
    #[serde(
        deserialize_with = "deserialize_command",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub entrypoint: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

/// Compose allows `command: sleep infinity` as well as a list.
fn deserialize_command<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::One(line) => line.split_whitespace().map(str::to_string).collect(),
        StringOrList::Many(items) => items,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EnvironmentSpec {
    Map(BTreeMap<String, Scalar>),
    List(Vec<String>),
}

/// Compose allows `environment` as a map or as a list of `KEY=VALUE`.
fn deserialize_environment<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match EnvironmentSpec::deserialize(deserializer)? {
        EnvironmentSpec::Map(map) => map
            .into_iter()
            .map(|(k, v)| (k, v.into_string()))
            .collect(),
        EnvironmentSpec::List(items) => items
            .into_iter()
            .map(|item| match item.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (item, String::new()),
            })
            .collect(),
    })
}

/// Append `value` unless already present. Lists such as extra hosts and
/// networks behave as sets so provisioners can run more than once.
pub fn push_unique(list: &mut Vec<String>, value: impl Into<String>) -> bool {
    let value = value.into();
    if list.contains(&value) {
        false
    } else {
        list.push(value);
        true
    }
}

/// Containers keyed by machine name plus the carried-over recipe and machines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerEnvironment {
    pub recipe: InternalRecipe,
    pub machines: BTreeMap<String, MachineConfig>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
    pub containers: BTreeMap<String, DockerContainerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

impl DockerEnvironment {
    /// Container of `machine`.
    ///
    /// # Errors
    ///
    /// Returns [`InfrastructureError::MissingContainer`] when the environment
    /// has no container for the machine.
    pub fn container_mut(
        &mut self,
        machine: &str,
    ) -> Result<&mut DockerContainerConfig, InfrastructureError> {
        self.containers
            .get_mut(machine)
            .ok_or_else(|| InfrastructureError::MissingContainer {
                machine: machine.to_string(),
            })
    }

    /// Check that every machine has a container.
    ///
    /// # Errors
    ///
    /// Returns [`InfrastructureError::MissingContainer`] for the first machine
    /// without one.
    pub fn validate(&self) -> Result<(), InfrastructureError> {
        match self
            .machines
            .keys()
            .find(|name| !self.containers.contains_key(*name))
        {
            Some(machine) => Err(InfrastructureError::MissingContainer {
                machine: machine.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl RuntimeEnvironment for DockerEnvironment {
    fn recipe(&self) -> &InternalRecipe {
        &self.recipe
    }

    fn machines(&self) -> &BTreeMap<String, MachineConfig> {
        &self.machines
    }

    fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    fn add_warning(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }
}

impl ContainerEnvironment for DockerEnvironment {
    fn container_envs_mut(&mut self) -> Vec<&mut BTreeMap<String, String>> {
        self.containers
            .values_mut()
            .map(|container| &mut container.environment)
            .collect()
    }
}
