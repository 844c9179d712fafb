//! Workspace environment model: recipe, machines, servers and volumes.
//!
//! Pure data plus accessors. Target-specific environments (Docker,
//! Kubernetes) live in their own modules and embed the same recipe, machine
//! map and warning list.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use che_common::Warning;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::domain::error::InfrastructureError;
use crate::domain::memory::parse_memory_size;

/// Machine attribute carrying the memory limit in bytes.
pub const MEMORY_LIMIT_ATTRIBUTE: &str = "memoryLimitBytes";

/// Server attribute marking a server reachable only from inside the workspace.
pub const INTERNAL_SERVER_ATTRIBUTE: &str = "internal";

/// Server attribute marking a server that must sit behind authentication.
pub const SECURE_SERVER_ATTRIBUTE: &str = "secure";

// ── Recipe ───────────────────────────────────────────────────────────────────

/// Recipe formats the runtime understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecipeType {
    DockerImage,
    Dockerfile,
    Compose,
    Kubernetes,
    OpenShift,
}

impl RecipeType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DockerImage => "dockerimage",
            Self::Dockerfile => "dockerfile",
            Self::Compose => "compose",
            Self::Kubernetes => "kubernetes",
            Self::OpenShift => "openshift",
        }
    }

    /// Comma-separated list used in "supported types" error messages.
    #[must_use]
    pub fn describe(types: &[RecipeType]) -> String {
        types
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for RecipeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipeType {
    type Err = InfrastructureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dockerimage" => Ok(Self::DockerImage),
            "dockerfile" => Ok(Self::Dockerfile),
            "compose" => Ok(Self::Compose),
            "kubernetes" => Ok(Self::Kubernetes),
            "openshift" => Ok(Self::OpenShift),
            other => Err(InfrastructureError::UnsupportedRecipeType {
                recipe_type: other.to_string(),
                supported: RecipeType::describe(&[
                    Self::DockerImage,
                    Self::Dockerfile,
                    Self::Compose,
                    Self::Kubernetes,
                    Self::OpenShift,
                ]),
            }),
        }
    }
}

/// The declarative recipe exactly as the user supplied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalRecipe {
    #[serde(rename = "type")]
    recipe_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    content: String,
}

impl InternalRecipe {
    pub fn new(
        recipe_type: impl Into<String>,
        content_type: Option<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            recipe_type: recipe_type.into(),
            content_type,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn recipe_type(&self) -> &str {
        &self.recipe_type
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Ensure the recipe type is one of `supported`.
    ///
    /// # Errors
    ///
    /// Returns [`InfrastructureError::UnsupportedRecipeType`] naming the
    /// offending type and the accepted ones.
    pub fn require_type(&self, supported: &[RecipeType]) -> Result<RecipeType, InfrastructureError> {
        let unsupported = || InfrastructureError::UnsupportedRecipeType {
            recipe_type: self.recipe_type.clone(),
            supported: RecipeType::describe(supported),
        };
        let parsed: RecipeType = self.recipe_type.parse().map_err(|_| unsupported())?;
        if supported.contains(&parsed) {
            Ok(parsed)
        } else {
            Err(unsupported())
        }
    }
}

// ── Machines and servers ─────────────────────────────────────────────────────

/// A network endpoint inside a machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// `"8080"` or `"8080/tcp"`.
    pub port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl ServerConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.attributes
            .get(INTERNAL_SERVER_ATTRIBUTE)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.attributes
            .get(SECURE_SERVER_ATTRIBUTE)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Numeric part of `port`.
    ///
    /// # Errors
    ///
    /// Returns [`InfrastructureError::InvalidServerPort`] when the port is not
    /// a number in `1..=65535`.
    pub fn port_number(&self, server_name: &str) -> Result<u16, InfrastructureError> {
        let number = self.port.split('/').next().unwrap_or_default();
        match number.parse::<u16>() {
            Ok(port) if port > 0 => Ok(port),
            _ => Err(InfrastructureError::InvalidServerPort {
                server: server_name.to_string(),
                port: self.port.clone(),
            }),
        }
    }

    /// Transport protocol from `port` (`"8080/udp"`), `tcp` when absent.
    #[must_use]
    pub fn port_protocol(&self) -> &str {
        self.port.split_once('/').map_or("tcp", |(_, proto)| proto)
    }
}

/// A named logical volume mounted into a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub path: String,
}

/// Logical unit of a workspace. Servers and volumes keep the order they
/// were declared in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    #[serde(default)]
    pub servers: IndexMap<String, ServerConfig>,
    #[serde(default)]
    pub volumes: IndexMap<String, VolumeConfig>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl MachineConfig {
    /// Memory limit from the `memoryLimitBytes` attribute, if present.
    ///
    /// # Errors
    ///
    /// Returns [`InfrastructureError::InvalidMemoryLimit`] when the attribute
    /// holds an unparseable value.
    pub fn memory_limit_bytes(&self) -> Result<Option<u64>, InfrastructureError> {
        self.attributes
            .get(MEMORY_LIMIT_ATTRIBUTE)
            .map(String::as_str)
            .map(parse_memory_size)
            .transpose()
    }
}

// ── Environments ─────────────────────────────────────────────────────────────

/// Who a runtime belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeIdentity {
    pub workspace_id: String,
    pub env_name: String,
    pub owner_id: String,
}

impl RuntimeIdentity {
    pub fn new(
        workspace_id: impl Into<String>,
        env_name: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            env_name: env_name.into(),
            owner_id: owner_id.into(),
        }
    }
}

/// Recipe plus machine declarations, before any target-specific conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalEnvironment {
    pub recipe: InternalRecipe,
    #[serde(default)]
    pub machines: BTreeMap<String, MachineConfig>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl InternalEnvironment {
    pub fn new(recipe: InternalRecipe, machines: BTreeMap<String, MachineConfig>) -> Self {
        Self {
            recipe,
            machines,
            warnings: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// The single machine of a one-machine recipe.
    ///
    /// # Errors
    ///
    /// [`InfrastructureError::NoMachines`] when empty,
    /// [`InfrastructureError::MultipleMachines`] listing every name after the
    /// first otherwise.
    pub fn single_machine(&self) -> Result<(&String, &MachineConfig), InfrastructureError> {
        let mut machines = self.machines.iter();
        let first = machines.next().ok_or(InfrastructureError::NoMachines)?;
        let extra: Vec<String> = machines.map(|(name, _)| name.clone()).collect();
        if !extra.is_empty() {
            return Err(InfrastructureError::MultipleMachines {
                recipe_type: self.recipe.recipe_type().to_string(),
                extra,
            });
        }
        Ok(first)
    }
}

/// Accessors shared by every target environment so provisioners that only
/// touch machines or warnings work on all of them.
pub trait RuntimeEnvironment {
    fn recipe(&self) -> &InternalRecipe;
    fn machines(&self) -> &BTreeMap<String, MachineConfig>;
    fn warnings(&self) -> &[Warning];
    fn add_warning(&mut self, warning: Warning);
}

/// Environments whose containers carry environment variables.
pub trait ContainerEnvironment: RuntimeEnvironment {
    /// Variable maps of every container.
    fn container_envs_mut(&mut self) -> Vec<&mut BTreeMap<String, String>>;
}

impl RuntimeEnvironment for InternalEnvironment {
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
