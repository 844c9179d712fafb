//! Multi-machine converter for compose recipes.

use std::collections::BTreeMap;

use che_common::{Warning, warning_codes};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::application::ports::EnvironmentConverter;
use crate::domain::environment::MEMORY_LIMIT_ATTRIBUTE;
use crate::domain::{
    DockerContainerConfig, DockerEnvironment, InfrastructureError, InternalEnvironment, RecipeType,
    mem_limit_from_yaml,
};

/// The subset of a compose file the runtime reads. Services stay raw until
/// `mem_limit` has been taken out and normalised.
#[derive(Debug, Deserialize)]
struct ComposeRecipe {
    #[serde(default)]
    services: BTreeMap<String, Mapping>,
}

fn service_config(
    name: &str,
    mut raw: Mapping,
) -> Result<DockerContainerConfig, InfrastructureError> {
    let mem_limit = match raw.remove("mem_limit") {
        Some(value) => mem_limit_from_yaml(&value)?,
        None => None,
    };
    let mut config: DockerContainerConfig =
        serde_yaml::from_value(Value::Mapping(raw)).map_err(|e| {
            InfrastructureError::InvalidRecipe(format!(
                "Parsing of compose service '{name}' failed. {e}"
            ))
        })?;
    config.mem_limit = mem_limit;
    Ok(config)
}

/// One container per compose service, keyed by service name.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComposeConverter;

impl EnvironmentConverter<InternalEnvironment, DockerEnvironment> for ComposeConverter {
    fn convert(&self, source: &InternalEnvironment) -> Result<DockerEnvironment, InfrastructureError> {
        source.recipe.require_type(&[RecipeType::Compose])?;
        if source.machines.is_empty() {
            return Err(InfrastructureError::NoMachines);
        }

        let recipe: ComposeRecipe = serde_yaml::from_str(source.recipe.content()).map_err(|e| {
            InfrastructureError::InvalidRecipe(format!(
                "Parsing of compose environment failed. {e}"
            ))
        })?;

        let mut machines = source.machines.clone();
        let mut warnings = source.warnings.clone();
        let mut containers = recipe
            .services
            .into_iter()
            .map(|(name, raw)| service_config(&name, raw).map(|config| (name, config)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        for (name, machine) in &mut machines {
            let container =
                containers
                    .get_mut(name)
                    .ok_or_else(|| InfrastructureError::MissingContainer {
                        machine: name.clone(),
                    })?;
            for (key, value) in &machine.env {
                container.environment.insert(key.clone(), value.clone());
            }
            if let Some(limit) = container.mem_limit {
                machine
                    .attributes
                    .entry(MEMORY_LIMIT_ATTRIBUTE.to_string())
                    .or_insert_with(|| limit.to_string());
            }
        }

        for service in containers.keys().filter(|s| !machines.contains_key(*s)) {
            tracing::debug!(service = %service, "compose service has no machine configuration");
            warnings.push(Warning::new(
                warning_codes::UNUSED_COMPOSE_SERVICE,
                format!("Compose service '{service}' has no machine configuration and runs with defaults"),
            ));
        }

        Ok(DockerEnvironment {
            recipe: source.recipe.clone(),
            machines,
            warnings,
            containers,
            network: None,
        })
    }
}
