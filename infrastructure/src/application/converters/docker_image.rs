//! Single-machine converters for `dockerimage` and `dockerfile` recipes.

use std::collections::BTreeMap;

use crate::application::ports::EnvironmentConverter;
use crate::domain::{
    DockerBuildContext, DockerContainerConfig, DockerEnvironment, InfrastructureError,
    InternalEnvironment, RecipeType,
};

/// Runs the recipe content as the image of the only machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerImageConverter;

impl EnvironmentConverter<InternalEnvironment, DockerEnvironment> for DockerImageConverter {
    fn convert(&self, source: &InternalEnvironment) -> Result<DockerEnvironment, InfrastructureError> {
        source.recipe.require_type(&[RecipeType::DockerImage])?;
        let (machine_name, machine) = source.single_machine()?;

        let container = DockerContainerConfig {
            image: Some(source.recipe.content().to_string()),
            environment: machine.env.clone(),
            ..DockerContainerConfig::default()
        };
        Ok(single_container_environment(source, machine_name, container))
    }
}

/// Builds the only machine from the Dockerfile in the recipe content.
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerfileConverter;

impl EnvironmentConverter<InternalEnvironment, DockerEnvironment> for DockerfileConverter {
    fn convert(&self, source: &InternalEnvironment) -> Result<DockerEnvironment, InfrastructureError> {
        source.recipe.require_type(&[RecipeType::Dockerfile])?;
        let (machine_name, machine) = source.single_machine()?;

        let container = DockerContainerConfig {
            build: Some(DockerBuildContext {
                dockerfile_content: Some(source.recipe.content().to_string()),
                ..DockerBuildContext::default()
            }),
            environment: machine.env.clone(),
            ..DockerContainerConfig::default()
        };
        Ok(single_container_environment(source, machine_name, container))
    }
}

fn single_container_environment(
    source: &InternalEnvironment,
    machine_name: &str,
    container: DockerContainerConfig,
) -> DockerEnvironment {
    DockerEnvironment {
        recipe: source.recipe.clone(),
        machines: source.machines.clone(),
        warnings: source.warnings.clone(),
        containers: BTreeMap::from([(machine_name.to_string(), container)]),
        network: None,
    }
}
