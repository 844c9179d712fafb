//! Converters producing Kubernetes environments.

use crate::application::ports::EnvironmentConverter;
use crate::domain::kubernetes::{
    DEFAULT_RESTART_POLICY, machine_name as machine_name_of, machine_name_annotation,
};
use crate::domain::{
    Container, ContainerPort, DockerContainerConfig, DockerEnvironment, InfrastructureError,
    InternalEnvironment, KubernetesEnvironment, ObjectMeta, Pod, PodSpec, RecipeType,
    ServerConfig, dns_label,
};

/// Runs a `dockerimage` recipe as a single-container pod.
#[derive(Debug, Default, Clone, Copy)]
pub struct KubernetesDockerImageConverter;

impl EnvironmentConverter<InternalEnvironment, KubernetesEnvironment>
    for KubernetesDockerImageConverter
{
    fn convert(
        &self,
        source: &InternalEnvironment,
    ) -> Result<KubernetesEnvironment, InfrastructureError> {
        source.recipe.require_type(&[RecipeType::DockerImage])?;
        let (machine_name, machine) = source.single_machine()?;

        let container = Container {
            name: dns_label(machine_name),
            image: source.recipe.content().to_string(),
            env: machine.env.clone(),
            ..Container::default()
        };
        let pod = machine_pod(machine_name, container, Some(DEFAULT_RESTART_POLICY.to_string()));

        let mut env = KubernetesEnvironment::new(source.recipe.clone(), source.machines.clone());
        env.warnings.clone_from(&source.warnings);
        env.pods.insert(pod.metadata.name.clone(), pod);
        env.validate()?;
        Ok(env)
    }
}

/// One pod per Docker container. Containers that must be built from a
/// Dockerfile cannot run on Kubernetes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerToKubernetesConverter;

impl EnvironmentConverter<DockerEnvironment, KubernetesEnvironment>
    for DockerToKubernetesConverter
{
    fn convert(
        &self,
        source: &DockerEnvironment,
    ) -> Result<KubernetesEnvironment, InfrastructureError> {
        source.validate()?;

        let mut env = KubernetesEnvironment::new(source.recipe.clone(), source.machines.clone());
        env.warnings.clone_from(&source.warnings);

        for (machine_name, docker) in &source.containers {
            let container = Container {
                name: dns_label(machine_name),
                image: image_of(machine_name, docker)?,
                env: docker.environment.clone(),
                ports: container_ports(machine_name, &docker.expose)?,
                memory_limit: docker.mem_limit,
            };
            let restart = pod_restart_policy(machine_name, docker.restart.as_deref())?;
            let pod = machine_pod(machine_name, container, Some(restart.to_string()));
            insert_pod(&mut env, machine_name, pod)?;
        }
        env.validate()?;
        Ok(env)
    }
}

/// Machine names are sanitised into pod names, so two machines can land on
/// the same one.
fn insert_pod(
    env: &mut KubernetesEnvironment,
    machine_name: &str,
    pod: Pod,
) -> Result<(), InfrastructureError> {
    let name = pod.metadata.name.clone();
    if let Some(existing) = env.pods.get(&name) {
        let first = existing
            .spec
            .containers
            .iter()
            .find_map(|c| machine_name_of(existing, &c.name))
            .unwrap_or(name.as_str());
        return Err(InfrastructureError::NameCollision {
            first: first.to_string(),
            second: machine_name.to_string(),
            name,
        });
    }
    env.pods.insert(name, pod);
    Ok(())
}

fn machine_pod(machine_name: &str, container: Container, restart_policy: Option<String>) -> Pod {
    let mut metadata = ObjectMeta::named(dns_label(machine_name));
    metadata.annotations.insert(
        machine_name_annotation(&container.name),
        machine_name.to_string(),
    );
    Pod {
        metadata,
        spec: PodSpec {
            containers: vec![container],
            restart_policy,
        },
    }
}

fn image_of(machine: &str, docker: &DockerContainerConfig) -> Result<String, InfrastructureError> {
    if docker.build.is_some() {
        return Err(InfrastructureError::InvalidRecipe(format!(
            "Machine '{machine}' is built from a Dockerfile, which is not supported on Kubernetes"
        )));
    }
    docker.image.clone().ok_or_else(|| {
        InfrastructureError::InvalidRecipe(format!("Machine '{machine}' declares no image"))
    })
}

fn container_ports(
    machine: &str,
    expose: &[String],
) -> Result<Vec<ContainerPort>, InfrastructureError> {
    let mut ports: Vec<ContainerPort> = Vec::with_capacity(expose.len());
    for entry in expose {
        let spec = ServerConfig::new(entry.as_str());
        let port = ContainerPort {
            container_port: spec.port_number(machine)?,
            protocol: spec.port_protocol().to_ascii_uppercase(),
        };
        if !ports.contains(&port) {
            ports.push(port);
        }
    }
    Ok(ports)
}

/// Docker restart policy → pod restart policy.
fn pod_restart_policy(machine: &str, docker: Option<&str>) -> Result<&'static str, InfrastructureError> {
    match docker {
        None | Some("no") => Ok("Never"),
        Some("always" | "unless-stopped") => Ok("Always"),
        Some(policy) if policy == "on-failure" || policy.starts_with("on-failure:") => {
            Ok("OnFailure")
        }
        Some(other) => Err(InfrastructureError::InvalidRecipe(format!(
            "Machine '{machine}' has unsupported restart policy '{other}'"
        ))),
    }
}

/// Picks the Docker converter matching the recipe type.
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerEnvironmentConverter;

impl EnvironmentConverter<InternalEnvironment, DockerEnvironment> for DockerEnvironmentConverter {
    fn convert(&self, source: &InternalEnvironment) -> Result<DockerEnvironment, InfrastructureError> {
        use super::{ComposeConverter, DockerImageConverter, DockerfileConverter};

        match source.recipe.require_type(&[
            RecipeType::DockerImage,
            RecipeType::Dockerfile,
            RecipeType::Compose,
        ])? {
            RecipeType::DockerImage => DockerImageConverter.convert(source),
            RecipeType::Dockerfile => DockerfileConverter.convert(source),
            _ => ComposeConverter.convert(source),
        }
    }
}

/// Picks the Kubernetes conversion path matching the recipe type. Compose
/// recipes go through the Docker model first.
#[derive(Debug, Default, Clone, Copy)]
pub struct KubernetesEnvironmentConverter;

impl EnvironmentConverter<InternalEnvironment, KubernetesEnvironment>
    for KubernetesEnvironmentConverter
{
    fn convert(
        &self,
        source: &InternalEnvironment,
    ) -> Result<KubernetesEnvironment, InfrastructureError> {
        match source.recipe.require_type(&[
            RecipeType::DockerImage,
            RecipeType::Dockerfile,
            RecipeType::Compose,
        ])? {
            RecipeType::DockerImage => KubernetesDockerImageConverter.convert(source),
            _ => {
                let docker = DockerEnvironmentConverter.convert(source)?;
                DockerToKubernetesConverter.convert(&docker)
            }
        }
    }
}
