use crate::application::ports::ConfigurationProvisioner;
use crate::domain::{DockerEnvironment, InfrastructureError, KubernetesEnvironment, RuntimeIdentity};

/// Applies each machine's `memoryLimitBytes` attribute to its container when
/// the container does not set a limit of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryLimitProvisioner;

impl ConfigurationProvisioner<DockerEnvironment> for MemoryLimitProvisioner {
    fn provision(
        &self,
        env: &mut DockerEnvironment,
        _identity: &RuntimeIdentity,
    ) -> Result<(), InfrastructureError> {
        let DockerEnvironment {
            machines,
            containers,
            ..
        } = env;
        for (machine_name, machine) in machines.iter() {
            let Some(limit) = machine.memory_limit_bytes()? else {
                continue;
            };
            let container = containers.get_mut(machine_name).ok_or_else(|| {
                InfrastructureError::MissingContainer {
                    machine: machine_name.clone(),
                }
            })?;
            container.mem_limit.get_or_insert(limit);
        }
        Ok(())
    }
}

impl ConfigurationProvisioner<KubernetesEnvironment> for MemoryLimitProvisioner {
    fn provision(
        &self,
        env: &mut KubernetesEnvironment,
        _identity: &RuntimeIdentity,
    ) -> Result<(), InfrastructureError> {
        let index = env.container_index();
        for (machine_name, machine) in &env.machines {
            let Some(limit) = machine.memory_limit_bytes()? else {
                continue;
            };
            let location =
                index
                    .get(machine_name)
                    .ok_or_else(|| InfrastructureError::MissingContainer {
                        machine: machine_name.clone(),
                    })?;
            let container = env
                .pods
                .get_mut(&location.pod)
                .and_then(|pod| {
                    pod.spec
                        .containers
                        .iter_mut()
                        .find(|c| c.name == location.container)
                })
                .ok_or_else(|| InfrastructureError::MissingContainer {
                    machine: machine_name.clone(),
                })?;
            container.memory_limit.get_or_insert(limit);
        }
        Ok(())
    }
}
