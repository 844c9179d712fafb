//! Docker provisioners: master host mapping, master network, volumes, servers.

use crate::application::ports::ConfigurationProvisioner;
use crate::domain::servers::server_labels;
use crate::domain::{
    DockerEnvironment, InfrastructureError, RuntimeIdentity, push_unique, volume_binding,
    volume_name,
};

/// Host alias under which workspace containers reach the che master.
pub const CHE_HOST_ALIAS: &str = "che-host";

/// Adds the `che-host:<ip>` mapping to every container.
#[derive(Debug, Clone)]
pub struct CheMasterExtraHostProvisioner {
    extra_host: String,
}

impl CheMasterExtraHostProvisioner {
    pub fn new(che_host_ip: &str) -> Self {
        Self {
            extra_host: format!("{CHE_HOST_ALIAS}:{che_host_ip}"),
        }
    }

    #[must_use]
    pub fn extra_host(&self) -> &str {
        &self.extra_host
    }
}

impl ConfigurationProvisioner<DockerEnvironment> for CheMasterExtraHostProvisioner {
    fn provision(
        &self,
        env: &mut DockerEnvironment,
        _identity: &RuntimeIdentity,
    ) -> Result<(), InfrastructureError> {
        for container in env.containers.values_mut() {
            push_unique(&mut container.extra_hosts, self.extra_host.as_str());
        }
        Ok(())
    }
}

/// Joins every container to the che master network, when one is configured.
#[derive(Debug, Clone)]
pub struct CheMasterNetworkProvisioner {
    network: Option<String>,
}

impl CheMasterNetworkProvisioner {
    pub fn new(network: Option<String>) -> Self {
        Self { network }
    }
}

impl ConfigurationProvisioner<DockerEnvironment> for CheMasterNetworkProvisioner {
    fn provision(
        &self,
        env: &mut DockerEnvironment,
        _identity: &RuntimeIdentity,
    ) -> Result<(), InfrastructureError> {
        let Some(network) = &self.network else {
            return Ok(());
        };
        for container in env.containers.values_mut() {
            push_unique(&mut container.networks, network.as_str());
        }
        Ok(())
    }
}

/// Binds each machine's logical volumes to workspace-scoped Docker volumes.
///
/// Machines declaring the same logical name share one generated volume.
#[derive(Debug, Default, Clone, Copy)]
pub struct VolumesConverter;

impl ConfigurationProvisioner<DockerEnvironment> for VolumesConverter {
    fn provision(
        &self,
        env: &mut DockerEnvironment,
        identity: &RuntimeIdentity,
    ) -> Result<(), InfrastructureError> {
        let DockerEnvironment {
            machines,
            containers,
            ..
        } = env;
        for (machine_name, machine) in machines.iter() {
            if machine.volumes.is_empty() {
                continue;
            }
            let container = containers.get_mut(machine_name).ok_or_else(|| {
                InfrastructureError::MissingContainer {
                    machine: machine_name.clone(),
                }
            })?;
            for (name, volume) in &machine.volumes {
                let generated = volume_name(&identity.workspace_id, name)?;
                push_unique(&mut container.volumes, volume_binding(&generated, &volume.path));
            }
        }
        Ok(())
    }
}

/// Publishes machine servers on their containers: exposed ports plus
/// discovery labels.
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerServersConverter;

impl ConfigurationProvisioner<DockerEnvironment> for DockerServersConverter {
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
            if machine.servers.is_empty() {
                continue;
            }
            let container = containers.get_mut(machine_name).ok_or_else(|| {
                InfrastructureError::MissingContainer {
                    machine: machine_name.clone(),
                }
            })?;
            for (server_name, server) in &machine.servers {
                let port = server.port_number(server_name)?;
                push_unique(
                    &mut container.expose,
                    format!("{port}/{}", server.port_protocol()),
                );
                let labels = server_labels(server_name, server).map_err(|e| {
                    InfrastructureError::InvalidRecipe(format!(
                        "Server '{server_name}' attributes cannot be encoded: {e}"
                    ))
                })?;
                container.labels.extend(labels);
            }
        }
        Ok(())
    }
}
