//! Server exposure for Kubernetes environments.
//!
//! Every machine with servers gets one service selecting its pod; the
//! service annotations are the discovery record for all of its servers.
//! External and secure servers additionally get objects reachable from
//! outside, produced by swappable strategies.

mod external;
mod secure;

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

pub use external::{ExternalExposureStrategy, IngressServerExposer, RouteServerExposer};
pub use secure::{
    DefaultSecureServerExposer, GATEWAY_CONFIG_LABEL, GATEWAY_CONFIG_MAP, GATEWAY_PORT,
    GATEWAY_SERVICE, GatewaySecureServerExposer, SecureExposerFactory, SecureExposureStrategy,
};

use crate::application::ports::{
    ConfigurationProvisioner, ExposureTarget, ExternalServerExposer, SecureServerExposer,
};
use crate::domain::kubernetes::{ORIGINAL_NAME_LABEL, machine_name as machine_of};
use crate::domain::servers::server_labels;
use crate::domain::{
    InfrastructureError, KubernetesEnvironment, ObjectMeta, RuntimeIdentity, ServerConfig,
    Service, ServicePort, dns_label,
};

/// Creates the objects that make one machine's servers reachable.
#[derive(Debug, Clone)]
pub struct KubernetesServerExposer<E, S> {
    external: E,
    secure: S,
}

impl<E: ExternalServerExposer, S: SecureServerExposer> KubernetesServerExposer<E, S> {
    pub fn new(external: E, secure: S) -> Self {
        Self { external, secure }
    }

    /// Expose `servers` of `machine_name`, which runs in pod `pod_name`.
    ///
    /// # Errors
    ///
    /// Returns [`InfrastructureError::MissingContainer`] when the pod does not
    /// exist, or an error for a server with an invalid port.
    pub fn expose(
        &self,
        env: &mut KubernetesEnvironment,
        workspace_id: &str,
        machine_name: &str,
        pod_name: &str,
        servers: &IndexMap<String, ServerConfig>,
    ) -> Result<(), InfrastructureError> {
        let pod = env
            .pods
            .get_mut(pod_name)
            .ok_or_else(|| InfrastructureError::MissingContainer {
                machine: machine_name.to_string(),
            })?;
        let selector_value = pod
            .metadata
            .labels
            .entry(ORIGINAL_NAME_LABEL.to_string())
            .or_insert_with(|| pod_name.to_string())
            .clone();

        let service_name = dns_label(machine_name);
        if let Some(existing) = env.services.get(&service_name) {
            let owner = existing.selector.get(ORIGINAL_NAME_LABEL);
            if owner != Some(&selector_value) {
                let first = env
                    .pods
                    .values()
                    .filter(|p| p.metadata.labels.get(ORIGINAL_NAME_LABEL) == owner)
                    .flat_map(|p| {
                        p.spec
                            .containers
                            .iter()
                            .filter_map(move |c| machine_of(p, &c.name))
                    })
                    .next()
                    .or(owner.map(String::as_str))
                    .unwrap_or(service_name.as_str())
                    .to_string();
                return Err(InfrastructureError::NameCollision {
                    first,
                    second: machine_name.to_string(),
                    name: service_name,
                });
            }
        }

        let mut ports = BTreeSet::new();
        let mut annotations = BTreeMap::new();
        for (server_name, server) in servers {
            ports.insert((server.port_number(server_name)?, server.port_protocol().to_ascii_uppercase()));
            annotations.extend(server_labels(server_name, server).map_err(|e| {
                InfrastructureError::InvalidRecipe(format!(
                    "Server '{server_name}' attributes cannot be encoded: {e}"
                ))
            })?);
        }

        let service = Service {
            metadata: ObjectMeta {
                name: service_name.clone(),
                labels: BTreeMap::new(),
                annotations,
            },
            selector: BTreeMap::from([(ORIGINAL_NAME_LABEL.to_string(), selector_value)]),
            ports: ports
                .into_iter()
                .map(|(port, protocol)| ServicePort {
                    name: format!("server-{port}"),
                    port,
                    target_port: port,
                    protocol,
                })
                .collect(),
        };
        env.services.insert(service_name.clone(), service);

        for (server_name, server) in servers {
            if server.is_internal() {
                continue;
            }
            let target = ExposureTarget {
                workspace_id,
                machine: machine_name,
                server_name,
                server,
                service_name: service_name.clone(),
                service_port: server.port_number(server_name)?,
                annotations: BTreeMap::new(),
            };
            if server.is_secure() {
                self.secure.expose(env, &target)?;
            } else {
                self.external.expose(env, &target)?;
            }
        }
        Ok(())
    }
}

/// Provisioner exposing the servers of every machine. A machine with servers
/// but no annotated pod container fails the pipeline.
#[derive(Debug, Clone)]
pub struct KubernetesServersConverter<E = ExternalExposureStrategy, S = SecureExposureStrategy> {
    exposer: KubernetesServerExposer<E, S>,
}

impl<E: ExternalServerExposer, S: SecureServerExposer> KubernetesServersConverter<E, S> {
    pub fn new(external: E, secure: S) -> Self {
        Self {
            exposer: KubernetesServerExposer::new(external, secure),
        }
    }
}

impl<E, S> ConfigurationProvisioner<KubernetesEnvironment> for KubernetesServersConverter<E, S>
where
    E: ExternalServerExposer,
    S: SecureServerExposer,
{
    fn provision(
        &self,
        env: &mut KubernetesEnvironment,
        identity: &RuntimeIdentity,
    ) -> Result<(), InfrastructureError> {
        let span = tracing::info_span!("expose_servers", workspace_id = %identity.workspace_id);
        let _entered = span.enter();

        let mut index = env.container_index();
        let mut work: Vec<(String, String, IndexMap<String, ServerConfig>)> = Vec::new();
        for (machine, config) in env.machines.iter().filter(|(_, m)| !m.servers.is_empty()) {
            let location = index.remove(machine).ok_or_else(|| {
                InfrastructureError::MissingContainer {
                    machine: machine.clone(),
                }
            })?;
            work.push((machine.clone(), location.pod, config.servers.clone()));
        }

        for (machine, pod, servers) in work {
            tracing::debug!(machine = %machine, pod = %pod, servers = servers.len(), "exposing servers");
            self.exposer
                .expose(env, &identity.workspace_id, &machine, &pod, &servers)?;
        }
        Ok(())
    }
}
