use std::marker::PhantomData;

use crate::application::ports::ConfigurationProvisioner;
use crate::domain::{
    ContainerEnvironment, DockerEnvironment, InfrastructureError, KubernetesEnvironment,
    RuntimeIdentity,
};

/// Container variable naming the trace collector.
pub const TRACING_ENDPOINT_ENV: &str = "CHE_TRACING_ENDPOINT";

/// Container variable naming the workspace the container belongs to.
pub const WORKSPACE_ID_ENV: &str = "CHE_WORKSPACE_ID";

/// Tags the active span with the workspace id and, when a collector is
/// configured, points every container at it.
///
/// Without a subscriber or a collector this only records on a disabled span.
#[derive(Debug, Clone)]
pub struct TracingTagProvisioner<E> {
    endpoint: Option<String>,
    _env: PhantomData<fn(&mut E)>,
}

pub type DockerTracingTagProvisioner = TracingTagProvisioner<DockerEnvironment>;
pub type KubernetesTracingTagProvisioner = TracingTagProvisioner<KubernetesEnvironment>;

impl<E> TracingTagProvisioner<E> {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            endpoint,
            _env: PhantomData,
        }
    }
}

impl<E: ContainerEnvironment> ConfigurationProvisioner<E> for TracingTagProvisioner<E> {
    fn provision(&self, env: &mut E, identity: &RuntimeIdentity) -> Result<(), InfrastructureError> {
        tracing::Span::current().record("workspace_id", identity.workspace_id.as_str());

        let Some(endpoint) = &self.endpoint else {
            return Ok(());
        };
        for vars in env.container_envs_mut() {
            vars.insert(TRACING_ENDPOINT_ENV.to_string(), endpoint.clone());
            vars.insert(WORKSPACE_ID_ENV.to_string(), identity.workspace_id.clone());
        }
        Ok(())
    }
}
