//! Provisioners and the pipelines that run them.
//!
//! Each provisioner owns one concern and is idempotent, so the pipeline order
//! only matters where one step reads what another writes (servers are
//! exposed before object names are made unique).

mod docker;
mod machine_token;
mod memory;
mod restart_policy;
mod tracing_tags;
mod unique_names;

use std::sync::Arc;

pub use docker::{
    CHE_HOST_ALIAS, CheMasterExtraHostProvisioner, CheMasterNetworkProvisioner,
    DockerServersConverter, VolumesConverter,
};
pub use machine_token::{MACHINE_TOKEN_ENV, MachineTokenProvisioner};
pub use memory::MemoryLimitProvisioner;
pub use restart_policy::RestartPolicyRewriter;
pub use tracing_tags::{
    DockerTracingTagProvisioner, KubernetesTracingTagProvisioner, TRACING_ENDPOINT_ENV,
    TracingTagProvisioner, WORKSPACE_ID_ENV,
};
pub use unique_names::UniqueNamesProvisioner;

use crate::application::ports::{ConfigurationProvisioner, MachineTokenProvider};
use crate::application::servers::{
    ExternalExposureStrategy, KubernetesServersConverter, SecureExposerFactory,
};
use crate::domain::{
    DockerEnvironment, InfraConfig, InfrastructureError, KubernetesEnvironment, RuntimeIdentity,
};

type BoxedProvisioner<E> = Box<dyn ConfigurationProvisioner<E> + Send + Sync>;

/// Ordered provisioners applied to one environment. The first failure aborts
/// the run and is returned unchanged.
pub struct InfrastructureProvisioner<E> {
    provisioners: Vec<BoxedProvisioner<E>>,
}

impl<E> Default for InfrastructureProvisioner<E> {
    fn default() -> Self {
        Self {
            provisioners: Vec::new(),
        }
    }
}

impl<E> InfrastructureProvisioner<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provisioner to the end of the pipeline.
    #[must_use]
    pub fn with(mut self, provisioner: impl ConfigurationProvisioner<E> + Send + Sync + 'static) -> Self {
        self.provisioners.push(Box::new(provisioner));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.provisioners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.provisioners.is_empty()
    }

    /// Run every provisioner in order inside a `provision` span.
    ///
    /// # Errors
    ///
    /// Returns the first provisioner error.
    pub fn provision(&self, env: &mut E, identity: &RuntimeIdentity) -> Result<(), InfrastructureError> {
        let span = tracing::info_span!("provision", workspace_id = %identity.workspace_id);
        let _entered = span.enter();
        for provisioner in &self.provisioners {
            provisioner.provision(env, identity).inspect_err(|e| {
                tracing::warn!(error = %e, "provisioning failed");
            })?;
        }
        tracing::debug!(steps = self.provisioners.len(), "environment provisioned");
        Ok(())
    }
}

/// Docker pipeline built from the infrastructure config.
#[must_use]
pub fn docker_pipeline(
    config: &InfraConfig,
    tokens: Option<Arc<dyn MachineTokenProvider>>,
) -> InfrastructureProvisioner<DockerEnvironment> {
    let pipeline = InfrastructureProvisioner::new()
        .with(MemoryLimitProvisioner)
        .with(CheMasterExtraHostProvisioner::new(&config.docker_ip))
        .with(CheMasterNetworkProvisioner::new(config.docker_network.clone()))
        .with(VolumesConverter)
        .with(DockerServersConverter)
        .with(DockerTracingTagProvisioner::new(config.tracing_endpoint.clone()));
    match tokens {
        Some(tokens) => pipeline.with(MachineTokenProvisioner::new(tokens)),
        None => pipeline,
    }
}

/// Kubernetes pipeline built from the infrastructure config. The external
/// exposure strategy follows the platform, the secure one the configured
/// exposer kind.
#[must_use]
pub fn kubernetes_pipeline(
    config: &InfraConfig,
    tokens: Option<Arc<dyn MachineTokenProvider>>,
) -> InfrastructureProvisioner<KubernetesEnvironment> {
    let external = ExternalExposureStrategy::for_platform(config.infra_platform, &config.ingress_domain);
    let secure = SecureExposerFactory::create(config.secure_exposer, external.clone());
    let pipeline = InfrastructureProvisioner::new()
        .with(MemoryLimitProvisioner)
        .with(RestartPolicyRewriter::default())
        .with(KubernetesServersConverter::new(external, secure))
        .with(UniqueNamesProvisioner)
        .with(KubernetesTracingTagProvisioner::new(config.tracing_endpoint.clone()));
    match tokens {
        Some(tokens) => pipeline.with(MachineTokenProvisioner::new(tokens)),
        None => pipeline,
    }
}
