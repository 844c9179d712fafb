use std::marker::PhantomData;
use std::sync::Arc;

use crate::application::ports::{ConfigurationProvisioner, MachineTokenProvider};
use crate::domain::{ContainerEnvironment, InfrastructureError, RuntimeIdentity};

/// Container variable holding the machine token.
pub const MACHINE_TOKEN_ENV: &str = "CHE_MACHINE_TOKEN";

/// Gives every container the token its agents authenticate with.
pub struct MachineTokenProvisioner<E> {
    tokens: Arc<dyn MachineTokenProvider>,
    _env: PhantomData<fn(&mut E)>,
}

impl<E> MachineTokenProvisioner<E> {
    pub fn new(tokens: Arc<dyn MachineTokenProvider>) -> Self {
        Self {
            tokens,
            _env: PhantomData,
        }
    }
}

impl<E: ContainerEnvironment> ConfigurationProvisioner<E> for MachineTokenProvisioner<E> {
    fn provision(&self, env: &mut E, identity: &RuntimeIdentity) -> Result<(), InfrastructureError> {
        let token = self.tokens.token(&identity.workspace_id)?;
        for vars in env.container_envs_mut() {
            vars.insert(MACHINE_TOKEN_ENV.to_string(), token.clone());
        }
        Ok(())
    }
}
