use che_common::{Warning, warning_codes};

use crate::application::ports::ConfigurationProvisioner;
use crate::domain::kubernetes::DEFAULT_RESTART_POLICY;
use crate::domain::{InfrastructureError, KubernetesEnvironment, RuntimeEnvironment, RuntimeIdentity};

/// Policy Kubernetes applies to a pod that does not declare one.
const KUBERNETES_IMPLICIT_POLICY: &str = "Always";

/// Forces every pod onto the platform restart policy. Workspace pods must not
/// be restarted behind the runtime's back, so other policies are rewritten
/// with a warning instead of failing the start.
#[derive(Debug, Clone)]
pub struct RestartPolicyRewriter {
    default_policy: String,
}

impl Default for RestartPolicyRewriter {
    fn default() -> Self {
        Self::new(DEFAULT_RESTART_POLICY)
    }
}

impl RestartPolicyRewriter {
    pub fn new(default_policy: impl Into<String>) -> Self {
        Self {
            default_policy: default_policy.into(),
        }
    }
}

impl ConfigurationProvisioner<KubernetesEnvironment> for RestartPolicyRewriter {
    fn provision(
        &self,
        env: &mut KubernetesEnvironment,
        _identity: &RuntimeIdentity,
    ) -> Result<(), InfrastructureError> {
        let mut warnings = Vec::new();
        for (pod_name, pod) in &mut env.pods {
            let current = pod
                .spec
                .restart_policy
                .as_deref()
                .unwrap_or(KUBERNETES_IMPLICIT_POLICY);
            if current == self.default_policy {
                continue;
            }
            tracing::debug!(pod = %pod_name, from = current, to = %self.default_policy, "rewriting restart policy");
            warnings.push(Warning::new(
                warning_codes::RESTART_POLICY_REWRITTEN,
                format!(
                    "Restart policy '{current}' for pod '{pod_name}' is rewritten to {}",
                    self.default_policy
                ),
            ));
            pod.spec.restart_policy = Some(self.default_policy.clone());
        }
        for warning in warnings {
            env.add_warning(warning);
        }
        Ok(())
    }
}
