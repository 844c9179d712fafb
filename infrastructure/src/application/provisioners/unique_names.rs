use std::collections::BTreeMap;

use crate::application::ports::ConfigurationProvisioner;
use crate::domain::kubernetes::{ORIGINAL_NAME_LABEL, WORKSPACE_ID_LABEL};
use crate::domain::{InfrastructureError, KubernetesEnvironment, ObjectMeta, RuntimeIdentity};

/// Prefixes object names with the workspace id so several workspaces can
/// share one namespace. Already-prefixed names are left alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniqueNamesProvisioner;

impl ConfigurationProvisioner<KubernetesEnvironment> for UniqueNamesProvisioner {
    fn provision(
        &self,
        env: &mut KubernetesEnvironment,
        identity: &RuntimeIdentity,
    ) -> Result<(), InfrastructureError> {
        let workspace_id = identity.workspace_id.as_str();

        rename_all(&mut env.pods, workspace_id, |p| &mut p.metadata);
        let services = rename_all(&mut env.services, workspace_id, |s| &mut s.metadata);
        rename_all(&mut env.ingresses, workspace_id, |i| &mut i.metadata);
        rename_all(&mut env.routes, workspace_id, |r| &mut r.metadata);
        rename_all(&mut env.config_maps, workspace_id, |c| &mut c.metadata);

        for ingress in env.ingresses.values_mut() {
            if let Some(renamed) = services.get(&ingress.service_name) {
                ingress.service_name.clone_from(renamed);
            }
        }
        for route in env.routes.values_mut() {
            if let Some(renamed) = services.get(&route.service_name) {
                route.service_name.clone_from(renamed);
            }
        }
        Ok(())
    }
}

/// Renames every object of one kind; returns old → new names.
fn rename_all<T>(
    objects: &mut BTreeMap<String, T>,
    workspace_id: &str,
    metadata: impl Fn(&mut T) -> &mut ObjectMeta,
) -> BTreeMap<String, String> {
    let prefix = format!("{workspace_id}-");
    let mut renamed = BTreeMap::new();
    for (name, mut object) in std::mem::take(objects) {
        let meta = metadata(&mut object);
        meta.labels
            .insert(WORKSPACE_ID_LABEL.to_string(), workspace_id.to_string());
        let unique = if name.starts_with(&prefix) {
            name
        } else {
            meta.labels
                .entry(ORIGINAL_NAME_LABEL.to_string())
                .or_insert_with(|| name.clone());
            let unique = format!("{prefix}{name}");
            renamed.insert(name, unique.clone());
            unique
        };
        meta.name.clone_from(&unique);
        objects.insert(unique, object);
    }
    renamed
}
