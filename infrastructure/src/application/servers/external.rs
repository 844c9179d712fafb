//! External exposure: one ingress (Kubernetes) or route (OpenShift) per server.

use std::collections::BTreeMap;

use crate::application::ports::{ExposureTarget, ExternalServerExposer};
use crate::domain::servers::server_labels;
use crate::domain::{
    InfraPlatform, InfrastructureError, Ingress, KubernetesEnvironment, ObjectMeta, Route,
    dns_label,
};

/// Name of the object exposing `target`.
fn object_name(target: &ExposureTarget<'_>) -> String {
    dns_label(&format!("{}-{}", target.machine, target.server_name))
}

/// `<object>-<workspace>.<domain>`, empty (any host) without a domain.
fn host(domain: &str, object: &str, workspace_id: &str) -> String {
    if domain.is_empty() {
        String::new()
    } else {
        format!("{object}-{}.{domain}", dns_label(workspace_id))
    }
}

fn metadata(name: String, target: &ExposureTarget<'_>) -> Result<ObjectMeta, InfrastructureError> {
    let mut annotations: BTreeMap<String, String> =
        server_labels(target.server_name, target.server).map_err(|e| {
            InfrastructureError::InvalidRecipe(format!(
                "Server '{}' attributes cannot be encoded: {e}",
                target.server_name
            ))
        })?;
    annotations.extend(target.annotations.clone());
    Ok(ObjectMeta {
        name,
        labels: BTreeMap::new(),
        annotations,
    })
}

#[derive(Debug, Clone)]
pub struct IngressServerExposer {
    domain: String,
}

impl IngressServerExposer {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

impl ExternalServerExposer for IngressServerExposer {
    fn expose(
        &self,
        env: &mut KubernetesEnvironment,
        target: &ExposureTarget<'_>,
    ) -> Result<(), InfrastructureError> {
        let name = object_name(target);
        let ingress = Ingress {
            host: host(&self.domain, &name, target.workspace_id),
            path: target.server.path.clone().unwrap_or_else(|| "/".to_string()),
            service_name: target.service_name.clone(),
            service_port: target.service_port,
            metadata: metadata(name.clone(), target)?,
        };
        env.ingresses.insert(name, ingress);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RouteServerExposer {
    domain: String,
}

impl RouteServerExposer {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

impl ExternalServerExposer for RouteServerExposer {
    fn expose(
        &self,
        env: &mut KubernetesEnvironment,
        target: &ExposureTarget<'_>,
    ) -> Result<(), InfrastructureError> {
        let name = object_name(target);
        let tls = matches!(target.server.protocol.as_deref(), Some("https" | "wss"));
        let route = Route {
            host: host(&self.domain, &name, target.workspace_id),
            service_name: target.service_name.clone(),
            target_port: target.service_port,
            tls,
            metadata: metadata(name.clone(), target)?,
        };
        env.routes.insert(name, route);
        Ok(())
    }
}

/// External exposure strategy of the target platform.
#[derive(Debug, Clone)]
pub enum ExternalExposureStrategy {
    Ingress(IngressServerExposer),
    Route(RouteServerExposer),
}

impl ExternalExposureStrategy {
    /// Ingresses on Kubernetes, routes on OpenShift.
    pub fn for_platform(platform: InfraPlatform, domain: &str) -> Self {
        match platform {
            InfraPlatform::Kubernetes => Self::Ingress(IngressServerExposer::new(domain)),
            InfraPlatform::OpenShift => Self::Route(RouteServerExposer::new(domain)),
        }
    }
}

impl ExternalServerExposer for ExternalExposureStrategy {
    fn expose(
        &self,
        env: &mut KubernetesEnvironment,
        target: &ExposureTarget<'_>,
    ) -> Result<(), InfrastructureError> {
        match self {
            Self::Ingress(exposer) => exposer.expose(env, target),
            Self::Route(exposer) => exposer.expose(env, target),
        }
    }
}
