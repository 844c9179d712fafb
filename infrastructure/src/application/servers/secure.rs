//! Secure exposure strategies.
//!
//! The servers converter only sees [`SecureServerExposer`]; which strategy
//! sits behind it is decided by [`SecureExposerFactory`] from configuration.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::application::ports::{ExposureTarget, ExternalServerExposer, SecureServerExposer};
use crate::application::servers::ExternalExposureStrategy;
use crate::domain::servers::GATEWAY_TARGET_ANNOTATION;
use crate::domain::{
    ConfigMap, InfrastructureError, KubernetesEnvironment, ObjectMeta, SecureExposerKind,
    dns_label,
};

/// Cluster service of the authenticating gateway.
pub const GATEWAY_SERVICE: &str = "che-gateway";

/// Port the gateway service listens on.
pub const GATEWAY_PORT: u16 = 8080;

/// Config map holding the workspace's gateway routes.
pub const GATEWAY_CONFIG_MAP: &str = "gateway-config";

/// Label the gateway watches to pick up route config maps.
pub const GATEWAY_CONFIG_LABEL: &str = "che.gateway.config";

/// Secure servers exposed like plain external ones, without an auth wrapper.
#[derive(Debug, Clone)]
pub struct DefaultSecureServerExposer<E> {
    external: E,
}

impl<E> DefaultSecureServerExposer<E> {
    pub fn new(external: E) -> Self {
        Self { external }
    }
}

impl<E: ExternalServerExposer> SecureServerExposer for DefaultSecureServerExposer<E> {
    fn expose(
        &self,
        env: &mut KubernetesEnvironment,
        target: &ExposureTarget<'_>,
    ) -> Result<(), InfrastructureError> {
        self.external.expose(env, target)
    }
}

/// A single gateway route, as read by the gateway.
#[derive(Debug, Serialize)]
struct GatewayRoute<'a> {
    workspace_id: &'a str,
    machine: &'a str,
    server: &'a str,
    service: &'a str,
    port: u16,
    path: &'a str,
}

/// Routes secure servers through the workspace auth gateway: the server is
/// registered in the gateway config map and the external object points at
/// the gateway service instead of the machine.
#[derive(Debug, Clone)]
pub struct GatewaySecureServerExposer<E> {
    external: E,
}

impl<E> GatewaySecureServerExposer<E> {
    pub fn new(external: E) -> Self {
        Self { external }
    }
}

impl<E: ExternalServerExposer> SecureServerExposer for GatewaySecureServerExposer<E> {
    fn expose(
        &self,
        env: &mut KubernetesEnvironment,
        target: &ExposureTarget<'_>,
    ) -> Result<(), InfrastructureError> {
        let route = GatewayRoute {
            workspace_id: target.workspace_id,
            machine: target.machine,
            server: target.server_name,
            service: &target.service_name,
            port: target.service_port,
            path: target.server.path.as_deref().unwrap_or("/"),
        };
        let rendered = serde_yaml::to_string(&route).map_err(|e| {
            InfrastructureError::InvalidRecipe(format!(
                "Gateway route for server '{}' cannot be rendered: {e}",
                target.server_name
            ))
        })?;

        let config_map = env
            .config_maps
            .entry(GATEWAY_CONFIG_MAP.to_string())
            .or_insert_with(|| {
                let mut metadata = ObjectMeta::named(GATEWAY_CONFIG_MAP);
                metadata
                    .labels
                    .insert(GATEWAY_CONFIG_LABEL.to_string(), "true".to_string());
                ConfigMap {
                    metadata,
                    data: BTreeMap::new(),
                }
            });
        let entry = format!(
            "{}.yml",
            dns_label(&format!("{}-{}", target.machine, target.server_name))
        );
        config_map.data.insert(entry, rendered);

        let mut through_gateway = target.clone();
        through_gateway.service_name = GATEWAY_SERVICE.to_string();
        through_gateway.service_port = GATEWAY_PORT;
        through_gateway.annotations.insert(
            GATEWAY_TARGET_ANNOTATION.to_string(),
            format!("{}:{}", target.service_name, target.service_port),
        );
        self.external.expose(env, &through_gateway)
    }
}

/// Secure exposure strategy chosen by configuration.
#[derive(Debug, Clone)]
pub enum SecureExposureStrategy<E = ExternalExposureStrategy> {
    Default(DefaultSecureServerExposer<E>),
    Gateway(GatewaySecureServerExposer<E>),
}

impl<E: ExternalServerExposer> SecureServerExposer for SecureExposureStrategy<E> {
    fn expose(
        &self,
        env: &mut KubernetesEnvironment,
        target: &ExposureTarget<'_>,
    ) -> Result<(), InfrastructureError> {
        match self {
            Self::Default(exposer) => exposer.expose(env, target),
            Self::Gateway(exposer) => exposer.expose(env, target),
        }
    }
}

pub struct SecureExposerFactory;

impl SecureExposerFactory {
    /// Strategy for `kind` wrapping the platform's external exposer.
    pub fn create<E: ExternalServerExposer>(
        kind: SecureExposerKind,
        external: E,
    ) -> SecureExposureStrategy<E> {
        match kind {
            SecureExposerKind::Default => {
                SecureExposureStrategy::Default(DefaultSecureServerExposer::new(external))
            }
            SecureExposerKind::Gateway => {
                SecureExposureStrategy::Gateway(GatewaySecureServerExposer::new(external))
            }
        }
    }
}
