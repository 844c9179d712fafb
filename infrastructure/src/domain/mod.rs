//! Domain layer: environment model, validation and naming rules.
//!
//! This module has zero imports from `crate::infra`, `crate::application`,
//! `tokio`, `std::fs` or `std::net`. All functions are synchronous and take
//! data in, returning data out.

pub mod config;
pub mod docker;
pub mod environment;
pub mod error;
pub mod kubernetes;
pub mod memory;
pub mod servers;
pub mod volume;

pub use config::{InfraConfig, InfraPlatform, SecureExposerKind};
pub use docker::{DockerBuildContext, DockerContainerConfig, DockerEnvironment, push_unique};
pub use environment::{
    ContainerEnvironment, InternalEnvironment, InternalRecipe, MachineConfig, RecipeType,
    RuntimeEnvironment, RuntimeIdentity, ServerConfig, VolumeConfig,
};
pub use error::{CacheError, InfrastructureError};
pub use kubernetes::{
    ConfigMap, Container, ContainerPort, ContainerRef, Ingress, KubernetesEnvironment, ObjectMeta,
    Pod, PodSpec, Route, Service, ServicePort, dns_label,
};
pub use memory::{deserialize_mem_limit, mem_limit_from_yaml, parse_memory_size};
pub use volume::{validate_volume_name, volume_binding, volume_name};
