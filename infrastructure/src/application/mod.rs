//! Application layer: port trait definitions, environment conversion,
//! provisioning and replicated workspace state.
//!
//! This module depends only on `crate::domain`, never on `crate::infra`
//! or `crate::cli`.

pub mod converters;
pub mod idle;
pub mod locks;
pub mod ports;
pub mod provisioners;
pub mod servers;
pub mod status_cache;
pub mod subscriptions;

pub use idle::{EventService, ServerIdleDetector, WorkspaceIdleFilter, track_activity};
pub use locks::KeyedLocks;
pub use ports::{
    ConfigurationProvisioner, EnvironmentConverter, ExposureTarget, ExternalServerExposer,
    MachineTokenProvider, ReplicatedMap, RunningWorkspaces, SecureServerExposer, WorkspaceStopper,
};
pub use provisioners::{InfrastructureProvisioner, docker_pipeline, kubernetes_pipeline};
pub use status_cache::WorkspaceStatusCache;
pub use subscriptions::RemoteSubscriptionStorage;
