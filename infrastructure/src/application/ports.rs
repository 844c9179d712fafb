//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`, never from `crate::infra`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{
    CacheError, InfrastructureError, KubernetesEnvironment, RuntimeIdentity, ServerConfig,
};

// ── Value Types ───────────────────────────────────────────────────────────────

/// One server to make reachable, and where its traffic must land.
#[derive(Debug, Clone)]
pub struct ExposureTarget<'a> {
    pub workspace_id: &'a str,
    pub machine: &'a str,
    pub server_name: &'a str,
    pub server: &'a ServerConfig,
    /// Service the external object routes to.
    pub service_name: String,
    pub service_port: u16,
    /// Copied onto the created ingress or route.
    pub annotations: BTreeMap<String, String>,
}

// ── Environment Ports ─────────────────────────────────────────────────────────

/// Turns one environment representation into another.
///
/// The source is only borrowed; converters never mutate it.
pub trait EnvironmentConverter<S, T> {
    /// # Errors
    ///
    /// Returns an [`InfrastructureError`] naming the offending recipe type,
    /// machine or value when the source cannot be converted.
    fn convert(&self, source: &S) -> Result<T, InfrastructureError>;
}

/// One cross-cutting concern applied to an environment in place.
///
/// Implementations must be idempotent: provisioning twice leaves the
/// environment as provisioning once.
pub trait ConfigurationProvisioner<E> {
    /// # Errors
    ///
    /// Returns an [`InfrastructureError`] on malformed input, e.g. a machine
    /// without a container.
    fn provision(&self, env: &mut E, identity: &RuntimeIdentity) -> Result<(), InfrastructureError>;
}

/// Makes a non-internal, non-secure server reachable from outside the cluster.
pub trait ExternalServerExposer {
    /// # Errors
    ///
    /// Returns an [`InfrastructureError`] when the server cannot be exposed.
    fn expose(
        &self,
        env: &mut KubernetesEnvironment,
        target: &ExposureTarget<'_>,
    ) -> Result<(), InfrastructureError>;
}

/// Makes a secure server reachable, possibly behind authentication.
pub trait SecureServerExposer {
    /// # Errors
    ///
    /// Returns an [`InfrastructureError`] when the server cannot be exposed.
    fn expose(
        &self,
        env: &mut KubernetesEnvironment,
        target: &ExposureTarget<'_>,
    ) -> Result<(), InfrastructureError>;
}

/// Issues the token agents use to authenticate back to the master.
pub trait MachineTokenProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns [`InfrastructureError::MachineToken`] when no token can be
    /// obtained for the workspace.
    fn token(&self, workspace_id: &str) -> Result<String, InfrastructureError>;
}

// ── Cluster State Ports ───────────────────────────────────────────────────────

/// Cluster-replicated string map. Every mutation is atomic and does not
/// return before it is replicated (or fails with a typed error).
#[async_trait]
pub trait ReplicatedMap: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` unless `key` is present. Returns the existing value.
    async fn put_if_absent(&self, key: &str, value: &str) -> Result<Option<String>, CacheError>;

    /// Overwrite `key` only if present. Returns the previous value.
    async fn replace(&self, key: &str, value: &str) -> Result<Option<String>, CacheError>;

    /// Overwrite `key` only if it currently holds `expected`.
    async fn replace_if(&self, key: &str, expected: &str, value: &str)
    -> Result<bool, CacheError>;

    /// Delete `key`. Returns the previous value.
    async fn remove(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Delete `key` only if it currently holds `expected`.
    async fn remove_if(&self, key: &str, expected: &str) -> Result<bool, CacheError>;

    /// Snapshot of the whole map.
    async fn entries(&self) -> Result<BTreeMap<String, String>, CacheError>;

    /// Leave the cluster. Idempotent; failures are logged, never returned.
    async fn shutdown(&self);
}

#[async_trait]
impl<M: ReplicatedMap + ?Sized> ReplicatedMap for Arc<M> {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).get(key).await
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> Result<Option<String>, CacheError> {
        (**self).put_if_absent(key, value).await
    }

    async fn replace(&self, key: &str, value: &str) -> Result<Option<String>, CacheError> {
        (**self).replace(key, value).await
    }

    async fn replace_if(&self, key: &str, expected: &str, value: &str)
    -> Result<bool, CacheError> {
        (**self).replace_if(key, expected, value).await
    }

    async fn remove(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).remove(key).await
    }

    async fn remove_if(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        (**self).remove_if(key, expected).await
    }

    async fn entries(&self) -> Result<BTreeMap<String, String>, CacheError> {
        (**self).entries().await
    }

    async fn shutdown(&self) {
        (**self).shutdown().await;
    }
}

/// Ids of the workspaces currently running anywhere in the cluster.
#[async_trait]
pub trait RunningWorkspaces: Send + Sync {
    async fn running(&self) -> Result<Vec<String>, CacheError>;
}

/// Asks the workspace runtime to stop a workspace.
#[async_trait]
pub trait WorkspaceStopper: Send + Sync {
    async fn stop(&self, workspace_id: &str) -> anyhow::Result<()>;
}
