//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra` or `crate::application`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::time::Duration;

use thiserror::Error;

// ── Conversion and provisioning errors ───────────────────────────────────────

/// Errors raised while converting or provisioning a workspace environment.
///
/// Every variant names the offending value so the message can be shown to the
/// user as-is when a workspace fails to start.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InfrastructureError {
    #[error("Environment must contain at least one machine configuration")]
    NoMachines,

    #[error("Recipe type '{recipe_type}' is not supported. Supported types: {supported}")]
    UnsupportedRecipeType {
        recipe_type: String,
        supported: String,
    },

    #[error(
        "Recipe of type '{}' supports a single machine, but the environment also contains: {}",
        .recipe_type,
        .extra.join(", ")
    )]
    MultipleMachines {
        recipe_type: String,
        extra: Vec<String>,
    },

    #[error("Machine '{machine}' has no corresponding container in the environment")]
    MissingContainer { machine: String },

    #[error("Unsupported value '{value}' for memory limit")]
    InvalidMemoryLimit { value: String },

    #[error("Invalid recipe: {0}")]
    InvalidRecipe(String),

    #[error("Invalid volume name '{name}': must match ^[a-z0-9]([a-z0-9-]{{0,61}}[a-z0-9])?$")]
    InvalidVolumeName { name: String },

    #[error("Server '{server}' has invalid port '{port}'")]
    InvalidServerPort { server: String, port: String },

    #[error("Machine '{machine}' is not declared in the environment")]
    UnknownMachine { machine: String },

    #[error("Machines '{first}' and '{second}' both map to object name '{name}'")]
    NameCollision {
        first: String,
        second: String,
        name: String,
    },

    #[error("Cannot obtain machine token for workspace '{workspace_id}': {reason}")]
    MachineToken {
        workspace_id: String,
        reason: String,
    },
}

// ── Replication errors ───────────────────────────────────────────────────────

/// Errors raised by the replicated map backing the distributed caches.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Failed to create replication channel: {0}")]
    ChannelCreation(String),

    #[error("Timed out after {timeout:?} joining the replication cluster")]
    JoinTimeout { timeout: Duration },

    #[error("Write acknowledged by {acknowledged} replica(s), {required} required")]
    ReplicationTimeout { acknowledged: i64, required: u32 },

    #[error("Replication failure: {0}")]
    Replication(String),

    #[error("Malformed cached value for '{key}': {reason}")]
    Serialization { key: String, reason: String },

    #[error("Invalid cache field '{field}': {reason}")]
    InvalidField { field: String, reason: &'static str },

    #[error("Replicated map is shut down")]
    Closed,
}
