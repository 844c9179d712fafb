/// Valkey key prefixes for replicated runtime state
pub mod keys {
    /// Workspace status map (hash)
    /// Format: che:{deployment}:workspace:status
    /// Field: workspace id
    /// Value: WorkspaceStatus as SCREAMING_SNAKE_CASE string
    pub const WORKSPACE_STATUS: &str = "workspace:status";

    /// Remote subscription map (hash)
    /// Format: che:{deployment}:subscriptions
    /// Field: subscription method name
    /// Value: JSON array of RemoteSubscriptionContext
    pub const SUBSCRIPTIONS: &str = "subscriptions";

    /// Root prefix shared by every key
    pub const ROOT: &str = "che";

    /// Deployment name used when none is configured
    pub const DEFAULT_DEPLOYMENT: &str = "default";
}

/// Replication timing constants
pub mod replication {
    /// Time allowed for the initial cluster join (connect + PING)
    pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 5000;

    /// Time a write may wait for replica acknowledgement
    pub const DEFAULT_REPLICATION_TIMEOUT_MS: u64 = 3000;

    /// Replicas that must acknowledge a write (0 = primary only)
    pub const DEFAULT_MIN_REPLICAS: u32 = 0;

    /// Upper bound on a single hash field, matching the longest workspace id
    /// or method name the runtime produces with headroom
    pub const MAX_FIELD_LEN: usize = 256;
}

/// Helper functions for key construction
pub fn workspace_status_key(deployment: &str) -> String {
    format!("{}:{}:{}", keys::ROOT, deployment, keys::WORKSPACE_STATUS)
}

pub fn subscriptions_key(deployment: &str) -> String {
    format!("{}:{}:{}", keys::ROOT, deployment, keys::SUBSCRIPTIONS)
}

/// Validate a hash field (workspace id or method name) before it reaches Valkey.
/// Returns Ok(()) if valid, Err with description if invalid.
/// Rejects empty and oversized fields and anything carrying control characters.
pub fn validate_field(field: &str) -> Result<(), &'static str> {
    if field.is_empty() {
        return Err("field must not be empty");
    }
    if field.len() > replication::MAX_FIELD_LEN {
        return Err("field exceeds maximum length");
    }
    if field.chars().any(char::is_control) {
        return Err("field must not contain control characters");
    }
    Ok(())
}
