//! Workspace-scoped volume naming.
//!
//! The generated name is a pure function of `(workspace_id, logical_name)` so a
//! restarted container in the same workspace mounts the same volume, while two
//! workspaces declaring the same logical volume never share data.

use crate::domain::error::InfrastructureError;

const MAX_VOLUME_NAME_LEN: usize = 63;

/// Validate a logical volume name: lowercase alphanumerics and `-`, starting
/// and ending with an alphanumeric, at most 63 characters.
///
/// # Errors
///
/// Returns [`InfrastructureError::InvalidVolumeName`] naming the offending value.
pub fn validate_volume_name(name: &str) -> Result<(), InfrastructureError> {
    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let valid = !name.is_empty()
        && name.len() <= MAX_VOLUME_NAME_LEN
        && name.starts_with(allowed)
        && name.ends_with(allowed)
        && name.chars().all(|c| allowed(c) || c == '-');
    if valid {
        Ok(())
    } else {
        Err(InfrastructureError::InvalidVolumeName {
            name: name.to_string(),
        })
    }
}

/// Docker volume name for `name` inside `workspace_id`.
///
/// # Errors
///
/// Returns [`InfrastructureError::InvalidVolumeName`] when `name` is not a
/// valid logical volume name.
pub fn volume_name(workspace_id: &str, name: &str) -> Result<String, InfrastructureError> {
    validate_volume_name(name)?;
    Ok(format!("{workspace_id}_{name}"))
}

/// Binding entry `"<volume>:<mount path>"` as understood by Docker.
#[must_use]
pub fn volume_binding(volume: &str, path: &str) -> String {
    format!("{volume}:{path}")
}
