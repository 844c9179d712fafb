//! Machine tokens read from a directory of per-workspace files.

use std::path::PathBuf;

use crate::application::ports::MachineTokenProvider;
use crate::domain::InfrastructureError;

/// Reads `<dir>/<workspace_id>`, the way mounted secrets are laid out.
#[derive(Debug, Clone)]
pub struct FileMachineTokenProvider {
    dir: PathBuf,
}

impl FileMachineTokenProvider {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MachineTokenProvider for FileMachineTokenProvider {
    fn token(&self, workspace_id: &str) -> Result<String, InfrastructureError> {
        let failure = |reason: String| InfrastructureError::MachineToken {
            workspace_id: workspace_id.to_string(),
            reason,
        };
        if che_common::validate_field(workspace_id).is_err() || workspace_id.contains(['/', '\\']) {
            return Err(failure("workspace id is not a valid file name".to_string()));
        }
        let path = self.dir.join(workspace_id);
        let token = std::fs::read_to_string(&path)
            .map_err(|e| failure(format!("cannot read {}: {e}", path.display())))?;
        let token = token.trim();
        if token.is_empty() {
            return Err(failure(format!("{} is empty", path.display())));
        }
        Ok(token.to_string())
    }
}
