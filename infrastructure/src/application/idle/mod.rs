//! Idle detection for the server and for single workspace agents.

mod events;
mod server_idle;
mod workspace_filter;

pub use events::{EventService, status_changes};
pub use server_idle::ServerIdleDetector;
pub use workspace_filter::{WorkspaceIdleFilter, agent_router, track_activity};
