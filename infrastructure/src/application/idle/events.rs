use std::collections::BTreeMap;

use che_common::{ServerIdleEvent, WorkspaceStatus, WorkspaceStatusEvent};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// In-process fan-out of lifecycle events. Cloning shares the channels.
#[derive(Debug, Clone)]
pub struct EventService {
    status: broadcast::Sender<WorkspaceStatusEvent>,
    idle: broadcast::Sender<ServerIdleEvent>,
}

impl Default for EventService {
    fn default() -> Self {
        Self::new()
    }
}

impl EventService {
    #[must_use]
    pub fn new() -> Self {
        let (status, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (idle, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { status, idle }
    }

    /// Publish a status change. Returns how many subscribers received it.
    pub fn publish_status(&self, event: WorkspaceStatusEvent) -> usize {
        self.status.send(event).unwrap_or(0)
    }

    pub fn publish_idle(&self, event: ServerIdleEvent) -> usize {
        self.idle.send(event).unwrap_or(0)
    }

    #[must_use]
    pub fn subscribe_status(&self) -> broadcast::Receiver<WorkspaceStatusEvent> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn subscribe_idle(&self) -> broadcast::Receiver<ServerIdleEvent> {
        self.idle.subscribe()
    }
}

/// Status events turning snapshot `before` into `after`. A workspace that
/// disappeared from the cache is reported as `STOPPED`.
#[must_use]
pub fn status_changes(
    before: &BTreeMap<String, WorkspaceStatus>,
    after: &BTreeMap<String, WorkspaceStatus>,
) -> Vec<WorkspaceStatusEvent> {
    let changed = after.iter().filter_map(|(id, status)| {
        let previous = before.get(id).copied();
        (previous != Some(*status)).then(|| WorkspaceStatusEvent {
            prev_status: previous,
            ..WorkspaceStatusEvent::new(id.clone(), *status)
        })
    });
    let gone = before
        .iter()
        .filter(|(id, status)| !after.contains_key(*id) && **status != WorkspaceStatus::Stopped)
        .map(|(id, status)| WorkspaceStatusEvent {
            prev_status: Some(*status),
            ..WorkspaceStatusEvent::new(id.clone(), WorkspaceStatus::Stopped)
        });
    changed.chain(gone).collect()
}
