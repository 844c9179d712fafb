use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use che_common::{ServerIdleEvent, WorkspaceStatus};
use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::application::idle::EventService;
use crate::application::ports::RunningWorkspaces;

/// Publishes a [`ServerIdleEvent`] once no workspace has been running for the
/// whole timeout.
///
/// The pending check is cancelled when a workspace starts and re-armed when
/// the last one stops. Whether anything is running is checked again when
/// the timer fires.
pub struct ServerIdleDetector {
    inner: Option<Arc<Inner>>,
    listener: Option<JoinHandle<()>>,
}

struct Inner {
    timeout: Duration,
    running: Arc<dyn RunningWorkspaces>,
    events: EventService,
    runtime: Handle,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ServerIdleDetector {
    /// Start detecting. With no timeout the detector stays inert.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a Tokio runtime.
    pub fn start(
        timeout: Option<Duration>,
        running: Arc<dyn RunningWorkspaces>,
        events: EventService,
    ) -> Result<Self> {
        let Some(timeout) = timeout else {
            tracing::info!("server idle detection disabled");
            return Ok(Self {
                inner: None,
                listener: None,
            });
        };
        let runtime = Handle::try_current().context("server idle detector needs a Tokio runtime")?;

        let mut status_events = events.subscribe_status();
        let inner = Arc::new(Inner {
            timeout,
            running,
            events,
            runtime: runtime.clone(),
            pending: Mutex::new(None),
        });
        inner.schedule();

        let listening = Arc::clone(&inner);
        let listener = runtime.spawn(async move {
            loop {
                match status_events.recv().await {
                    Ok(event) => match event.status {
                        WorkspaceStatus::Running => listening.cancel(),
                        WorkspaceStatus::Stopped => {
                            if listening.nothing_running().await {
                                listening.schedule();
                            }
                        }
                        WorkspaceStatus::Starting | WorkspaceStatus::Stopping => {}
                    },
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "server idle detector lagged behind status events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        tracing::info!(timeout_secs = timeout.as_secs(), "server idle detection started");
        Ok(Self {
            inner: Some(inner),
            listener: Some(listener),
        })
    }

    /// Whether an idle check is currently pending.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.inner.as_ref().is_some_and(|inner| inner.is_scheduled())
    }

    /// Abort the listener and any pending check.
    pub fn shutdown(&self) {
        if let Some(listener) = &self.listener {
            listener.abort();
        }
        if let Some(inner) = &self.inner {
            inner.cancel();
        }
    }
}

impl Drop for ServerIdleDetector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn schedule(self: &Arc<Self>) {
        let deadline = Instant::now() + self.timeout;
        let firing = Arc::clone(self);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            firing.fire().await;
        });
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        tracing::debug!(timeout_secs = self.timeout.as_secs(), "server idle check scheduled");
    }

    /// Aborting a task that already runs or finished is a no-op.
    fn cancel(&self) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pending) = pending {
            pending.abort();
            tracing::debug!("server idle check cancelled");
        }
    }

    fn is_scheduled(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    async fn nothing_running(&self) -> bool {
        match self.running.running().await {
            Ok(ids) => ids.is_empty(),
            Err(e) => {
                tracing::warn!(error = %e, "cannot read running workspaces");
                false
            }
        }
    }

    async fn fire(&self) {
        if !self.nothing_running().await {
            tracing::debug!("workspace started before idle timeout, not idle");
            return;
        }
        let event = ServerIdleEvent {
            timeout_secs: self.timeout.as_secs(),
            timestamp: Utc::now(),
        };
        let receivers = self.events.publish_idle(event);
        tracing::info!(timeout_secs = self.timeout.as_secs(), receivers, "server is idle");
    }
}
