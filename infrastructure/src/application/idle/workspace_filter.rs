use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::application::ports::WorkspaceStopper;

/// Stops a workspace after its agent has seen no request for `timeout`.
///
/// Once the stop has been requested the filter stays stopped; later
/// activity no longer re-arms the timer.
pub struct WorkspaceIdleFilter {
    workspace_id: String,
    timeout: Duration,
    stopper: Arc<dyn WorkspaceStopper>,
    stopped: Arc<AtomicBool>,
    runtime: Handle,
    timer: Arc<Mutex<Timer>>,
}

/// The armed stop task. `generation` changes whenever the task is replaced
/// or cancelled; a task only fires while it is still the current one.
#[derive(Default)]
struct Timer {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

fn lock(timer: &Mutex<Timer>) -> MutexGuard<'_, Timer> {
    timer.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorkspaceIdleFilter {
    /// Create the filter and arm the first timer.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a Tokio runtime.
    pub fn new(
        workspace_id: impl Into<String>,
        timeout: Duration,
        stopper: Arc<dyn WorkspaceStopper>,
    ) -> Result<Arc<Self>> {
        let runtime = Handle::try_current().context("workspace idle filter needs a Tokio runtime")?;
        let filter = Arc::new(Self {
            workspace_id: workspace_id.into(),
            timeout,
            stopper,
            stopped: Arc::new(AtomicBool::new(false)),
            runtime,
            timer: Arc::new(Mutex::new(Timer::default())),
        });
        filter.reschedule();
        tracing::info!(
            workspace_id = %filter.workspace_id,
            timeout_secs = timeout.as_secs(),
            "workspace idle filter armed"
        );
        Ok(filter)
    }

    /// Push the stop back by a full timeout. No-op once stopped.
    pub fn record_activity(&self) {
        if self.is_stopped() {
            return;
        }
        self.reschedule();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Abort the pending timer without stopping the workspace.
    pub fn shutdown(&self) {
        let mut timer = lock(&self.timer);
        timer.generation += 1;
        if let Some(task) = timer.task.take() {
            task.abort();
        }
    }

    /// Replace the armed task. The stopped flag is only set under the timer
    /// lock, so a task that already committed to stopping is never aborted.
    fn reschedule(&self) {
        let mut timer = lock(&self.timer);
        if self.is_stopped() {
            return;
        }
        timer.generation += 1;
        let generation = timer.generation;

        let timeout = self.timeout;
        let deadline = Instant::now() + timeout;
        let workspace_id = self.workspace_id.clone();
        let stopper = Arc::clone(&self.stopper);
        let stopped = Arc::clone(&self.stopped);
        let state = Arc::clone(&self.timer);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            {
                let current = lock(&state);
                if current.generation != generation || stopped.swap(true, Ordering::AcqRel) {
                    return;
                }
            }
            tracing::info!(
                %workspace_id,
                timeout_secs = timeout.as_secs(),
                "workspace idle, stopping"
            );
            if let Err(e) = stopper.stop(&workspace_id).await {
                tracing::error!(%workspace_id, error = %e, "failed to stop idle workspace");
            }
        });
        if let Some(previous) = timer.task.replace(task) {
            previous.abort();
        }
    }
}

impl Drop for WorkspaceIdleFilter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// axum middleware counting every request as workspace activity.
pub async fn track_activity(
    State(filter): State<Arc<WorkspaceIdleFilter>>,
    request: Request,
    next: Next,
) -> Response {
    filter.record_activity();
    next.run(request).await
}

/// Agent endpoints: `GET /health` and `POST /activity`, both counted as
/// activity.
pub fn agent_router(filter: Arc<WorkspaceIdleFilter>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/activity", post(|| async { StatusCode::NO_CONTENT }))
        .layer(middleware::from_fn_with_state(filter, track_activity))
}

async fn health() -> &'static str {
    "ok"
}
