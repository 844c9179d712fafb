//! Idle detection timing on a paused clock.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use che_common::{WorkspaceStatus, WorkspaceStatusEvent};
use che_infra::application::idle::{EventService, ServerIdleDetector, WorkspaceIdleFilter};
use tokio::sync::broadcast::error::TryRecvError;

use crate::mocks::{FakeRunning, GatedStopper, RecordingStopper};

const TIMEOUT: Duration = Duration::from_secs(60);

/// Let spawned tasks observe the current (paused) time.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

async fn advance(by: Duration) {
    tokio::time::advance(by).await;
    settle().await;
}

// ── Server idle detector ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn idle_server_is_reported_after_timeout() {
    let events = EventService::new();
    let mut idle = events.subscribe_idle();
    let running = Arc::new(FakeRunning::default());
    let detector = ServerIdleDetector::start(Some(TIMEOUT), running, events.clone()).unwrap();
    assert!(detector.is_scheduled());

    advance(TIMEOUT - Duration::from_secs(1)).await;
    assert_eq!(idle.try_recv().unwrap_err(), TryRecvError::Empty);

    advance(Duration::from_secs(2)).await;
    let event = idle.try_recv().unwrap();
    assert_eq!(event.timeout_secs, 60);
    assert!(!detector.is_scheduled());
}

#[tokio::test(start_paused = true)]
async fn running_workspace_cancels_the_check() {
    let events = EventService::new();
    let mut idle = events.subscribe_idle();
    let running = Arc::new(FakeRunning::default());
    let detector =
        ServerIdleDetector::start(Some(TIMEOUT), running.clone(), events.clone()).unwrap();
    settle().await;

    running.set(&["ws1"]);
    events.publish_status(WorkspaceStatusEvent::new("ws1", WorkspaceStatus::Running));
    settle().await;
    assert!(!detector.is_scheduled());

    advance(TIMEOUT * 2).await;
    assert_eq!(idle.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test(start_paused = true)]
async fn last_stop_rearms_the_check() {
    let events = EventService::new();
    let mut idle = events.subscribe_idle();
    let running = Arc::new(FakeRunning::default());
    running.set(&["ws1", "ws2"]);
    let detector =
        ServerIdleDetector::start(Some(TIMEOUT), running.clone(), events.clone()).unwrap();
    settle().await;
    events.publish_status(WorkspaceStatusEvent::new("ws1", WorkspaceStatus::Running));
    settle().await;

    running.set(&["ws2"]);
    events.publish_status(WorkspaceStatusEvent::new("ws1", WorkspaceStatus::Stopped));
    settle().await;
    assert!(!detector.is_scheduled(), "ws2 still runs");

    running.set(&[]);
    events.publish_status(WorkspaceStatusEvent::new("ws2", WorkspaceStatus::Stopped));
    settle().await;
    assert!(detector.is_scheduled());

    advance(TIMEOUT + Duration::from_secs(1)).await;
    assert!(idle.try_recv().is_ok());
}

#[tokio::test(start_paused = true)]
async fn running_set_is_rechecked_when_the_timer_fires() {
    let events = EventService::new();
    let mut idle = events.subscribe_idle();
    let running = Arc::new(FakeRunning::default());
    let _detector =
        ServerIdleDetector::start(Some(TIMEOUT), running.clone(), events.clone()).unwrap();
    settle().await;

    // Started on another node; no local event was seen.
    running.set(&["ws1"]);
    advance(TIMEOUT + Duration::from_secs(1)).await;
    assert_eq!(idle.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test(start_paused = true)]
async fn disabled_detector_never_fires() {
    let events = EventService::new();
    let mut idle = events.subscribe_idle();
    let detector =
        ServerIdleDetector::start(None, Arc::new(FakeRunning::default()), events.clone()).unwrap();
    assert!(!detector.is_scheduled());
    advance(Duration::from_secs(3600)).await;
    assert_eq!(idle.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test(start_paused = true)]
async fn shutdown_aborts_pending_check() {
    let events = EventService::new();
    let mut idle = events.subscribe_idle();
    let detector =
        ServerIdleDetector::start(Some(TIMEOUT), Arc::new(FakeRunning::default()), events.clone())
            .unwrap();
    detector.shutdown();
    detector.shutdown();
    advance(TIMEOUT * 2).await;
    assert_eq!(idle.try_recv().unwrap_err(), TryRecvError::Empty);
}

// ── Workspace idle filter ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn quiet_workspace_is_stopped_once() {
    let stopper = Arc::new(RecordingStopper::default());
    let filter = WorkspaceIdleFilter::new("ws1", TIMEOUT, stopper.clone()).unwrap();

    advance(TIMEOUT + Duration::from_secs(1)).await;
    assert_eq!(stopper.calls(), ["ws1"]);
    assert!(filter.is_stopped());

    filter.record_activity();
    advance(TIMEOUT * 2).await;
    assert_eq!(stopper.calls(), ["ws1"], "stopped filter stays stopped");
}

#[tokio::test(start_paused = true)]
async fn activity_pushes_the_stop_back() {
    let stopper = Arc::new(RecordingStopper::default());
    let filter = WorkspaceIdleFilter::new("ws1", TIMEOUT, stopper.clone()).unwrap();

    for _ in 0..5 {
        advance(TIMEOUT / 2).await;
        filter.record_activity();
    }
    assert!(stopper.calls().is_empty());
    assert!(!filter.is_stopped());

    advance(TIMEOUT + Duration::from_secs(1)).await;
    assert_eq!(stopper.calls(), ["ws1"]);
}

#[tokio::test(start_paused = true)]
async fn activity_during_the_stop_does_not_cancel_it() {
    let stopper = Arc::new(GatedStopper::default());
    let filter = WorkspaceIdleFilter::new("ws1", TIMEOUT, stopper.clone()).unwrap();

    advance(TIMEOUT + Duration::from_secs(1)).await;
    assert_eq!(stopper.started(), vec!["ws1"]);
    assert!(filter.is_stopped());

    filter.record_activity();
    settle().await;
    stopper.release();
    settle().await;
    assert_eq!(stopper.finished(), vec!["ws1"]);

    advance(TIMEOUT * 2).await;
    assert_eq!(stopper.started(), vec!["ws1"], "stop is not re-armed");
}

#[tokio::test(start_paused = true)]
async fn failed_stop_still_ends_the_filter() {
    let stopper = Arc::new(RecordingStopper::failing());
    let filter = WorkspaceIdleFilter::new("ws1", TIMEOUT, stopper.clone()).unwrap();
    advance(TIMEOUT + Duration::from_secs(1)).await;
    assert_eq!(stopper.calls(), ["ws1"]);
    assert!(filter.is_stopped());
}

#[tokio::test(start_paused = true)]
async fn filter_shutdown_prevents_the_stop() {
    let stopper = Arc::new(RecordingStopper::default());
    let filter = WorkspaceIdleFilter::new("ws1", TIMEOUT, stopper.clone()).unwrap();
    filter.shutdown();
    advance(TIMEOUT * 2).await;
    assert!(stopper.calls().is_empty());
    assert!(!filter.is_stopped());
}

#[test]
fn filter_needs_a_runtime() {
    let stopper = Arc::new(RecordingStopper::default());
    assert!(WorkspaceIdleFilter::new("ws1", TIMEOUT, stopper).is_err());
}
