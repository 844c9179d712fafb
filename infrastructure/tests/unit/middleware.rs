//! Agent router: every request counts as workspace activity.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use che_infra::application::idle::{WorkspaceIdleFilter, agent_router};
use tower::ServiceExt;

use crate::mocks::RecordingStopper;

const TIMEOUT: Duration = Duration::from_secs(30);

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn health_answers_ok() {
    let filter = WorkspaceIdleFilter::new("ws1", TIMEOUT, Arc::new(RecordingStopper::default()))
        .unwrap();
    let response = agent_router(filter).oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn requests_keep_the_workspace_alive() {
    let stopper = Arc::new(RecordingStopper::default());
    let filter = WorkspaceIdleFilter::new("ws1", TIMEOUT, stopper.clone()).unwrap();

    for _ in 0..4 {
        tokio::time::advance(TIMEOUT / 2).await;
        let response = agent_router(filter.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/activity")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
    assert!(stopper.calls().is_empty());
    assert!(!filter.is_stopped());
}

#[tokio::test(start_paused = true)]
async fn health_probe_just_before_timeout_defers_the_stop() {
    let stopper = Arc::new(RecordingStopper::default());
    let filter = WorkspaceIdleFilter::new("ws1", TIMEOUT, stopper.clone()).unwrap();

    tokio::time::advance(TIMEOUT - Duration::from_secs(1)).await;
    agent_router(filter.clone())
        .oneshot(get("/health"))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    assert!(stopper.calls().is_empty());

    tokio::time::advance(TIMEOUT).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    assert_eq!(stopper.calls(), ["ws1"]);
}
