//! Shared fakes for unit tests.
//!
//! Provides canned port implementations so each test file doesn't have to
//! re-define the same boilerplate.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use che_common::RemoteSubscriptionContext;
use che_infra::application::ports::{
    MachineTokenProvider, ReplicatedMap, RunningWorkspaces, WorkspaceStopper,
};
use che_infra::domain::{CacheError, InfrastructureError};
use che_infra::infra::InMemoryReplicatedMap;

// ── Running workspaces ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeRunning {
    ids: Mutex<Vec<String>>,
}

impl FakeRunning {
    pub fn set(&self, ids: &[&str]) {
        *self.ids.lock().unwrap() = ids.iter().map(ToString::to_string).collect();
    }
}

#[async_trait]
impl RunningWorkspaces for FakeRunning {
    async fn running(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.ids.lock().unwrap().clone())
    }
}

// ── Stopper ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingStopper {
    stopped: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingStopper {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkspaceStopper for RecordingStopper {
    async fn stop(&self, workspace_id: &str) -> anyhow::Result<()> {
        self.stopped.lock().unwrap().push(workspace_id.to_string());
        if self.fail {
            anyhow::bail!("runtime unavailable");
        }
        Ok(())
    }
}

/// Holds every stop until `release` is called.
#[derive(Default)]
pub struct GatedStopper {
    gate: tokio::sync::Notify,
    started: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
}

impl GatedStopper {
    pub fn release(&self) {
        self.gate.notify_waiters();
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkspaceStopper for GatedStopper {
    async fn stop(&self, workspace_id: &str) -> anyhow::Result<()> {
        self.started.lock().unwrap().push(workspace_id.to_string());
        self.gate.notified().await;
        self.finished.lock().unwrap().push(workspace_id.to_string());
        Ok(())
    }
}

// ── Machine tokens ────────────────────────────────────────────────────────────

pub struct StaticTokens(pub &'static str);

impl MachineTokenProvider for StaticTokens {
    fn token(&self, workspace_id: &str) -> Result<String, InfrastructureError> {
        Ok(format!("{}-{workspace_id}", self.0))
    }
}

// ── Contended map ─────────────────────────────────────────────────────────────

/// In-memory map where "another node" writes right before conditional
/// writes, so compare-and-swap callers see their expectation go stale.
#[derive(Default)]
pub struct ContendedMap {
    pub inner: InMemoryReplicatedMap,
    queued: Mutex<VecDeque<(String, String)>>,
    endless: bool,
    interference: AtomicUsize,
}

impl ContendedMap {
    /// Applies `writes` one per conditional write, then behaves normally.
    pub fn with_writes(writes: Vec<(String, String)>) -> Self {
        Self {
            queued: Mutex::new(writes.into()),
            ..Self::default()
        }
    }

    /// Replaces the value with fresh subscribers before every conditional
    /// write, forever.
    pub fn endless() -> Self {
        Self {
            endless: true,
            ..Self::default()
        }
    }

    pub fn interference(&self) -> usize {
        self.interference.load(Ordering::SeqCst)
    }

    async fn interfere(&self, key: &str) {
        let next = if self.endless {
            let n = self.interference.load(Ordering::SeqCst);
            let noise = BTreeSet::from([RemoteSubscriptionContext::new(format!("noise-{n}"))]);
            Some((key.to_string(), serde_json::to_string(&noise).unwrap()))
        } else {
            self.queued.lock().unwrap().pop_front()
        };
        if let Some((key, value)) = next {
            self.interference.fetch_add(1, Ordering::SeqCst);
            if self.inner.replace(&key, &value).await.unwrap().is_none() {
                self.inner.put_if_absent(&key, &value).await.unwrap();
            }
        }
    }
}

#[async_trait]
impl ReplicatedMap for ContendedMap {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.get(key).await
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> Result<Option<String>, CacheError> {
        self.interfere(key).await;
        self.inner.put_if_absent(key, value).await
    }

    async fn replace(&self, key: &str, value: &str) -> Result<Option<String>, CacheError> {
        self.inner.replace(key, value).await
    }

    async fn replace_if(&self, key: &str, expected: &str, value: &str) -> Result<bool, CacheError> {
        self.interfere(key).await;
        self.inner.replace_if(key, expected, value).await
    }

    async fn remove(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.remove(key).await
    }

    async fn remove_if(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        self.interfere(key).await;
        self.inner.remove_if(key, expected).await
    }

    async fn entries(&self) -> Result<BTreeMap<String, String>, CacheError> {
        self.inner.entries().await
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await;
    }
}
