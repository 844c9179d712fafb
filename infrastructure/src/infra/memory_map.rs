//! Process-local `ReplicatedMap` for single-node runs and tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::application::ports::ReplicatedMap;
use crate::domain::CacheError;

/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReplicatedMap {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
    closed: Arc<AtomicBool>,
}

impl InMemoryReplicatedMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn open(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>, CacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(self.entries.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl ReplicatedMap for InMemoryReplicatedMap {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.open()?.get(key).cloned())
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.open()?;
        if let Some(existing) = entries.get(key) {
            return Ok(Some(existing.clone()));
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(None)
    }

    async fn replace(&self, key: &str, value: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .open()?
            .get_mut(key)
            .map(|current| std::mem::replace(current, value.to_string())))
    }

    async fn replace_if(&self, key: &str, expected: &str, value: &str) -> Result<bool, CacheError> {
        let mut entries = self.open()?;
        match entries.get_mut(key) {
            Some(current) if current == expected => {
                *current = value.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.open()?.remove(key))
    }

    async fn remove_if(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        let mut entries = self.open()?;
        if entries.get(key).is_some_and(|current| current == expected) {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn entries(&self) -> Result<BTreeMap<String, String>, CacheError> {
        Ok(self.open()?.clone())
    }

    async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("in-memory map closed");
        }
    }
}
