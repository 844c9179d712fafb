//! Cluster-wide storage of remote event subscriptions.
//!
//! Each method maps to the set of subscribed endpoint contexts, stored as one
//! JSON array value. A per-method local lock serialises writers on this node;
//! compare-and-swap against the replicated map keeps writers on other nodes
//! from losing updates.

use std::collections::{BTreeSet, HashSet};

use che_common::{RemoteSubscriptionContext, validate_field};

use crate::application::locks::KeyedLocks;
use crate::application::ports::ReplicatedMap;
use crate::domain::CacheError;

/// Attempts before a contended update gives up.
const MAX_CAS_ATTEMPTS: usize = 16;

type Subscribers = BTreeSet<RemoteSubscriptionContext>;

pub struct RemoteSubscriptionStorage<M> {
    map: M,
    locks: KeyedLocks,
}

fn check_method(method: &str) -> Result<(), CacheError> {
    validate_field(method).map_err(|reason| CacheError::InvalidField {
        field: method.to_string(),
        reason,
    })
}

fn decode(method: &str, raw: &str) -> Result<Subscribers, CacheError> {
    serde_json::from_str(raw).map_err(|e| CacheError::Serialization {
        key: method.to_string(),
        reason: e.to_string(),
    })
}

fn encode(method: &str, subscribers: &Subscribers) -> Result<String, CacheError> {
    serde_json::to_string(subscribers).map_err(|e| CacheError::Serialization {
        key: method.to_string(),
        reason: e.to_string(),
    })
}

/// Outcome of applying a mutation to the current subscriber set.
enum Update {
    Unchanged,
    Store(Subscribers),
    Delete,
}

impl<M: ReplicatedMap> RemoteSubscriptionStorage<M> {
    pub fn new(map: M) -> Self {
        Self {
            map,
            locks: KeyedLocks::new(),
        }
    }

    /// Subscribers of `method`; empty when there are none.
    pub async fn get_by_method(
        &self,
        method: &str,
    ) -> Result<HashSet<RemoteSubscriptionContext>, CacheError> {
        check_method(method)?;
        match self.map.get(method).await? {
            Some(raw) => Ok(decode(method, &raw)?.into_iter().collect()),
            None => Ok(HashSet::new()),
        }
    }

    pub async fn add_subscription(
        &self,
        method: &str,
        context: RemoteSubscriptionContext,
    ) -> Result<(), CacheError> {
        self.update(method, |mut subscribers| {
            if subscribers.insert(context.clone()) {
                Update::Store(subscribers)
            } else {
                Update::Unchanged
            }
        })
        .await?;
        tracing::debug!(method, endpoint_id = %context.endpoint_id, "subscription added");
        Ok(())
    }

    /// Drop every subscription of `endpoint_id` to `method`. Removing the last
    /// subscriber deletes the entry.
    pub async fn remove_subscription(&self, method: &str, endpoint_id: &str) -> Result<(), CacheError> {
        self.update(method, |mut subscribers| {
            let before = subscribers.len();
            subscribers.retain(|ctx| ctx.endpoint_id != endpoint_id);
            if subscribers.len() == before {
                Update::Unchanged
            } else if subscribers.is_empty() {
                Update::Delete
            } else {
                Update::Store(subscribers)
            }
        })
        .await?;
        tracing::debug!(method, endpoint_id, "subscription removed");
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.map.shutdown().await;
    }

    /// Read-modify-write of one method's set under its lock, retried while
    /// another node changes the value underneath.
    async fn update(
        &self,
        method: &str,
        mutate: impl Fn(Subscribers) -> Update,
    ) -> Result<(), CacheError> {
        check_method(method)?;
        let _guard = self.locks.lock(method).await;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.map.get(method).await?;
            let subscribers = match &current {
                Some(raw) => decode(method, raw)?,
                None => Subscribers::new(),
            };
            let applied = match (mutate(subscribers), current) {
                (Update::Unchanged, _) | (Update::Delete, None) => true,
                (Update::Store(next), None) => {
                    let value = encode(method, &next)?;
                    self.map.put_if_absent(method, &value).await?.is_none()
                }
                (Update::Store(next), Some(raw)) => {
                    let value = encode(method, &next)?;
                    self.map.replace_if(method, &raw, &value).await?
                }
                (Update::Delete, Some(raw)) => self.map.remove_if(method, &raw).await?,
            };
            if applied {
                return Ok(());
            }
            tracing::debug!(method, attempt, "subscription set changed concurrently, retrying");
        }
        Err(CacheError::Replication(format!(
            "subscriptions of '{method}' kept changing; gave up after {MAX_CAS_ATTEMPTS} attempts"
        )))
    }
}
