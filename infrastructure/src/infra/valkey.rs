//! `ReplicatedMap` backed by one Valkey hash, with optional mTLS via rustls.
//!
//! Conditional writes run as Lua scripts so each is atomic on the server.
//! With `min_replicas > 0` every applied write waits for that many replica
//! acknowledgements before returning.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use che_common::{ReplicationConfig, TlsPaths};
use fred::prelude::*;
use fred::types::FromValue;
use fred::types::config::{TlsConfig, TlsConnector, TlsHostMapping};

use crate::application::ports::ReplicatedMap;
use crate::domain::CacheError;

// ── Scripts ──────────────────────────────────────────────────────────────────

const PUT_IF_ABSENT: &str = r"
local current = redis.call('HGET', KEYS[1], ARGV[1])
if current then return current end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
return false
";

const REPLACE: &str = r"
local current = redis.call('HGET', KEYS[1], ARGV[1])
if current then redis.call('HSET', KEYS[1], ARGV[1], ARGV[2]) end
return current
";

const REPLACE_IF: &str = r"
if redis.call('HGET', KEYS[1], ARGV[1]) == ARGV[2] then
  redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
  return 1
end
return 0
";

const REMOVE: &str = r"
local current = redis.call('HGET', KEYS[1], ARGV[1])
if current then redis.call('HDEL', KEYS[1], ARGV[1]) end
return current
";

const REMOVE_IF: &str = r"
if redis.call('HGET', KEYS[1], ARGV[1]) == ARGV[2] then
  redis.call('HDEL', KEYS[1], ARGV[1])
  return 1
end
return 0
";

// ── Map ──────────────────────────────────────────────────────────────────────

/// One Valkey hash seen as a replicated map. Clones share the connection
/// and the handle; [`ValkeyReplicatedMap::scoped`] shares only the connection.
#[derive(Clone)]
pub struct ValkeyReplicatedMap {
    client: Client,
    hash_key: String,
    min_replicas: u32,
    replication_timeout: Duration,
    lease: Arc<Lease>,
}

/// One handle on a shared connection. The connection closes with the last
/// open handle.
#[derive(Debug)]
struct Lease {
    closed: AtomicBool,
    open: Arc<AtomicUsize>,
}

impl Lease {
    fn first() -> Self {
        Self {
            closed: AtomicBool::new(false),
            open: Arc::new(AtomicUsize::new(1)),
        }
    }

    fn share(&self) -> Self {
        self.open.fetch_add(1, Ordering::AcqRel);
        Self {
            closed: AtomicBool::new(false),
            open: Arc::clone(&self.open),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close this handle. Returns true when it was the last open one.
    fn release(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.open.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

fn replication_error(e: &fred::error::Error) -> CacheError {
    CacheError::Replication(e.to_string())
}

fn load_tls(paths: &TlsPaths) -> anyhow::Result<TlsConfig> {
    let ca_file = File::open(&paths.ca)
        .with_context(|| format!("failed to open CA cert: {}", paths.ca.display()))?;
    let ca_certs = rustls_pemfile::certs(&mut BufReader::new(ca_file))
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse CA cert")?;
    let mut root_store = rustls::RootCertStore::empty();
    for cert in ca_certs {
        root_store
            .add(cert)
            .context("failed to add CA cert to root store")?;
    }

    let cert_file = File::open(&paths.cert)
        .with_context(|| format!("failed to open client cert: {}", paths.cert.display()))?;
    let client_certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse client cert")?;

    let key_file = File::open(&paths.key)
        .with_context(|| format!("failed to open client key: {}", paths.key.display()))?;
    let client_key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .context("failed to parse client key")?
        .context("no private key found in file")?;

    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_client_auth_cert(client_certs, client_key)
        .context("failed to build TLS config with client auth")?;

    Ok(TlsConfig {
        connector: TlsConnector::Rustls(Arc::new(tls_config).into()),
        hostnames: TlsHostMapping::None,
    })
}

impl ValkeyReplicatedMap {
    /// Connect and join within `join_timeout_ms`.
    ///
    /// # Errors
    ///
    /// [`CacheError::JoinTimeout`] when the join does not finish in time,
    /// [`CacheError::ChannelCreation`] for any other connection failure.
    pub async fn connect(
        config: &ReplicationConfig,
        hash_key: impl Into<String>,
    ) -> Result<Self, CacheError> {
        let mut fred_config =
            Config::from_url(&config.url).map_err(|e| CacheError::ChannelCreation(e.to_string()))?;
        if let Some(paths) = &config.tls {
            let tls = load_tls(paths).map_err(|e| CacheError::ChannelCreation(format!("{e:#}")))?;
            fred_config.tls = Some(tls);
        }
        fred_config.username.clone_from(&config.username);
        fred_config.password.clone_from(&config.password);

        let join_timeout = Duration::from_millis(config.join_timeout_ms);
        let client = Builder::from_config(fred_config)
            .with_connection_config(|conn_config| {
                conn_config.connection_timeout = join_timeout;
                conn_config.internal_command_timeout = join_timeout;
            })
            .set_policy(ReconnectPolicy::new_exponential(0, 100, 5000, 5))
            .build()
            .map_err(|e| CacheError::ChannelCreation(e.to_string()))?;

        let joined = async {
            client.init().await?;
            client.ping::<String>(None).await
        };
        match tokio::time::timeout(join_timeout, joined).await {
            Err(_) => {
                return Err(CacheError::JoinTimeout {
                    timeout: join_timeout,
                });
            }
            Ok(Err(e)) => return Err(CacheError::ChannelCreation(e.to_string())),
            Ok(Ok(_)) => {}
        }

        let hash_key = hash_key.into();
        tracing::info!(
            url = %config.url,
            hash_key = %hash_key,
            tls_enabled = config.tls.is_some(),
            min_replicas = config.min_replicas,
            "joined replicated cache"
        );
        Ok(Self {
            client,
            hash_key,
            min_replicas: config.min_replicas,
            replication_timeout: Duration::from_millis(config.replication_timeout_ms),
            lease: Arc::new(Lease::first()),
        })
    }

    /// Another hash over the same connection, with its own handle. Shutting
    /// it down leaves the other handles usable.
    #[must_use]
    pub fn scoped(&self, hash_key: impl Into<String>) -> Self {
        Self {
            hash_key: hash_key.into(),
            lease: Arc::new(self.lease.share()),
            ..self.clone()
        }
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.lease.is_closed() {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }

    async fn script<R: FromValue>(
        &self,
        script: &'static str,
        args: Vec<&str>,
    ) -> Result<R, CacheError> {
        self.ensure_open()?;
        self.client
            .eval(script, vec![self.hash_key.as_str()], args)
            .await
            .map_err(|e| replication_error(&e))
    }

    /// Block until enough replicas acknowledged the last write.
    async fn await_replicas(&self) -> Result<(), CacheError> {
        if self.min_replicas == 0 {
            return Ok(());
        }
        let timeout_ms = i64::try_from(self.replication_timeout.as_millis()).unwrap_or(i64::MAX);
        let acknowledged: i64 = self
            .client
            .custom(
                fred::cmd!("WAIT", blocking: true),
                vec![i64::from(self.min_replicas), timeout_ms],
            )
            .await
            .map_err(|e| replication_error(&e))?;
        if acknowledged < i64::from(self.min_replicas) {
            tracing::warn!(
                hash_key = %self.hash_key,
                acknowledged,
                required = self.min_replicas,
                "write not replicated in time"
            );
            return Err(CacheError::ReplicationTimeout {
                acknowledged,
                required: self.min_replicas,
            });
        }
        Ok(())
    }

    async fn replicated<T>(&self, value: T, applied: bool) -> Result<T, CacheError> {
        if applied {
            self.await_replicas().await?;
        }
        Ok(value)
    }
}

#[async_trait]
impl ReplicatedMap for ValkeyReplicatedMap {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.ensure_open()?;
        self.client
            .hget(&self.hash_key, key)
            .await
            .map_err(|e| replication_error(&e))
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> Result<Option<String>, CacheError> {
        let existing: Option<String> = self.script(PUT_IF_ABSENT, vec![key, value]).await?;
        let applied = existing.is_none();
        self.replicated(existing, applied).await
    }

    async fn replace(&self, key: &str, value: &str) -> Result<Option<String>, CacheError> {
        let previous: Option<String> = self.script(REPLACE, vec![key, value]).await?;
        let applied = previous.is_some();
        self.replicated(previous, applied).await
    }

    async fn replace_if(&self, key: &str, expected: &str, value: &str) -> Result<bool, CacheError> {
        let swapped: i64 = self.script(REPLACE_IF, vec![key, expected, value]).await?;
        self.replicated(swapped == 1, swapped == 1).await
    }

    async fn remove(&self, key: &str) -> Result<Option<String>, CacheError> {
        let previous: Option<String> = self.script(REMOVE, vec![key]).await?;
        let applied = previous.is_some();
        self.replicated(previous, applied).await
    }

    async fn remove_if(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        let removed: i64 = self.script(REMOVE_IF, vec![key, expected]).await?;
        self.replicated(removed == 1, removed == 1).await
    }

    async fn entries(&self) -> Result<BTreeMap<String, String>, CacheError> {
        self.ensure_open()?;
        let all: HashMap<String, String> = self
            .client
            .hgetall(&self.hash_key)
            .await
            .map_err(|e| replication_error(&e))?;
        Ok(all.into_iter().collect())
    }

    async fn shutdown(&self) {
        if self.lease.is_closed() {
            return;
        }
        if !self.lease.release() {
            tracing::debug!(hash_key = %self.hash_key, "released replicated cache handle");
            return;
        }
        match self.client.quit().await {
            Ok(()) => tracing::info!(hash_key = %self.hash_key, "left replicated cache"),
            Err(e) => {
                tracing::warn!(hash_key = %self.hash_key, error = %e, "error leaving replicated cache");
            }
        }
    }
}
