//! Pooled connections keyed by source identity
//!
//! One deadpool instance per [`SourceIdentity`], created lazily on first
//! request and shared by every caller for the life of the process. Pool
//! mechanics (sizing, checkout waits) are deadpool's; this module supplies
//! the manager bridging a source connector and the identity-keyed registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use deadpool::managed::{self, Metrics, Pool, PoolError, RecycleError, RecycleResult, Timeouts};
use deadpool::Runtime;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use datalink_sources::{PoolSettings, SourceConnection, SourceConnector, SourceDescriptor};

use crate::error::{ConnError, Result};
use crate::handle::ConnectionHandle;
use crate::keying::SourceIdentity;

/// deadpool manager backed by a source connector.
pub struct PoolManager {
    connector: Arc<dyn SourceConnector>,
    source: SourceDescriptor,
    settings: PoolSettings,
}

impl managed::Manager for PoolManager {
    type Type = Box<dyn SourceConnection>;
    type Error = ConnError;

    async fn create(&self) -> std::result::Result<Self::Type, Self::Error> {
        debug!("opening pooled connection to {}", self.source.endpoint);
        self.connector
            .open_direct(&self.source)
            .await
            .map_err(ConnError::from)
    }

    /// deadpool has no native idle-timeout or max-lifetime knobs; both are
    /// enforced here on checkout, alongside the liveness probe.
    async fn recycle(&self, connection: &mut Self::Type, metrics: &Metrics) -> RecycleResult<Self::Error> {
        if metrics.age() > self.settings.max_lifetime() {
            return Err(RecycleError::Message("max lifetime exceeded".into()));
        }
        if metrics.last_used() > self.settings.idle_timeout() {
            return Err(RecycleError::Message("idle timeout exceeded".into()));
        }
        if !connection.is_valid().await {
            return Err(RecycleError::Message("liveness probe failed".into()));
        }
        Ok(())
    }
}

pub type SourcePool = Pool<PoolManager>;
pub(crate) type PooledObject = managed::Object<PoolManager>;

/// Identity-keyed registry of live pools. Pools are never torn down before
/// process exit; individual connections come and go through their pool.
pub struct PoolRegistry {
    pools: DashMap<String, SourcePool>,
    create_lock: Mutex<()>,
    created: AtomicUsize,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
            create_lock: Mutex::new(()),
            created: AtomicUsize::new(0),
        }
    }

    /// Pooling is used only when the descriptor carries pool settings and no
    /// Kerberos configuration: credentialed Kerberos sessions must not be
    /// shared across principal contexts.
    pub fn pooling_eligible(source: &SourceDescriptor) -> bool {
        source.pool.is_some() && source.kerberos.is_none()
    }

    /// Check a connection out of the pool for this descriptor's identity,
    /// creating the pool first if this identity has never been seen.
    pub async fn get_or_create(
        &self,
        connector: Arc<dyn SourceConnector>,
        source: &SourceDescriptor,
    ) -> Result<ConnectionHandle> {
        let settings = source.pool.clone().ok_or_else(|| {
            ConnError::Configuration("pool settings required for a pooled connection".to_string())
        })?;
        let identity = SourceIdentity::from_descriptor(source);
        let pool = self.pool_for(&identity, connector, source, &settings)?;

        match pool.get().await {
            Ok(object) => Ok(ConnectionHandle::pooled(
                source.source_type,
                source.endpoint.clone(),
                object,
            )),
            Err(e) => Err(map_pool_error(&source.endpoint, &settings, e)),
        }
    }

    /// Double-checked creation: an unlocked read first, then the creation
    /// lock, a re-check, build, publish. Exactly one pool per identity even
    /// under concurrent first requests.
    fn pool_for(
        &self,
        identity: &SourceIdentity,
        connector: Arc<dyn SourceConnector>,
        source: &SourceDescriptor,
        settings: &PoolSettings,
    ) -> Result<SourcePool> {
        let key = identity.as_key();
        if let Some(pool) = self.pools.get(&key) {
            debug!("reusing connection pool for {identity}");
            return Ok(pool.clone());
        }

        let _guard = self.create_lock.lock();
        if let Some(pool) = self.pools.get(&key) {
            return Ok(pool.clone());
        }

        info!(
            "creating connection pool for {identity} (max {})",
            settings.maximum_pool_size
        );
        let manager = PoolManager {
            connector,
            source: source.clone(),
            settings: settings.clone(),
        };
        let pool = build_pool(manager, settings)?;
        self.pools.insert(key, pool.clone());
        self.created.fetch_add(1, Ordering::SeqCst);

        if settings.minimum_idle > 0 {
            tokio::spawn(prewarm(pool.clone(), settings.minimum_idle));
        }
        Ok(pool)
    }

    /// Number of live pools.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Total pools constructed over the registry's lifetime.
    pub fn pools_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Current size of every pool, keyed by identity string.
    pub fn stats(&self) -> HashMap<String, usize> {
        self.pools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status().size))
            .collect()
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn build_pool(manager: PoolManager, settings: &PoolSettings) -> Result<SourcePool> {
    let timeouts = Timeouts {
        wait: Some(settings.connection_timeout()),
        create: Some(settings.connection_timeout()),
        recycle: Some(settings.connection_timeout()),
    };
    Pool::builder(manager)
        .max_size(settings.maximum_pool_size)
        .timeouts(timeouts)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| ConnError::Configuration(format!("failed to build connection pool: {e}")))
}

fn map_pool_error(
    endpoint: &str,
    settings: &PoolSettings,
    err: PoolError<ConnError>,
) -> ConnError {
    match err {
        PoolError::Timeout(_) => ConnError::AcquisitionTimeout {
            endpoint: endpoint.to_string(),
            waited_ms: settings.connection_timeout_ms,
        },
        PoolError::Backend(e) => ConnError::Acquisition {
            endpoint: endpoint.to_string(),
            source: Box::new(e),
        },
        other => ConnError::Acquisition {
            endpoint: endpoint.to_string(),
            source: other.to_string().into(),
        },
    }
}

/// Open `count` connections and return them idle, approximating a
/// minimum-idle floor at pool creation.
async fn prewarm(pool: SourcePool, count: usize) {
    let mut warmed = Vec::with_capacity(count);
    for _ in 0..count {
        match pool.get().await {
            Ok(object) => warmed.push(object),
            Err(e) => {
                warn!("pool prewarm stopped early: {e}");
                break;
            }
        }
    }
    debug!("prewarmed {} pooled connections", warmed.len());
}
