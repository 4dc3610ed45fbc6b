//! Connection manager facade

use std::sync::Arc;
use std::time::Duration;

use datalink_sources::{ConnectorRegistry, SourceConnector, SourceDescriptor, SourceType};

use crate::direct::DirectConnectionFactory;
use crate::error::{ConnError, Result};
use crate::handle::ConnectionHandle;
use crate::pool::PoolRegistry;
use crate::reaper::SessionReaper;
use crate::session::SessionConnectionCache;

/// Dependency-injected aggregate owning the full connection lifecycle:
/// connector lookup, pooled and direct acquisition, the session cache, and
/// its reaper. Construct one and hand it to whatever server or request
/// layer needs connections; there are no process-level statics.
pub struct ConnectionManager {
    connectors: ConnectorRegistry,
    pools: PoolRegistry,
    sessions: Arc<SessionConnectionCache>,
    reaper: SessionReaper,
}

impl ConnectionManager {
    /// Requires a running tokio runtime: the session reaper is spawned here.
    pub fn new() -> Self {
        let sessions = Arc::new(SessionConnectionCache::new());
        let reaper = SessionReaper::spawn(sessions.clone());
        Self {
            connectors: ConnectorRegistry::new(),
            pools: PoolRegistry::new(),
            sessions,
            reaper,
        }
    }

    pub fn register_connector(&self, connector: Arc<dyn SourceConnector>) -> Result<()> {
        self.connectors.register(connector).map_err(ConnError::from)
    }

    pub fn sessions(&self) -> &SessionConnectionCache {
        &self.sessions
    }

    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    /// Obtain a connection for `source`, routed per the eligibility gate:
    /// pooled when pool settings are present and no Kerberos configuration
    /// is attached, direct otherwise.
    pub async fn get_or_create_connection(
        &self,
        source: &SourceDescriptor,
    ) -> Result<ConnectionHandle> {
        source.validate()?;
        let connector = self.connector_for(source.source_type)?;
        if PoolRegistry::pooling_eligible(source) {
            self.pools.get_or_create(connector, source).await
        } else {
            DirectConnectionFactory::open(connector.as_ref(), source).await
        }
    }

    /// Open, probe, and unconditionally close a direct connection.
    pub async fn test_connection(&self, source: &SourceDescriptor) -> Result<bool> {
        source.validate()?;
        let connector = self.connector_for(source.source_type)?;
        DirectConnectionFactory::test_connection(connector.as_ref(), source).await
    }

    /// Cache `connection` under `session_key` for multi-step reuse.
    pub fn add_key(
        &self,
        session_key: &str,
        connection: ConnectionHandle,
        ttl: Duration,
    ) -> Arc<ConnectionHandle> {
        self.sessions.add_key(session_key, connection, ttl)
    }

    pub fn is_contain_session_key(&self, session_key: &str) -> bool {
        self.sessions.is_contain_session_key(session_key)
    }

    pub fn get_connection(&self, session_key: &str) -> Option<Arc<ConnectionHandle>> {
        self.sessions.get_connection(session_key)
    }

    pub async fn clear_key(&self, session_key: &str) -> Result<()> {
        self.sessions.clear_key(session_key).await
    }

    pub async fn clear_key_filtered(
        &self,
        session_key: &str,
        source_type: Option<SourceType>,
        check_expiry: bool,
    ) -> Result<()> {
        self.sessions
            .clear_key_filtered(session_key, source_type, check_expiry)
            .await
    }

    /// Stop the reaper and tear down every cached session. Pools are left to
    /// die with the process.
    pub async fn shutdown(self) -> usize {
        self.reaper.shutdown_and_close().await
    }

    fn connector_for(&self, source_type: SourceType) -> Result<Arc<dyn SourceConnector>> {
        self.connectors
            .get(source_type)
            .ok_or(ConnError::UnknownSourceType(source_type))
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
