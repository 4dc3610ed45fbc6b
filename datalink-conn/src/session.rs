//! Session-keyed connection cache
//!
//! The process-wide registry of live connections addressable by an opaque,
//! caller-chosen session key. Each entry carries an absolute expiry stamp;
//! the reaper sweeps expired entries, callers tear down explicitly with
//! `clear_key`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use datalink_sources::SourceType;

use crate::error::{ConnError, Result};
use crate::handle::ConnectionHandle;

struct SessionEntry {
    connection: Arc<ConnectionHandle>,
    timeout_stamp: Instant,
}

impl SessionEntry {
    fn is_expired(&self) -> bool {
        Instant::now() > self.timeout_stamp
    }
}

/// Thread-safe under arbitrary concurrent callers. Reads never block
/// writers; per-key removal is atomic, so a given entry is closed exactly
/// once no matter how many callers race on it.
#[derive(Default)]
pub struct SessionConnectionCache {
    sessions: DashMap<String, SessionEntry>,
}

impl SessionConnectionCache {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Fresh opaque session key. Keys are caller-chosen; this is merely a
    /// convenient source of unique ones.
    pub fn allocate_session_key() -> String {
        Uuid::new_v4().to_string()
    }

    /// Insert-or-replace under `session_key`, expiring `ttl` from now.
    ///
    /// A previous entry under the same key is displaced, NOT closed: the
    /// caller that replaces a key still owns the old connection's teardown.
    /// Use [`replace_key`](Self::replace_key) to have the displaced
    /// connection closed here instead.
    pub fn add_key(
        &self,
        session_key: impl Into<String>,
        connection: ConnectionHandle,
        ttl: Duration,
    ) -> Arc<ConnectionHandle> {
        let key = session_key.into();
        let connection = Arc::new(connection);
        debug!("caching session {key} (ttl {ttl:?})");
        self.sessions.insert(
            key,
            SessionEntry {
                connection: connection.clone(),
                timeout_stamp: Instant::now() + ttl,
            },
        );
        connection
    }

    /// Insert-or-replace that also closes the displaced connection, for
    /// callers that do not track the old entry themselves.
    pub async fn replace_key(
        &self,
        session_key: impl Into<String>,
        connection: ConnectionHandle,
        ttl: Duration,
    ) -> Result<Arc<ConnectionHandle>> {
        let key = session_key.into();
        let connection = Arc::new(connection);
        let displaced = self.sessions.insert(
            key.clone(),
            SessionEntry {
                connection: connection.clone(),
                timeout_stamp: Instant::now() + ttl,
            },
        );
        if let Some(entry) = displaced {
            debug!("closing displaced connection for session {key}");
            entry
                .connection
                .close()
                .await
                .map_err(|e| teardown(&key, e))?;
        }
        Ok(connection)
    }

    pub fn is_contain_session_key(&self, session_key: &str) -> bool {
        self.sessions.contains_key(session_key)
    }

    /// O(1) lookup; never evicts or refreshes as a side effect.
    pub fn get_connection(&self, session_key: &str) -> Option<Arc<ConnectionHandle>> {
        self.sessions
            .get(session_key)
            .map(|entry| entry.connection.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Unconditional teardown: close the connection, then drop the entry.
    /// Absent keys are a no-op. Close failures propagate to the caller.
    pub async fn clear_key(&self, session_key: &str) -> Result<()> {
        self.clear_key_filtered(session_key, None, false).await
    }

    /// Finer-grained teardown.
    ///
    /// - absent key: no-op.
    /// - `check_expiry` and the entry has expired: close and remove,
    ///   regardless of `source_type`. An unexpired entry is left untouched.
    /// - no `source_type` and `check_expiry` is false: full teardown.
    /// - `source_type` present and `check_expiry` is false: close only the
    ///   matching sub-connection via the handle's partial-close capability;
    ///   the entry itself is retained.
    pub async fn clear_key_filtered(
        &self,
        session_key: &str,
        source_type: Option<SourceType>,
        check_expiry: bool,
    ) -> Result<()> {
        if !self.sessions.contains_key(session_key) {
            debug!("session {session_key} absent, nothing to clear");
            return Ok(());
        }
        info!(
            "clearing session {session_key} (filter: {source_type:?}, check_expiry: {check_expiry})"
        );

        if check_expiry {
            self.evict_expired(session_key).await?;
            return Ok(());
        }

        match source_type {
            None => {
                if let Some((_, entry)) = self.sessions.remove(session_key) {
                    entry
                        .connection
                        .close()
                        .await
                        .map_err(|e| teardown(session_key, e))?;
                }
                Ok(())
            }
            Some(st) => {
                let connection = match self.sessions.get(session_key) {
                    Some(entry) => entry.connection.clone(),
                    None => return Ok(()),
                };
                connection.close_by_type(st).await
            }
        }
    }

    /// Close and remove every expired entry. Per-key close failures are
    /// logged and do not stop the sweep. Returns the number of entries
    /// evicted.
    pub async fn sweep_expired(&self) -> usize {
        let keys: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        let mut evicted = 0;
        for key in keys {
            match self.evict_expired(&key).await {
                Ok(true) => evicted += 1,
                Ok(false) => {}
                Err(e) => {
                    // the entry is already out of the map; only its close failed
                    warn!("failed to close expired session {key}: {e}");
                    evicted += 1;
                }
            }
        }
        if evicted > 0 {
            info!("evicted {evicted} expired sessions");
        }
        evicted
    }

    /// Tear down every entry, expired or not. Close failures are logged and
    /// skipped. Returns the number of sessions closed cleanly.
    pub async fn clear_all(&self) -> usize {
        let keys: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        let mut closed = 0;
        for key in keys {
            match self.clear_key(&key).await {
                Ok(()) => closed += 1,
                Err(e) => warn!("failed to close session {key} during teardown: {e}"),
            }
        }
        closed
    }

    /// Remove the entry only if it has expired; close it after removal so
    /// the close happens exactly once even when sweeps race.
    async fn evict_expired(&self, session_key: &str) -> Result<bool> {
        let removed = self
            .sessions
            .remove_if(session_key, |_, entry| entry.is_expired());
        match removed {
            Some((key, entry)) => {
                entry
                    .connection
                    .close()
                    .await
                    .map_err(|e| teardown(&key, e))?;
                info!("evicted expired session {key}");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn teardown(session_key: &str, err: ConnError) -> ConnError {
    ConnError::Teardown {
        context: format!("session {session_key}"),
        source: Box::new(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalink_sources::{MemoryConnector, SourceConnector, SourceDescriptor};

    async fn direct_handle(connector: &MemoryConnector) -> ConnectionHandle {
        let descriptor = SourceDescriptor::new(SourceType::Memory, "mem://session");
        let connection = connector.open_direct(&descriptor).await.unwrap();
        ConnectionHandle::direct(SourceType::Memory, descriptor.endpoint, connection)
    }

    #[tokio::test]
    async fn test_add_get_contains() {
        let cache = SessionConnectionCache::new();
        let connector = MemoryConnector::new(SourceType::Memory);

        assert!(cache.get_connection("s1").is_none());
        assert!(!cache.is_contain_session_key("s1"));

        let handle = direct_handle(&connector).await;
        let added = cache.add_key("s1", handle, Duration::from_secs(60));

        assert!(cache.is_contain_session_key("s1"));
        let fetched = cache.get_connection("s1").unwrap();
        assert!(Arc::ptr_eq(&added, &fetched));
        assert_eq!(cache.session_count(), 1);
    }

    #[tokio::test]
    async fn test_add_replaces_without_closing_previous() {
        let cache = SessionConnectionCache::new();
        let connector = MemoryConnector::new(SourceType::Memory);

        let first = cache.add_key(
            "s1",
            direct_handle(&connector).await,
            Duration::from_secs(60),
        );
        let second = cache.add_key(
            "s1",
            direct_handle(&connector).await,
            Duration::from_secs(60),
        );

        let fetched = cache.get_connection("s1").unwrap();
        assert!(Arc::ptr_eq(&second, &fetched));
        assert!(!Arc::ptr_eq(&first, &fetched));
        // the displaced connection was not closed on the caller's behalf
        assert_eq!(connector.close_count(), 0);

        first.close().await.unwrap();
        cache.clear_key("s1").await.unwrap();
        assert_eq!(connector.close_count(), 2);
    }

    #[tokio::test]
    async fn test_replace_key_closes_displaced() {
        let cache = SessionConnectionCache::new();
        let connector = MemoryConnector::new(SourceType::Memory);

        cache.add_key(
            "s1",
            direct_handle(&connector).await,
            Duration::from_secs(60),
        );
        cache
            .replace_key(
                "s1",
                direct_handle(&connector).await,
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert_eq!(connector.close_count(), 1);
        assert!(cache.is_contain_session_key("s1"));
    }

    #[tokio::test]
    async fn test_clear_key_closes_and_removes() {
        let cache = SessionConnectionCache::new();
        let connector = MemoryConnector::new(SourceType::Memory);
        cache.add_key(
            "s1",
            direct_handle(&connector).await,
            Duration::from_secs(60),
        );

        cache.clear_key("s1").await.unwrap();
        assert!(!cache.is_contain_session_key("s1"));
        assert_eq!(connector.close_count(), 1);

        // clearing again is a no-op, not an error
        cache.clear_key("s1").await.unwrap();
        assert_eq!(connector.close_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_missing_key_is_noop() {
        let cache = SessionConnectionCache::new();
        cache.clear_key("missing-key").await.unwrap();
        cache
            .clear_key_filtered("missing-key", Some(SourceType::Hive), false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expiry_checked_clear() {
        let cache = SessionConnectionCache::new();
        let connector = MemoryConnector::new(SourceType::Memory);

        cache.add_key(
            "expired",
            direct_handle(&connector).await,
            Duration::from_millis(10),
        );
        cache.add_key(
            "fresh",
            direct_handle(&connector).await,
            Duration::from_secs(3600),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;

        cache
            .clear_key_filtered("expired", None, true)
            .await
            .unwrap();
        cache.clear_key_filtered("fresh", None, true).await.unwrap();

        assert!(!cache.is_contain_session_key("expired"));
        assert!(cache.is_contain_session_key("fresh"));
        assert_eq!(connector.close_count(), 1);
    }

    #[tokio::test]
    async fn test_sweep_expired_mixed() {
        let cache = SessionConnectionCache::new();
        let connector = MemoryConnector::new(SourceType::Memory);

        cache.add_key(
            "old-1",
            direct_handle(&connector).await,
            Duration::from_millis(5),
        );
        cache.add_key(
            "old-2",
            direct_handle(&connector).await,
            Duration::from_millis(5),
        );
        cache.add_key(
            "live",
            direct_handle(&connector).await,
            Duration::from_secs(3600),
        );
        tokio::time::sleep(Duration::from_millis(25)).await;

        let evicted = cache.sweep_expired().await;
        assert_eq!(evicted, 2);
        assert_eq!(cache.session_count(), 1);
        assert_eq!(connector.close_count(), 2);
    }

    #[tokio::test]
    async fn test_teardown_failure_propagates_on_explicit_clear() {
        let cache = SessionConnectionCache::new();
        let connector = MemoryConnector::new(SourceType::Memory);
        cache.add_key(
            "s1",
            direct_handle(&connector).await,
            Duration::from_secs(60),
        );
        connector.set_fail_closes(true);

        let result = cache.clear_key("s1").await;
        assert!(matches!(result, Err(ConnError::Teardown { .. })));
    }

    #[test]
    fn test_allocate_session_key_is_unique() {
        let a = SessionConnectionCache::allocate_session_key();
        let b = SessionConnectionCache::allocate_session_key();
        assert_ne!(a, b);
    }
}
