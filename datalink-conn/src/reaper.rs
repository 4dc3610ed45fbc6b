//! Background eviction of expired sessions

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::session::SessionConnectionCache;

/// Fixed sweep period. Every expired entry is gone at most one period after
/// its expiry.
pub const REAP_INTERVAL: Duration = Duration::from_secs(10);

/// The periodic sweep over the session cache. One dedicated task per cache,
/// spawned at registration and running for the life of the process; sweeps
/// never run on a caller's call path.
///
/// Dropping the reaper leaves the task running (process-lifetime
/// semantics); use [`shutdown`](Self::shutdown) or
/// [`shutdown_and_close`](Self::shutdown_and_close) to stop it.
pub struct SessionReaper {
    cache: Arc<SessionConnectionCache>,
    task: JoinHandle<()>,
}

impl SessionReaper {
    /// Start sweeping `cache` every [`REAP_INTERVAL`]. The first sweep runs
    /// immediately.
    pub fn spawn(cache: Arc<SessionConnectionCache>) -> Self {
        Self::spawn_with_interval(cache, REAP_INTERVAL)
    }

    /// Same task with a caller-chosen period, for embedders and tests.
    pub fn spawn_with_interval(cache: Arc<SessionConnectionCache>, period: Duration) -> Self {
        let sweeper = cache.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let evicted = sweeper.sweep_expired().await;
                if evicted > 0 {
                    debug!("reaper tick evicted {evicted} sessions");
                }
            }
        });
        info!("session reaper started (period {period:?})");
        Self { cache, task }
    }

    /// Stop the schedule. Cached entries are left untouched.
    pub fn shutdown(self) {
        self.task.abort();
        info!("session reaper stopped");
    }

    /// Stop the schedule and tear down every remaining session. Returns the
    /// number of sessions closed cleanly.
    pub async fn shutdown_and_close(self) -> usize {
        self.task.abort();
        let closed = self.cache.clear_all().await;
        info!("session reaper stopped, {closed} sessions closed");
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ConnectionHandle;
    use datalink_sources::{MemoryConnector, SourceConnector, SourceDescriptor, SourceType};

    async fn direct_handle(connector: &MemoryConnector) -> ConnectionHandle {
        let descriptor = SourceDescriptor::new(SourceType::Memory, "mem://reaper");
        let connection = connector.open_direct(&descriptor).await.unwrap();
        ConnectionHandle::direct(SourceType::Memory, descriptor.endpoint, connection)
    }

    #[tokio::test]
    async fn test_expired_entry_is_reaped() {
        let cache = Arc::new(SessionConnectionCache::new());
        let connector = MemoryConnector::new(SourceType::Memory);
        let reaper =
            SessionReaper::spawn_with_interval(cache.clone(), Duration::from_millis(50));

        cache.add_key(
            "short",
            direct_handle(&connector).await,
            Duration::from_millis(20),
        );
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(!cache.is_contain_session_key("short"));
        assert_eq!(connector.close_count(), 1);
        reaper.shutdown();
    }

    #[tokio::test]
    async fn test_unexpired_entry_survives_sweeps() {
        let cache = Arc::new(SessionConnectionCache::new());
        let connector = MemoryConnector::new(SourceType::Memory);
        let reaper =
            SessionReaper::spawn_with_interval(cache.clone(), Duration::from_millis(50));

        cache.add_key(
            "long",
            direct_handle(&connector).await,
            Duration::from_secs(3600),
        );
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(cache.is_contain_session_key("long"));
        assert_eq!(connector.close_count(), 0);
        reaper.shutdown();
    }

    #[tokio::test]
    async fn test_close_failure_does_not_abort_sweep() {
        let cache = Arc::new(SessionConnectionCache::new());
        let healthy = MemoryConnector::new(SourceType::Memory);
        let broken = MemoryConnector::new(SourceType::Memory);
        broken.set_fail_closes(true);

        cache.add_key(
            "broken",
            direct_handle(&broken).await,
            Duration::from_millis(5),
        );
        cache.add_key(
            "healthy",
            direct_handle(&healthy).await,
            Duration::from_millis(5),
        );
        tokio::time::sleep(Duration::from_millis(25)).await;

        let evicted = cache.sweep_expired().await;
        assert_eq!(evicted, 2);
        assert!(!cache.is_contain_session_key("broken"));
        assert!(!cache.is_contain_session_key("healthy"));
        assert_eq!(healthy.close_count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_and_close_drains_cache() {
        let cache = Arc::new(SessionConnectionCache::new());
        let connector = MemoryConnector::new(SourceType::Memory);
        let reaper =
            SessionReaper::spawn_with_interval(cache.clone(), Duration::from_millis(50));

        cache.add_key(
            "a",
            direct_handle(&connector).await,
            Duration::from_secs(3600),
        );
        cache.add_key(
            "b",
            direct_handle(&connector).await,
            Duration::from_secs(3600),
        );

        let closed = reaper.shutdown_and_close().await;
        assert_eq!(closed, 2);
        assert_eq!(cache.session_count(), 0);
        assert_eq!(connector.close_count(), 2);
    }
}
