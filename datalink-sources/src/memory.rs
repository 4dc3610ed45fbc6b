//! In-memory reference connector
//!
//! Backs the lifecycle tests and demos, and doubles as the template for real
//! adapters: one stateless connector per source type, opening connections
//! that know how to probe and close themselves. Open/close counters stay
//! observable on the connector after connections have been boxed away.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::connector::{PartialClose, SourceConnection, SourceConnector};
use crate::error::{Result, SourceError};
use crate::source::{SourceDescriptor, SourceType};

pub struct MemoryConnector {
    source_type: SourceType,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    fail_opens: Arc<AtomicBool>,
    fail_closes: Arc<AtomicBool>,
    open_delay: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl MemoryConnector {
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            fail_opens: Arc::new(AtomicBool::new(false)),
            fail_closes: Arc::new(AtomicBool::new(false)),
            open_delay: None,
            connect_timeout: None,
        }
    }

    /// Every open sleeps this long first, simulating a slow backend.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Declare no native connect-timeout support, so the direct path bounds
    /// opens with this value.
    pub fn with_connect_timeout(mut self, bound: Duration) -> Self {
        self.connect_timeout = Some(bound);
        self
    }

    pub fn set_fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_closes(&self, fail: bool) {
        self.fail_closes.store(fail, Ordering::SeqCst);
    }

    /// Number of connections opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of connections closed so far.
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceConnector for MemoryConnector {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    async fn open_direct(&self, source: &SourceDescriptor) -> Result<Box<dyn SourceConnection>> {
        source.validate()?;
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(SourceError::Open {
                source_type: self.source_type,
                endpoint: source.endpoint.clone(),
                message: "simulated open failure".to_string(),
            });
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        debug!("opened in-memory connection to {}", source.endpoint);
        Ok(Box::new(MemoryConnection {
            source_type: self.source_type,
            endpoint: source.endpoint.clone(),
            open: AtomicBool::new(true),
            closed: self.closed.clone(),
            fail_closes: self.fail_closes.clone(),
        }))
    }

    fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }
}

pub struct MemoryConnection {
    source_type: SourceType,
    endpoint: String,
    open: AtomicBool,
    closed: Arc<AtomicUsize>,
    fail_closes: Arc<AtomicBool>,
}

#[async_trait]
impl SourceConnection for MemoryConnection {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    async fn is_valid(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<()> {
        if self.fail_closes.load(Ordering::SeqCst) {
            return Err(SourceError::Close("simulated close failure".to_string()));
        }
        if self.open.swap(false, Ordering::SeqCst) {
            self.closed.fetch_add(1, Ordering::SeqCst);
            debug!("closed in-memory connection to {}", self.endpoint);
        }
        Ok(())
    }
}

/// Live/closed state of the sub-connections, shared so tests can observe it
/// after the connection has been boxed into a handle.
pub type SubConnections = Arc<Mutex<HashMap<SourceType, bool>>>;

/// A connection multiplexing several source-typed sub-connections, e.g. an
/// HBase handle that also carries a Phoenix link. Supports partial close.
pub struct MultiplexedMemoryConnection {
    primary: SourceType,
    parts: SubConnections,
    open: AtomicBool,
}

impl MultiplexedMemoryConnection {
    pub fn new(primary: SourceType, sub_types: &[SourceType]) -> Self {
        let parts = sub_types.iter().map(|st| (*st, true)).collect();
        Self {
            primary,
            parts: Arc::new(Mutex::new(parts)),
            open: AtomicBool::new(true),
        }
    }

    pub fn parts(&self) -> SubConnections {
        self.parts.clone()
    }
}

#[async_trait]
impl SourceConnection for MultiplexedMemoryConnection {
    fn source_type(&self) -> SourceType {
        self.primary
    }

    async fn is_valid(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            for alive in self.parts.lock().values_mut() {
                *alive = false;
            }
            debug!("closed multiplexed {} connection", self.primary);
        }
        Ok(())
    }

    fn as_partial_close(&mut self) -> Option<&mut dyn PartialClose> {
        Some(self)
    }
}

#[async_trait]
impl PartialClose for MultiplexedMemoryConnection {
    async fn close_by_type(&mut self, source_type: SourceType) -> Result<()> {
        let mut parts = self.parts.lock();
        match parts.get_mut(&source_type) {
            Some(alive) => {
                if *alive {
                    *alive = false;
                    debug!("closed {} sub-connection", source_type);
                }
                Ok(())
            }
            None => Err(SourceError::Unsupported {
                source_type,
                operation: "close_by_type",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> SourceDescriptor {
        SourceDescriptor::new(SourceType::Memory, "mem://unit")
    }

    #[tokio::test]
    async fn test_open_probe_close() {
        let connector = MemoryConnector::new(SourceType::Memory);
        let mut conn = connector.open_direct(&descriptor()).await.unwrap();

        assert!(conn.is_valid().await);
        assert_eq!(connector.open_count(), 1);

        conn.close().await.unwrap();
        assert!(!conn.is_valid().await);
        assert_eq!(connector.close_count(), 1);

        // repeated close is tolerated and not double counted
        conn.close().await.unwrap();
        assert_eq!(connector.close_count(), 1);
    }

    #[tokio::test]
    async fn test_simulated_open_failure() {
        let connector = MemoryConnector::new(SourceType::Memory);
        connector.set_fail_opens(true);

        let result = connector.open_direct(&descriptor()).await;
        assert!(matches!(result, Err(SourceError::Open { .. })));
        assert_eq!(connector.open_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_close() {
        let mut conn =
            MultiplexedMemoryConnection::new(SourceType::Hbase, &[SourceType::Hbase, SourceType::Phoenix]);
        let parts = conn.parts();

        let partial = conn.as_partial_close().expect("capability present");
        partial.close_by_type(SourceType::Phoenix).await.unwrap();

        assert!(!parts.lock()[&SourceType::Phoenix]);
        assert!(parts.lock()[&SourceType::Hbase]);
        assert!(conn.is_valid().await);
    }

    #[tokio::test]
    async fn test_partial_close_unknown_sub_type() {
        let mut conn = MultiplexedMemoryConnection::new(SourceType::Hbase, &[SourceType::Hbase]);
        let partial = conn.as_partial_close().unwrap();

        let result = partial.close_by_type(SourceType::Kafka).await;
        assert!(matches!(result, Err(SourceError::Unsupported { .. })));
    }
}
