//! Connection handle shared by the pooled and direct paths

use tokio::sync::Mutex;
use tracing::debug;

use datalink_sources::{SourceConnection, SourceType};

use crate::error::{ConnError, Result};
use crate::pool::PooledObject;

enum HandleInner {
    /// Checked out of a shared pool; dropping it returns the connection.
    Pooled(PooledObject),
    /// Exclusively owned; physically closed on teardown.
    Direct(Box<dyn SourceConnection>),
}

/// A live connection, pooled or direct, with close-once semantics: the first
/// `close` releases the underlying connection, every later call is a no-op.
pub struct ConnectionHandle {
    source_type: SourceType,
    endpoint: String,
    pooled: bool,
    inner: Mutex<Option<HandleInner>>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("source_type", &self.source_type)
            .field("endpoint", &self.endpoint)
            .field("pooled", &self.pooled)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    pub(crate) fn pooled(source_type: SourceType, endpoint: String, object: PooledObject) -> Self {
        Self {
            source_type,
            endpoint,
            pooled: true,
            inner: Mutex::new(Some(HandleInner::Pooled(object))),
        }
    }

    pub fn direct(
        source_type: SourceType,
        endpoint: String,
        connection: Box<dyn SourceConnection>,
    ) -> Self {
        Self {
            source_type,
            endpoint,
            pooled: false,
            inner: Mutex::new(Some(HandleInner::Direct(connection))),
        }
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether this handle was checked out of a shared pool.
    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Liveness of the underlying connection; `false` once closed.
    pub async fn probe(&self) -> bool {
        match self.inner.lock().await.as_ref() {
            Some(HandleInner::Pooled(object)) => object.is_valid().await,
            Some(HandleInner::Direct(connection)) => connection.is_valid().await,
            None => false,
        }
    }

    /// Release the connection. Pooled connections are returned to their pool
    /// (not physically closed); direct connections are closed for real.
    /// Repeated calls are no-ops.
    pub async fn close(&self) -> Result<()> {
        let inner = self.inner.lock().await.take();
        match inner {
            None => {
                debug!("connection to {} already closed", self.endpoint);
                Ok(())
            }
            Some(HandleInner::Pooled(object)) => {
                drop(object);
                debug!("returned connection to {} to its pool", self.endpoint);
                Ok(())
            }
            Some(HandleInner::Direct(mut connection)) => {
                connection.close().await.map_err(|e| ConnError::Teardown {
                    context: format!("endpoint {}", self.endpoint),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Close one source-typed sub-connection of a multiplexed handle; the
    /// handle itself stays open. Fails with `CapabilityUnsupported` when the
    /// underlying connection does not multiplex. A no-op on a handle that is
    /// already fully closed.
    pub async fn close_by_type(&self, source_type: SourceType) -> Result<()> {
        let mut guard = self.inner.lock().await;
        match guard.as_mut() {
            None => Ok(()),
            Some(HandleInner::Pooled(_)) => Err(ConnError::CapabilityUnsupported {
                source_type: self.source_type,
                operation: "close_by_type",
            }),
            Some(HandleInner::Direct(connection)) => match connection.as_partial_close() {
                Some(partial) => partial
                    .close_by_type(source_type)
                    .await
                    .map_err(ConnError::from),
                None => Err(ConnError::CapabilityUnsupported {
                    source_type: self.source_type,
                    operation: "close_by_type",
                }),
            },
        }
    }
}
