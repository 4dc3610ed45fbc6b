//! Capability traits implemented by per-source adapters

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::source::{SourceDescriptor, SourceType};

/// Bound applied around `open_direct` for drivers that cannot enforce a
/// connect timeout themselves.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// One adapter per source type. Connectors are stateless and shared; every
/// call receives the full descriptor of the source to reach.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// Open one native connection outside any pool. The caller owns the
    /// returned connection exclusively and is responsible for closing it.
    async fn open_direct(&self, source: &SourceDescriptor) -> Result<Box<dyn SourceConnection>>;

    /// Bound enforced around `open_direct` when the underlying driver has no
    /// native connect timeout. `None` means the driver times out on its own;
    /// drivers that can block indefinitely should return
    /// [`DEFAULT_CONNECT_TIMEOUT`].
    fn connect_timeout(&self) -> Option<Duration> {
        None
    }
}

/// A live native connection produced by a [`SourceConnector`].
#[async_trait]
pub trait SourceConnection: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// Lightweight liveness probe. Adapters back this with whatever the
    /// source offers: a driver `is_valid` check or a canned test statement.
    async fn is_valid(&self) -> bool;

    /// Release the native connection. Must tolerate repeated calls.
    async fn close(&mut self) -> Result<()>;

    /// Optional capability: a handle that multiplexes several source-typed
    /// sub-connections exposes it here. The default is no capability.
    fn as_partial_close(&mut self) -> Option<&mut dyn PartialClose> {
        None
    }
}

/// Close one source-typed sub-connection of a multiplexed handle without
/// tearing down the handle itself.
#[async_trait]
pub trait PartialClose: Send + Sync {
    async fn close_by_type(&mut self, source_type: SourceType) -> Result<()>;
}
