//! Direct (non-pooled) connection path
//!
//! Used whenever pooling is unsuitable: Kerberos-authenticated sources,
//! descriptors without pool settings, and liveness probes.

use std::time::Duration;

use tokio::time;
use tracing::warn;

use datalink_sources::{SourceConnection, SourceConnector, SourceDescriptor, SourceError};

use crate::error::{ConnError, Result};
use crate::handle::ConnectionHandle;

pub struct DirectConnectionFactory;

impl DirectConnectionFactory {
    /// Open exactly one native connection outside any pool. The caller owns
    /// it exclusively and must close it.
    pub async fn open(
        connector: &dyn SourceConnector,
        source: &SourceDescriptor,
    ) -> Result<ConnectionHandle> {
        source.validate()?;
        let connection = match connector.connect_timeout() {
            None => connector
                .open_direct(source)
                .await
                .map_err(|e| acquisition(source, e))?,
            Some(bound) => Self::open_bounded(connector, source, bound).await?,
        };
        Ok(ConnectionHandle::direct(
            source.source_type,
            source.endpoint.clone(),
            connection,
        ))
    }

    /// Open, probe, and unconditionally close. The probe connection is never
    /// leaked, even when the probe itself fails.
    pub async fn test_connection(
        connector: &dyn SourceConnector,
        source: &SourceDescriptor,
    ) -> Result<bool> {
        let handle = Self::open(connector, source).await?;
        let alive = handle.probe().await;
        if let Err(e) = handle.close().await {
            warn!("failed to close probe connection to {}: {e}", source.endpoint);
        }
        Ok(alive)
    }

    /// Bounded open for drivers with no native connect timeout. On expiry
    /// the attempt is abandoned and an acquisition-timeout error raised.
    ///
    /// Abandonment is best-effort: the timed-out open future is dropped, but
    /// a connector that parked the blocking call on a worker keeps that
    /// worker busy until the native call returns. Caller-visible latency is
    /// bounded; the worker is not.
    async fn open_bounded(
        connector: &dyn SourceConnector,
        source: &SourceDescriptor,
        bound: Duration,
    ) -> Result<Box<dyn SourceConnection>> {
        match time::timeout(bound, connector.open_direct(source)).await {
            Ok(Ok(connection)) => Ok(connection),
            Ok(Err(e)) => Err(acquisition(source, e)),
            Err(_) => {
                warn!(
                    "abandoning connection attempt to {} after {:?}",
                    source.endpoint, bound
                );
                Err(ConnError::AcquisitionTimeout {
                    endpoint: source.endpoint.clone(),
                    waited_ms: bound.as_millis() as u64,
                })
            }
        }
    }
}

fn acquisition(source: &SourceDescriptor, err: SourceError) -> ConnError {
    ConnError::Acquisition {
        endpoint: source.endpoint.clone(),
        source: Box::new(err),
    }
}
