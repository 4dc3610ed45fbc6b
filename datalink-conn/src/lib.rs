//! Datalink Connection Lifecycle
//! =============================
//!
//! Connection lifecycle management for heterogeneous data sources:
//! - session-keyed caching of live connections with timeout eviction
//! - pooled connections keyed by source identity, backed by deadpool
//! - direct (non-pooled) opens for Kerberos and pool-less sources
//! - a background reaper sweeping expired sessions on a fixed period

pub mod direct;
pub mod error;
pub mod handle;
pub mod keying;
pub mod manager;
pub mod pool;
pub mod reaper;
pub mod session;

pub use direct::DirectConnectionFactory;
pub use error::{ConnError, Result};
pub use handle::ConnectionHandle;
pub use keying::SourceIdentity;
pub use manager::ConnectionManager;
pub use pool::{PoolRegistry, SourcePool};
pub use reaper::{SessionReaper, REAP_INTERVAL};
pub use session::SessionConnectionCache;
