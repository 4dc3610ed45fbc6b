//! Datalink Source Connectors
//! ==========================
//!
//! Descriptor types and capability traits shared by every data source
//! adapter in the Datalink connection layer:
//! - `SourceDescriptor` / `PoolSettings` / `KerberosConfig` configuration
//! - `SourceConnector` and `SourceConnection` adapter traits
//! - `ConnectorRegistry` for source-type keyed adapter lookup
//! - an in-memory reference connector used by tests and demos

pub mod connector;
pub mod error;
pub mod memory;
pub mod registry;
pub mod source;

pub use connector::{PartialClose, SourceConnection, SourceConnector, DEFAULT_CONNECT_TIMEOUT};
pub use error::{Result, SourceError};
pub use memory::{MemoryConnector, MemoryConnection, MultiplexedMemoryConnection};
pub use registry::ConnectorRegistry;
pub use source::{KerberosConfig, PoolSettings, SourceDescriptor, SourceType};
