//! Error types for datalink-conn

use thiserror::Error;

use datalink_sources::{SourceError, SourceType};

type BoxedCause = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ConnError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no connector registered for source type {0}")]
    UnknownSourceType(SourceType),

    #[error("failed to acquire connection to {endpoint}")]
    Acquisition {
        endpoint: String,
        #[source]
        source: BoxedCause,
    },

    #[error("timed out acquiring connection to {endpoint} after {waited_ms} ms")]
    AcquisitionTimeout { endpoint: String, waited_ms: u64 },

    #[error("failed to close connection ({context})")]
    Teardown {
        context: String,
        #[source]
        source: BoxedCause,
    },

    #[error("{operation} is not supported by {source_type} connections")]
    CapabilityUnsupported {
        source_type: SourceType,
        operation: &'static str,
    },

    #[error(transparent)]
    Source(#[from] SourceError),
}

pub type Result<T> = std::result::Result<T, ConnError>;
