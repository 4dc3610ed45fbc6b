//! Error types for datalink-sources

use thiserror::Error;

use crate::source::SourceType;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connector already registered for {0}")]
    AlreadyRegistered(SourceType),

    #[error("failed to open {source_type} connection to {endpoint}: {message}")]
    Open {
        source_type: SourceType,
        endpoint: String,
        message: String,
    },

    #[error("liveness probe failed: {0}")]
    Probe(String),

    #[error("failed to close connection: {0}")]
    Close(String),

    #[error("{operation} is not supported by {source_type} connections")]
    Unsupported {
        source_type: SourceType,
        operation: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SourceError>;
