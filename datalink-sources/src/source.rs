//! Source descriptors and connection settings

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SourceError};

/// The kind of backing data source, with its stable wire code.
///
/// Codes match the integer source-type tags used across the client surface;
/// they never change once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum SourceType {
    Mysql = 1,
    Oracle = 2,
    SqlServer = 3,
    Postgres = 4,
    Hive = 7,
    Hbase = 8,
    Ftp = 9,
    Kafka = 25,
    Solr = 30,
    Influxdb = 37,
    S3 = 41,
    Sftp = 43,
    Phoenix = 45,
    Memory = 999,
}

impl SourceType {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(SourceType::Mysql),
            2 => Some(SourceType::Oracle),
            3 => Some(SourceType::SqlServer),
            4 => Some(SourceType::Postgres),
            7 => Some(SourceType::Hive),
            8 => Some(SourceType::Hbase),
            9 => Some(SourceType::Ftp),
            25 => Some(SourceType::Kafka),
            30 => Some(SourceType::Solr),
            37 => Some(SourceType::Influxdb),
            41 => Some(SourceType::S3),
            43 => Some(SourceType::Sftp),
            45 => Some(SourceType::Phoenix),
            999 => Some(SourceType::Memory),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Mysql => write!(f, "MySQL"),
            SourceType::Oracle => write!(f, "Oracle"),
            SourceType::SqlServer => write!(f, "SQLServer"),
            SourceType::Postgres => write!(f, "PostgreSQL"),
            SourceType::Hive => write!(f, "Hive"),
            SourceType::Hbase => write!(f, "HBase"),
            SourceType::Ftp => write!(f, "FTP"),
            SourceType::Kafka => write!(f, "Kafka"),
            SourceType::Solr => write!(f, "Solr"),
            SourceType::Influxdb => write!(f, "InfluxDB"),
            SourceType::S3 => write!(f, "S3"),
            SourceType::Sftp => write!(f, "SFTP"),
            SourceType::Phoenix => write!(f, "Phoenix"),
            SourceType::Memory => write!(f, "Memory"),
        }
    }
}

/// Kerberos credentials attached to a source.
///
/// A descriptor carrying one of these never routes through a shared pool:
/// pooled connections cannot be shared across principal contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KerberosConfig {
    /// Kerberos principal, e.g. `hive/host@REALM`
    pub principal: String,
    /// Path to the keytab file
    pub keytab: PathBuf,
    /// Kerberos configuration file, if not the system default
    #[serde(default)]
    pub krb5_conf: Option<PathBuf>,
}

/// Settings for a pooled source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Maximum time to wait for a checkout (milliseconds)
    pub connection_timeout_ms: u64,
    /// Idle time after which a pooled connection is discarded (seconds)
    pub idle_timeout_secs: u64,
    /// Maximum lifetime of a pooled connection (seconds)
    pub max_lifetime_secs: u64,
    /// Maximum number of connections in the pool
    pub maximum_pool_size: usize,
    /// Connections opened ahead of demand and kept ready
    pub minimum_idle: usize,
    /// Open connections in read-only mode
    pub read_only: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            connection_timeout_ms: 30_000,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            maximum_pool_size: 10,
            minimum_idle: 0,
            read_only: false,
        }
    }
}

impl PoolSettings {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

/// Everything needed to reach one logical data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub source_type: SourceType,
    /// Endpoint URL or host:port string, passed through to the adapter
    pub endpoint: String,
    /// Login principal (username); may be empty for anonymous sources
    #[serde(default)]
    pub principal: String,
    /// Login credential (password, token); may be empty
    #[serde(default)]
    pub credential: String,
    /// Present when the source authenticates via Kerberos
    #[serde(default)]
    pub kerberos: Option<KerberosConfig>,
    /// Present when the source may be pooled
    #[serde(default)]
    pub pool: Option<PoolSettings>,
    /// Adapter-specific connection properties
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl SourceDescriptor {
    pub fn new(source_type: SourceType, endpoint: impl Into<String>) -> Self {
        Self {
            source_type,
            endpoint: endpoint.into(),
            principal: String::new(),
            credential: String::new(),
            kerberos: None,
            pool: None,
            properties: HashMap::new(),
        }
    }

    /// Fail fast on descriptors that can never connect.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(SourceError::Configuration(
                "source endpoint must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_codes() {
        assert_eq!(SourceType::Hive.code(), 7);
        assert_eq!(SourceType::from_code(7), Some(SourceType::Hive));
        assert_eq!(SourceType::from_code(-1), None);
    }

    #[test]
    fn test_validate_blank_endpoint() {
        let descriptor = SourceDescriptor::new(SourceType::Mysql, "  ");
        assert!(matches!(
            descriptor.validate(),
            Err(SourceError::Configuration(_))
        ));
    }

    #[test]
    fn test_descriptor_from_json() {
        let descriptor: SourceDescriptor = serde_json::from_value(serde_json::json!({
            "source_type": "Postgres",
            "endpoint": "postgres://db-1:5432/analytics",
            "principal": "report_ro",
            "credential": "secret",
            "pool": {
                "connection_timeout_ms": 5000,
                "idle_timeout_secs": 60,
                "max_lifetime_secs": 600,
                "maximum_pool_size": 4,
                "minimum_idle": 1,
                "read_only": true
            }
        }))
        .unwrap();

        assert!(descriptor.validate().is_ok());
        assert!(descriptor.kerberos.is_none());
        assert_eq!(descriptor.pool.unwrap().maximum_pool_size, 4);
    }

    #[test]
    fn test_pool_settings_defaults() {
        let settings = PoolSettings::default();
        assert_eq!(settings.connection_timeout(), Duration::from_secs(30));
        assert_eq!(settings.maximum_pool_size, 10);
        assert!(!settings.read_only);
    }
}
