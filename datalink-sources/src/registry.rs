//! Connector registry keyed by source type

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::connector::SourceConnector;
use crate::error::{Result, SourceError};
use crate::source::SourceType;

/// Adapter lookup table. One connector per source type; registration of a
/// duplicate type is rejected rather than silently replaced.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: DashMap<SourceType, Arc<dyn SourceConnector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: DashMap::new(),
        }
    }

    pub fn register(&self, connector: Arc<dyn SourceConnector>) -> Result<()> {
        let source_type = connector.source_type();
        match self.connectors.entry(source_type) {
            Entry::Occupied(_) => Err(SourceError::AlreadyRegistered(source_type)),
            Entry::Vacant(slot) => {
                slot.insert(connector);
                debug!("registered {} connector", source_type);
                Ok(())
            }
        }
    }

    pub fn get(&self, source_type: SourceType) -> Option<Arc<dyn SourceConnector>> {
        self.connectors
            .get(&source_type)
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnector;

    #[test]
    fn test_register_and_get() {
        let registry = ConnectorRegistry::new();
        registry
            .register(Arc::new(MemoryConnector::new(SourceType::Memory)))
            .unwrap();

        assert!(registry.get(SourceType::Memory).is_some());
        assert!(registry.get(SourceType::Kafka).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = ConnectorRegistry::new();
        registry
            .register(Arc::new(MemoryConnector::new(SourceType::Memory)))
            .unwrap();

        let result = registry.register(Arc::new(MemoryConnector::new(SourceType::Memory)));
        assert!(matches!(
            result,
            Err(SourceError::AlreadyRegistered(SourceType::Memory))
        ));
    }
}
