//! Pool identity derivation

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use datalink_sources::SourceDescriptor;

/// Canonical identity of one logical source: two descriptors with the same
/// endpoint, principal, and credential always map to the same identity, and
/// therefore to the same pool.
///
/// The credential is folded in as a non-cryptographic digest; it keeps raw
/// secrets out of keys and log lines. Distinct credentials colliding on the
/// digest would share a pool, which the digest space makes vanishingly
/// unlikely in practice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceIdentity {
    pub endpoint: String,
    pub principal: String,
    pub credential_digest: u64,
}

impl SourceIdentity {
    pub fn from_descriptor(source: &SourceDescriptor) -> Self {
        let mut hasher = DefaultHasher::new();
        source.credential.hash(&mut hasher);
        Self {
            endpoint: source.endpoint.clone(),
            principal: source.principal.clone(),
            credential_digest: hasher.finish(),
        }
    }

    /// Stable string form, used to key pools and usable as a deterministic
    /// session-key component.
    pub fn as_key(&self) -> String {
        format!(
            "url:{},principal:{},cred:{:x}",
            self.endpoint, self.principal, self.credential_digest
        )
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.principal, self.endpoint)
    }
}
