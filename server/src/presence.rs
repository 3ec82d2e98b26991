//! Set of distinct peer identities currently connected
//!
//! Identities are compared by value only. Two connections that resolve to
//! the same masked address share one entry, and removing that identity for
//! either connection removes it for both.

use std::collections::HashSet;

/// Distinct masked identities of the connected peers
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    identities: HashSet<String>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the identity was already present
    pub fn add(&mut self, identity: &str) -> bool {
        self.identities.insert(identity.to_string())
    }

    /// Returns `false` if the identity was not present
    pub fn remove(&mut self, identity: &str) -> bool {
        self.identities.remove(identity)
    }

    /// Number of distinct identities, not connections
    pub fn count(&self) -> usize {
        self.identities.len()
    }

    /// Current identities, sorted so repeated snapshots of an unchanged set
    /// compare equal
    pub fn snapshot(&self) -> Vec<String> {
        let mut identities: Vec<String> = self.identities.iter().cloned().collect();
        identities.sort();
        identities
    }
}
