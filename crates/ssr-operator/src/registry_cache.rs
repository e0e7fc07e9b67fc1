//! Registry membership cache and per-registry locks
//!
//! The secret watcher sees every Secret of the Kafka cluster and uses the
//! cache to pick out the ones that belong to a registry. The cache is shared
//! with the registry controller, which inserts a name once provisioning
//! succeeds.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use kube::ResourceExt;
use tokio::sync::{Mutex, OwnedMutexGuard};

use ssr_common::crd::StrimziSchemaRegistry;

/// Names of the StrimziSchemaRegistry objects the operator tracks
#[derive(Clone, Debug, Default)]
pub struct RegistryNames {
    names: Arc<DashSet<String>>,
}

impl RegistryNames {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache from a list of existing registries
    pub fn prime<'a>(&self, registries: impl IntoIterator<Item = &'a StrimziSchemaRegistry>) {
        for registry in registries {
            self.names.insert(registry.name_any());
        }
    }

    /// Track a registry; returns false if it was already tracked
    pub fn insert(&self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    /// Whether a registry is tracked
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Stop tracking a registry
    pub fn remove(&self, name: &str) -> bool {
        self.names.remove(name).is_some()
    }

    /// Snapshot of all tracked names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.iter().map(|n| n.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of tracked registries
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One async mutex per registry name
///
/// The registry controller and the secret watcher both reconcile the same
/// JKS Secret; holding the registry's lock keeps their delete-then-create
/// sequences from interleaving.
#[derive(Clone, Debug, Default)]
pub struct IdentityLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl IdentityLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock of `name`
    pub async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop the lock entry of a registry that no longer exists.
    ///
    /// The entry stays while anyone still holds or waits on it, so callers
    /// release their own guard first.
    pub fn forget(&self, name: &str) -> bool {
        self.locks
            .remove_if(name, |_, lock| Arc::strong_count(lock) == 1)
            .is_some()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.locks.contains_key(name)
    }
}
