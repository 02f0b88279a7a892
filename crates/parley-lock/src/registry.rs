//! Process-local named mutexes
//!
//! One mutex per lock name, created on first use and kept for the lifetime of
//! the registry. Lock names are operational identifiers with small cardinality,
//! so entries are never pruned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::LockError;

/// Process-local mutex guarding one lock name
pub type NamedMutex = Arc<Mutex<()>>;

/// Mapping from lock name to its process-local mutex.
///
/// The map sits behind its own mutex, which is the only synchronization the
/// registry uses. Lookups and insertions both happen under it, so two callers
/// racing on an unseen name always receive the same mutex.
#[derive(Debug, Default)]
pub struct NamedMutexRegistry {
    mutexes: Mutex<HashMap<String, NamedMutex>>,
}

impl NamedMutexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the mutex for `name`, creating it when it does not exist yet.
    ///
    /// Waiting for the registry guard is bounded by `timeout`.
    pub async fn get_or_create(&self, name: &str, timeout: Duration) -> Result<NamedMutex, LockError> {
        let mut mutexes = tokio::time::timeout(timeout, self.mutexes.lock())
            .await
            .map_err(|_| LockError::MutexTimeout {
                name: name.to_string(),
                timeout,
            })?;

        if let Some(existing) = mutexes.get(name) {
            return Ok(existing.clone());
        }

        let created: NamedMutex = Arc::new(Mutex::new(()));
        mutexes.insert(name.to_string(), created.clone());
        debug!(lock = %name, registered = mutexes.len(), "Created named mutex");

        Ok(created)
    }

    /// Number of names that have a mutex
    pub async fn len(&self) -> usize {
        self.mutexes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
