//! Correlation between compute-service job ids and calculation ids.
//!
//! The compute service hands out an opaque job id when an asynchronous
//! run starts. The registry remembers which calculation that run belongs
//! to, so the terminal result can be filed against the right rows when
//! it eventually arrives. The compute service stays the source of truth
//! for job state; the registry only answers "where does this result go".

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::CoreError;
use crate::types::DbId;

/// Narrow key-value contract for job correlation.
///
/// Implementations must be safe to share across concurrent stream-proxy
/// and cancel requests. A job id maps to at most one calculation id at
/// any time; `put` on an existing job id replaces the mapping.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Record that `job_id` belongs to `calculation_id`.
    async fn put(&self, job_id: &str, calculation_id: DbId) -> Result<(), CoreError>;

    /// Look up the calculation for `job_id`, or `None` if unknown or expired.
    async fn get(&self, job_id: &str) -> Result<Option<DbId>, CoreError>;

    /// Forget `job_id`, returning the calculation it pointed to (if any).
    async fn remove(&self, job_id: &str) -> Result<Option<DbId>, CoreError>;

    /// Drop expired entries. Returns how many were removed.
    async fn sweep_expired(&self) -> Result<u64, CoreError> {
        Ok(0)
    }
}

/// Resolve `job_id` or fail with [`CoreError::JobNotFound`].
pub async fn require(registry: &dyn JobRegistry, job_id: &str) -> Result<DbId, CoreError> {
    registry
        .get(job_id)
        .await?
        .ok_or_else(|| CoreError::JobNotFound(job_id.to_string()))
}

struct Entry {
    calculation_id: DbId,
    registered_at: Instant,
}

/// Process-local registry guarded by a mutex.
///
/// Entries are lost on restart. With a TTL set, entries older than the
/// TTL read as absent and are dropped by [`JobRegistry::sweep_expired`].
pub struct InMemoryJobRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Option<Duration>,
}

impl InMemoryJobRegistry {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Number of live (possibly expired but not yet swept) entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // A poisoned lock only means another request panicked mid-update;
        // the map itself is still consistent for single-key operations.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.duration_since(entry.registered_at) > ttl)
    }
}

impl Default for InMemoryJobRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl JobRegistry for InMemoryJobRegistry {
    async fn put(&self, job_id: &str, calculation_id: DbId) -> Result<(), CoreError> {
        let previous = self.lock().insert(
            job_id.to_string(),
            Entry {
                calculation_id,
                registered_at: Instant::now(),
            },
        );
        if let Some(previous) = previous {
            if previous.calculation_id != calculation_id {
                tracing::warn!(
                    job_id,
                    previous_calculation_id = previous.calculation_id,
                    calculation_id,
                    "Job id re-registered against a different calculation",
                );
            }
        }
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<DbId>, CoreError> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(job_id) {
            Some(entry) if self.is_expired(entry, now) => {
                entries.remove(job_id);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.calculation_id)),
            None => Ok(None),
        }
    }

    async fn remove(&self, job_id: &str) -> Result<Option<DbId>, CoreError> {
        Ok(self.lock().remove(job_id).map(|e| e.calculation_id))
    }

    async fn sweep_expired(&self) -> Result<u64, CoreError> {
        if self.ttl.is_none() {
            return Ok(0);
        }
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        Ok((before - entries.len()) as u64)
    }
}
