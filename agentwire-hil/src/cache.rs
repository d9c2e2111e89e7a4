//! Short-lived per-thread status cache

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::types::ExecutionStatus;

#[derive(Debug, Clone)]
struct CachedStatus {
    status: ExecutionStatus,
    fetched_at: Instant,
}

/// Execution status keyed by thread id
///
/// Entries are fresh for `ttl`. Writes carry the instant their response
/// completed, and an entry is never replaced by an older response.
#[derive(Debug)]
pub struct StatusCache {
    ttl: Duration,
    sweep_after: Duration,
    entries: Mutex<HashMap<String, CachedStatus>>,
}

impl StatusCache {
    /// Entries older than `ttl * sweep_factor` are removed by [`Self::sweep`]
    pub fn new(ttl: Duration, sweep_factor: u32) -> Self {
        Self {
            ttl,
            sweep_after: ttl * sweep_factor.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached status if it is younger than the TTL
    pub fn get_fresh(&self, thread_id: &str) -> Option<ExecutionStatus> {
        let entries = self.entries.lock();
        let entry = entries.get(thread_id)?;
        (entry.fetched_at.elapsed() < self.ttl).then(|| entry.status.clone())
    }

    /// Store a status fetched at `fetched_at`
    ///
    /// Returns `false` if a fresher entry was already present.
    pub fn store(&self, thread_id: &str, status: ExecutionStatus, fetched_at: Instant) -> bool {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(thread_id) {
            if existing.fetched_at > fetched_at {
                return false;
            }
        }
        entries.insert(
            thread_id.to_string(),
            CachedStatus { status, fetched_at },
        );
        true
    }

    pub fn invalidate(&self, thread_id: &str) {
        self.entries.lock().remove(thread_id);
    }

    /// Drop long-expired entries; returns how many were removed
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.fetched_at.elapsed() < self.sweep_after);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionState;

    fn status(state: ExecutionState) -> ExecutionStatus {
        ExecutionStatus::new("t", state)
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = StatusCache::new(Duration::from_secs(2), 5);
        cache.store("t", status(ExecutionState::Running), Instant::now());
        assert!(cache.get_fresh("t").is_some());

        tokio::time::advance(Duration::from_millis(1999)).await;
        assert!(cache.get_fresh("t").is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.get_fresh("t").is_none());
        // Stale but not yet swept.
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_older_response_does_not_overwrite() {
        let cache = StatusCache::new(Duration::from_secs(2), 5);
        let early = Instant::now();
        tokio::time::advance(Duration::from_millis(100)).await;
        let late = Instant::now();

        assert!(cache.store("t", status(ExecutionState::Completed), late));
        assert!(!cache.store("t", status(ExecutionState::Running), early));
        assert_eq!(
            cache.get_fresh("t").unwrap().status,
            ExecutionState::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_threshold() {
        let cache = StatusCache::new(Duration::from_secs(2), 5);
        cache.store("old", status(ExecutionState::Ready), Instant::now());
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.store("new", status(ExecutionState::Ready), Instant::now());

        assert_eq!(cache.sweep(), 0);
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
