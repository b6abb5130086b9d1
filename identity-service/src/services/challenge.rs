//! Short-lived per-subject ceremony state shared between a "begin" and its
//! matching "finish" request.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Map from subject id to a ceremony session with an absolute expiry.
///
/// Entries past their expiry are never returned, whether or not the sweeper
/// has evicted them yet. Each key is guarded by its DashMap shard lock, so
/// `take` removes atomically with respect to a concurrent `put` on the same
/// subject.
pub struct ChallengeSessionBroker<V> {
    entries: Arc<DashMap<i32, Entry<V>>>,
}

impl<V> Clone for ChallengeSessionBroker<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> Default for ChallengeSessionBroker<V> {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

impl<V: Send + Sync + 'static> ChallengeSessionBroker<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a session for the subject, replacing any previous one.
    pub fn put(&self, subject_id: i32, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries.insert(subject_id, Entry { value, expires_at });
    }

    pub fn get(&self, subject_id: i32) -> Option<V>
    where
        V: Clone,
    {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(&subject_id) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }
        self.entries
            .remove_if(&subject_id, |_, entry| entry.is_expired(now));
        None
    }

    /// Remove and return the session. A second call for the same subject
    /// finds nothing.
    pub fn take(&self, subject_id: i32) -> Option<V> {
        let now = Instant::now();
        self.entries
            .remove(&subject_id)
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(_, entry)| entry.value)
    }

    pub fn delete(&self, subject_id: i32) {
        self.entries.remove(&subject_id);
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Periodically evict expired entries until `shutdown` is cancelled.
    pub fn spawn_sweeper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let broker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Challenge session sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = broker.evict_expired();
                        if evicted > 0 {
                            tracing::debug!(evicted, "Evicted expired challenge sessions");
                        }
                    }
                }
            }
        })
    }
}
