//! Reconciliation cache
//!
//! Keyed by instance id. Expiry is picked per entry when it is written,
//! from the status the instance had at that moment: active instances
//! live for days, anything still moving lives for seconds and terminal
//! instances are never kept.
//!
//! Misses are single-flight: concurrent callers asking for the same
//! missing id share one provider call.
//!
//! Every id carries a generation that [`ReconciliationCache::invalidate`]
//! bumps. A load remembers the generation it started under and its result
//! is dropped if an invalidation landed in the meantime, so a read that
//! overlaps a tag write cannot put the pre-write view back.

use crate::error::Result;
use crate::model::{Instance, InstanceStatus};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;

/// Default lifetime of an entry for an active instance
pub const DEFAULT_ACTIVE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default lifetime of an entry for an instance that is still changing state
pub const DEFAULT_TRANSIENT_TTL: Duration = Duration::from_secs(5);

/// Default lifetime of an inventory record read by the inventory bridge
pub const DEFAULT_INVENTORY_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub active_ttl: Duration,
    pub transient_ttl: Duration,
    pub inventory_ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            active_ttl: DEFAULT_ACTIVE_TTL,
            transient_ttl: DEFAULT_TRANSIENT_TTL,
            inventory_ttl: DEFAULT_INVENTORY_TTL,
        }
    }
}

impl CachePolicy {
    /// How long an instance seen in `status` may be served from cache
    ///
    /// `None` means the entry must not be kept at all.
    pub fn ttl_for(&self, status: InstanceStatus) -> Option<Duration> {
        match status {
            InstanceStatus::Active => Some(self.active_ttl),
            InstanceStatus::Terminated => None,
            InstanceStatus::Requested | InstanceStatus::Building | InstanceStatus::Unknown => {
                Some(self.transient_ttl)
            }
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    instance: Instance,
    expires_at: Instant,
}

type Load = Arc<OnceCell<Result<Option<Instance>>>>;

/// Invalidation counter of one id, see [`ReconciliationCache::generation`]
pub type Generation = u64;

#[derive(Debug, Default)]
pub struct ReconciliationCache {
    policy: CachePolicy,
    entries: DashMap<String, CacheEntry>,
    in_flight: DashMap<String, Load>,
    // lock order: generations before entries
    generations: DashMap<String, Generation>,
}

impl ReconciliationCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            generations: DashMap::new(),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Serve `id` from cache, or load it once no matter how many callers ask
    ///
    /// The outcome of a shared load, error included, is handed to every
    /// caller that joined it. A failed load is not remembered.
    pub async fn get_or_load<F, Fut>(&self, id: &str, loader: F) -> Result<Option<Instance>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Instance>>>,
    {
        if let Some(instance) = self.peek(id) {
            return Ok(Some(instance));
        }

        let cell = self
            .in_flight
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();

        let outcome = cell
            .get_or_init(|| async {
                // a load that finished between peek and join already stored its result
                if let Some(instance) = self.peek(id) {
                    return Ok(Some(instance));
                }
                tracing::debug!("Cache miss for instance {}", id);
                let generation = self.generation(id);
                let outcome = loader().await;
                match &outcome {
                    Ok(Some(instance)) => {
                        self.store_if_current(instance.clone(), generation);
                    }
                    Ok(None) => {
                        self.entries.remove(id);
                    }
                    Err(e) => tracing::debug!("Load of instance {} failed: {}", id, e),
                }
                outcome
            })
            .await
            .clone();

        self.in_flight
            .remove_if(id, |_, current| Arc::ptr_eq(current, &cell));
        outcome
    }

    /// Current generation of `id`; pass it to [`Self::store_if_current`]
    /// once the view read under it is ready
    pub fn generation(&self, id: &str) -> Generation {
        self.generations.get(id).map(|g| *g).unwrap_or(0)
    }

    /// Store `instance` unless `id` was invalidated since `generation` was taken
    ///
    /// Returns whether the entry was written.
    pub fn store_if_current(&self, instance: Instance, generation: Generation) -> bool {
        let current = self.generations.entry(instance.id.clone()).or_insert(0);
        if *current != generation {
            tracing::debug!(
                "Dropping stale view of instance {} (generation {} < {})",
                instance.id,
                generation,
                *current
            );
            return false;
        }
        self.write(instance);
        true
    }

    /// Write `instance` with the lifetime its status calls for
    pub fn store(&self, instance: Instance) {
        // serialize with invalidate
        let _generation = self.generations.entry(instance.id.clone()).or_insert(0);
        self.write(instance);
    }

    fn write(&self, instance: Instance) {
        match self.policy.ttl_for(instance.status) {
            Some(ttl) => {
                tracing::trace!(
                    "Caching instance {} ({}) for {:?}",
                    instance.id,
                    instance.status,
                    ttl
                );
                self.entries.insert(
                    instance.id.clone(),
                    CacheEntry {
                        instance,
                        expires_at: Instant::now() + ttl,
                    },
                );
            }
            None => {
                self.entries.remove(&instance.id);
            }
        }
    }

    /// Fresh entry for `id`, if any; an expired entry is dropped
    pub fn peek(&self, id: &str) -> Option<Instance> {
        let now = Instant::now();
        let expired = match self.entries.get(id) {
            Some(entry) if entry.expires_at > now => return Some(entry.instance.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(id, |_, entry| entry.expires_at <= now);
        }
        None
    }

    /// Drop the entry for `id` and fence off loads already running for it
    ///
    /// Callers arriving afterwards start a fresh load instead of joining
    /// one that may have read the pre-invalidation state.
    pub fn invalidate(&self, id: &str) {
        let mut generation = self.generations.entry(id.to_string()).or_insert(0);
        *generation += 1;
        self.in_flight.remove(id);
        if self.entries.remove(id).is_some() {
            tracing::debug!("Invalidated cached instance {}", id);
        }
    }

    /// Number of stored entries, expired ones included until they are touched
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn instance(id: &str, status: InstanceStatus) -> Instance {
        Instance::new(id, "web", "m1.tiny", status)
    }

    #[test]
    fn test_policy_ttls() {
        let policy = CachePolicy::default();
        assert_eq!(policy.ttl_for(InstanceStatus::Active), Some(DEFAULT_ACTIVE_TTL));
        assert_eq!(policy.ttl_for(InstanceStatus::Building), Some(DEFAULT_TRANSIENT_TTL));
        assert_eq!(policy.ttl_for(InstanceStatus::Requested), Some(DEFAULT_TRANSIENT_TTL));
        assert_eq!(policy.ttl_for(InstanceStatus::Terminated), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_lifetime_follows_status() {
        let cache = ReconciliationCache::default();
        cache.store(instance("i-active", InstanceStatus::Active));
        cache.store(instance("i-building", InstanceStatus::Building));
        cache.store(instance("i-gone", InstanceStatus::Terminated));
        assert_eq!(cache.len(), 2);

        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(cache.peek("i-active").is_some());
        assert!(cache.peek("i-building").is_none());
        assert!(cache.peek("i-gone").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_store_evicts_existing_entry() {
        let cache = ReconciliationCache::default();
        cache.store(instance("i-1", InstanceStatus::Active));
        cache.store(instance("i-1", InstanceStatus::Terminated));
        assert!(cache.peek("i-1").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_load() {
        let cache = ReconciliationCache::default();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let load = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Some(instance("i-1", InstanceStatus::Building)))
        };

        let (a, b) = tokio::join!(cache.get_or_load("i-1", load), cache.get_or_load("i-1", load));

        assert_eq!(a.unwrap().unwrap().id, "i-1");
        assert_eq!(b.unwrap().unwrap().id, "i-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_fresh_entry_skips_loader() {
        let cache = ReconciliationCache::default();
        cache.store(instance("i-1", InstanceStatus::Active));
        let calls = AtomicUsize::new(0);

        let loaded = cache
            .get_or_load("i-1", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            })
            .await
            .unwrap();
        assert!(loaded.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_is_shared_then_retried() {
        let cache = ReconciliationCache::default();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let failing = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(CloudError::upstream("get node", "i-1", "timeout"))
        };
        let (a, b) = tokio::join!(
            cache.get_or_load("i-1", failing),
            cache.get_or_load("i-1", failing)
        );
        assert!(a.is_err());
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let retried = cache
            .get_or_load("i-1", || async {
                Ok(Some(instance("i-1", InstanceStatus::Active)))
            })
            .await
            .unwrap();
        assert!(retried.is_some());
    }

    #[tokio::test]
    async fn test_missing_instance_is_not_cached() {
        let cache = ReconciliationCache::default();
        let loaded = cache.get_or_load("i-404", || async { Ok(None) }).await.unwrap();
        assert!(loaded.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let cache = ReconciliationCache::default();
        cache.store(instance("i-1", InstanceStatus::Active).with_tags(["old"]));
        cache.invalidate("i-1");

        let loaded = cache
            .get_or_load("i-1", || async {
                Ok(Some(instance("i-1", InstanceStatus::Active).with_tags(["new"])))
            })
            .await
            .unwrap()
            .unwrap();
        assert!(loaded.tags.contains("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_during_load_drops_stale_view() {
        let cache = ReconciliationCache::default();

        let slow_read = async {
            cache
                .get_or_load("i-1", || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(Some(instance("i-1", InstanceStatus::Active).with_tags(["old"])))
                })
                .await
        };
        let tag_write = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache.invalidate("i-1");
        };
        let (served, ()) = tokio::join!(slow_read, tag_write);
        assert!(served.unwrap().unwrap().tags.contains("old"));

        tokio::time::advance(Duration::from_secs(60 * 60)).await;
        assert!(cache.peek("i-1").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_after_invalidation_does_not_join_stale_load() {
        let cache = ReconciliationCache::default();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let early = async {
            cache
                .get_or_load("i-1", move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(Some(instance("i-1", InstanceStatus::Active).with_tags(["old"])))
                })
                .await
        };
        let late = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache.invalidate("i-1");
            cache
                .get_or_load("i-1", move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(Some(instance("i-1", InstanceStatus::Active).with_tags(["new"])))
                })
                .await
        };
        let (early, late) = tokio::join!(early, late);

        assert!(early.unwrap().unwrap().tags.contains("old"));
        assert!(late.unwrap().unwrap().tags.contains("new"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.peek("i-1").unwrap().tags.contains("new"));
    }

    #[test]
    fn test_store_if_current_rejects_older_generation() {
        let cache = ReconciliationCache::default();
        let before = cache.generation("i-1");
        cache.invalidate("i-1");

        assert!(!cache.store_if_current(instance("i-1", InstanceStatus::Active), before));
        assert!(cache.is_empty());

        let now = cache.generation("i-1");
        assert!(cache.store_if_current(instance("i-1", InstanceStatus::Active), now));
        assert!(cache.peek("i-1").is_some());
    }
}
