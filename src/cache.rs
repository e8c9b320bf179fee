//! Time-bounded entity cache with cascading invalidation and fetch
//! coalescing.
//!
//! Entries are keyed by [`CacheKey`] and carry a generation stamp. A fetch
//! captures its key's generation at dispatch; its result is installed only
//! if that generation is still current at completion, so an invalidation
//! issued while the fetch was in flight always wins. Concurrent fetches for
//! the same key share one remote call through a watch channel.

use crate::{
    entity::{CacheKey, Entity},
    error::{Error, Result},
    metrics::EngineMetrics,
    role::ResourceType,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

#[cfg(feature = "audit")]
use log::debug;

/// Default entry lifetime: 5 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cache configuration: a default TTL plus per-resource-type overrides.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied when no override matches.
    pub default_ttl: Duration,
    /// Per-resource-type TTL overrides.
    pub ttl_overrides: HashMap<ResourceType, Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            ttl_overrides: HashMap::new(),
        }
    }
}

impl CacheConfig {
    /// Override the TTL for one resource type.
    pub fn with_ttl(mut self, resource: ResourceType, ttl: Duration) -> Self {
        self.ttl_overrides.insert(resource, ttl);
        self
    }

    fn ttl_for(&self, resource: ResourceType) -> Duration {
        self.ttl_overrides
            .get(&resource)
            .copied()
            .unwrap_or(self.default_ttl)
    }
}

/// A cached value with its validity metadata.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<Entity>,
    inserted_at: Instant,
    ttl: Duration,
    generation: u64,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.inserted_at.elapsed() < self.ttl
    }
}

type FetchResult = Result<Vec<Entity>>;

/// The scope node a key's generation hangs under: its own id for point
/// keys, its parent id for listings, `None` for root listings.
fn scope_of(key: &CacheKey) -> Option<String> {
    key.id.clone().or_else(|| key.parent.clone())
}

/// TTL-based cache of hierarchical entities.
///
/// All maps are sharded concurrent maps; generation bumps and installs go
/// through per-key entry locks so an interleaved invalidation is never lost.
pub struct EntityCache {
    entries: DashMap<CacheKey, CacheEntry>,
    /// Per-key generation counters. A record exists for every key that has
    /// ever been installed or fetched, so cascades reach in-flight keys too.
    generations: DashMap<CacheKey, u64>,
    /// Scope node -> ids of entities observed directly under it.
    children: DashMap<Option<String>, HashSet<String>>,
    in_flight: DashMap<CacheKey, watch::Receiver<Option<FetchResult>>>,
    config: CacheConfig,
    metrics: Arc<EngineMetrics>,
}

impl EntityCache {
    /// Create a cache with the given configuration and metrics sink.
    pub fn new(config: CacheConfig, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            entries: DashMap::new(),
            generations: DashMap::new(),
            children: DashMap::new(),
            in_flight: DashMap::new(),
            config,
            metrics,
        }
    }

    /// Look up a key. Absent, expired, and generation-stale entries are all
    /// a miss; stale entries are dropped on the way out.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<Entity>> {
        let current = self.generation(key);
        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh() && entry.generation == current {
                self.metrics.record_cache_hit();
                return Some(entry.value.clone());
            }
        }
        self.entries
            .remove_if(key, |_, entry| !entry.is_fresh() || entry.generation != current);
        self.metrics.record_cache_miss();
        None
    }

    /// Store a value under `key` with the current generation and the
    /// configured TTL. Entries are always replaced wholesale, never patched.
    pub fn put(&self, key: CacheKey, value: Vec<Entity>) {
        let generation = self.generation(&key);
        self.install(&key, value, generation);
    }

    /// Remove a single entry and bump its generation so any in-flight fetch
    /// for exactly this key is discarded on completion. Sibling keys are
    /// unaffected.
    pub fn invalidate(&self, key: &CacheKey) {
        *self.generations.entry(key.clone()).or_insert(0) += 1;
        self.entries.remove(key);
        #[cfg(feature = "audit")]
        debug!("cache invalidated: {key}");
    }

    /// Remove the entry for `key` and every entry keyed under any descendant
    /// of its scope, bumping each affected key's generation.
    ///
    /// For a point key this is the subtree rooted at the entity; for a
    /// listing key it is the parent scope itself: the parent's own point
    /// entries, the listing, and everything below.
    pub fn invalidate_cascade(&self, key: &CacheKey) {
        // Phase 1: collect the scope subtree from the children index.
        let mut scopes: HashSet<Option<String>> = HashSet::new();
        let mut queue: Vec<Option<String>> = vec![scope_of(key)];
        while let Some(node) = queue.pop() {
            if !scopes.insert(node.clone()) {
                continue;
            }
            if let Some((_, kids)) = self.children.remove(&node) {
                queue.extend(kids.into_iter().map(Some));
            }
        }

        // Phase 2: bump every key scoped inside the subtree, including keys
        // that only exist as in-flight fetches.
        let affected: Vec<CacheKey> = self
            .generations
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|k| scopes.contains(&scope_of(k)))
            .collect();
        for k in &affected {
            *self.generations.entry(k.clone()).or_insert(0) += 1;
        }

        // Phase 3: drop the dead entries.
        let doomed: Vec<CacheKey> = self
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|k| scopes.contains(&scope_of(k)))
            .collect();
        for k in &doomed {
            self.entries.remove(k);
        }

        #[cfg(feature = "audit")]
        debug!(
            "cache cascade from {key}: {} keys bumped, {} entries dropped",
            affected.len(),
            doomed.len()
        );
    }

    /// Return a valid cached value, attach to a pending fetch for the same
    /// key, or become the leader that issues `fetch` and installs its
    /// result.
    ///
    /// A fetch error is returned to every waiter but never populates the
    /// cache, so the next lookup retries. A result arriving after an
    /// invalidation of the key is handed to callers but discarded from the
    /// cache's point of view.
    pub async fn get_or_fetch<F, Fut>(&self, key: &CacheKey, fetch: F) -> FetchResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let sender = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                let mut rx = occupied.get().clone();
                drop(occupied);
                self.metrics.record_coalesced_wait();
                let outcome = match rx.wait_for(|slot| slot.is_some()).await {
                    Ok(slot) => (*slot).clone(),
                    Err(_) => {
                        // Leader abandoned mid-fetch; clear the slot so the
                        // next read starts fresh.
                        self.in_flight.remove(key);
                        return Err(Error::RemoteStore(
                            "fetch abandoned before completion".to_string(),
                        ));
                    }
                };
                return match outcome {
                    Some(result) => result,
                    None => Err(Error::RemoteStore(
                        "fetch completed without a result".to_string(),
                    )),
                };
            }
            Entry::Vacant(vacant) => {
                let (tx, rx) = watch::channel(None);
                vacant.insert(rx);
                tx
            }
        };

        // Leader path: capture the generation before suspending. The
        // or_insert registers the key so a cascade can reach it while the
        // fetch is parked.
        let generation = *self.generations.entry(key.clone()).or_insert(0);
        let result = fetch().await;
        self.in_flight.remove(key);

        if let Ok(value) = &result {
            self.install(key, value.clone(), generation);
        }

        let _ = sender.send(Some(result.clone()));
        result
    }

    /// Number of live entries (including any not yet purged after expiry).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries whose TTL has elapsed.
    pub fn purge_expired(&self) {
        self.entries.retain(|_, entry| entry.is_fresh());
    }

    /// Drop everything and bump every known generation, so in-flight
    /// fetches cannot repopulate.
    pub fn clear(&self) {
        for mut generation in self.generations.iter_mut() {
            *generation += 1;
        }
        self.entries.clear();
        self.children.clear();
    }

    fn generation(&self, key: &CacheKey) -> u64 {
        self.generations.get(key).map(|g| *g).unwrap_or(0)
    }

    /// Install under the generation entry lock: a bump interleaved between
    /// the staleness check and the insert cannot be lost.
    fn install(&self, key: &CacheKey, value: Vec<Entity>, generation: u64) -> bool {
        let guard = self.generations.entry(key.clone()).or_insert(0);
        if *guard != generation {
            self.metrics.record_stale_discard();
            return false;
        }
        self.index_value(key, &value);
        self.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl: self.config.ttl_for(key.resource),
                generation,
            },
        );
        drop(guard);
        true
    }

    /// Record parent -> child edges for every entity observed, so cascades
    /// can walk the tree later.
    fn index_value(&self, key: &CacheKey, value: &[Entity]) {
        let mut kids = self.children.entry(key.parent.clone()).or_default();
        if let Some(id) = &key.id {
            kids.insert(id.clone());
        }
        for entity in value {
            kids.insert(entity.id().to_string());
        }
    }
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("entries", &self.entries.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Application, Client, Credential};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn client(id: &str) -> Entity {
        Entity::Client(Client {
            id: id.to_string(),
            name: format!("client {id}"),
            company_name: "Acme Corp".to_string(),
            notes: None,
        })
    }

    fn application(id: &str, client_id: &str) -> Entity {
        Entity::Application(Application {
            id: id.to_string(),
            client_id: client_id.to_string(),
            name: format!("app {id}"),
            url: None,
            description: None,
        })
    }

    fn credential(id: &str, app_id: &str) -> Entity {
        Entity::Credential(Credential {
            id: id.to_string(),
            app_id: app_id.to_string(),
            username: "svc".to_string(),
            secret_ciphertext: "AAAA".to_string(),
            role: None,
            notes: None,
        })
    }

    fn new_cache(config: CacheConfig) -> EntityCache {
        EntityCache::new(config, Arc::new(EngineMetrics::new()))
    }

    #[test]
    fn test_put_then_get_hits() {
        let cache = new_cache(CacheConfig::default());
        let key = CacheKey::listing(ResourceType::Client, None);
        cache.put(key.clone(), vec![client("c1")]);
        let value = cache.get(&key).unwrap();
        assert_eq!(value.len(), 1);
        assert_eq!(value[0].id(), "c1");
    }

    #[test]
    fn test_absent_key_misses() {
        let cache = new_cache(CacheConfig::default());
        assert!(cache
            .get(&CacheKey::listing(ResourceType::Client, None))
            .is_none());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = new_cache(
            CacheConfig::default().with_ttl(ResourceType::Client, Duration::from_millis(40)),
        );
        let key = CacheKey::listing(ResourceType::Client, None);
        cache.put(key.clone(), vec![client("c1")]);
        assert!(cache.get(&key).is_some());
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_invalidate_is_precise() {
        let cache = new_cache(CacheConfig::default());
        let listing = CacheKey::listing(ResourceType::Application, Some("c1"));
        let point = CacheKey::point(ResourceType::Application, Some("c1"), "a1");
        cache.put(listing.clone(), vec![application("a1", "c1")]);
        cache.put(point.clone(), vec![application("a1", "c1")]);

        cache.invalidate(&listing);

        assert!(cache.get(&listing).is_none());
        assert!(cache.get(&point).is_some(), "sibling key must survive");
    }

    #[test]
    fn test_cascade_three_levels() {
        let cache = new_cache(CacheConfig::default());
        let client_point = CacheKey::point(ResourceType::Client, None, "c1");
        let app_listing = CacheKey::listing(ResourceType::Application, Some("c1"));
        let app_point = CacheKey::point(ResourceType::Application, Some("c1"), "a1");
        let cred_listing = CacheKey::listing(ResourceType::Credential, Some("a1"));

        cache.put(client_point.clone(), vec![client("c1")]);
        cache.put(app_listing.clone(), vec![application("a1", "c1")]);
        cache.put(app_point.clone(), vec![application("a1", "c1")]);
        cache.put(cred_listing.clone(), vec![credential("x1", "a1")]);

        cache.invalidate_cascade(&client_point);

        assert!(cache.get(&client_point).is_none());
        assert!(cache.get(&app_listing).is_none());
        assert!(cache.get(&app_point).is_none());
        assert!(cache.get(&cred_listing).is_none());
    }

    #[test]
    fn test_cascade_from_listing_covers_parent_point() {
        let cache = new_cache(CacheConfig::default());
        let client_point = CacheKey::point(ResourceType::Client, None, "c1");
        let app_listing = CacheKey::listing(ResourceType::Application, Some("c1"));
        cache.put(client_point.clone(), vec![client("c1")]);
        cache.put(app_listing.clone(), vec![application("a1", "c1")]);

        cache.invalidate_cascade(&app_listing);

        assert!(cache.get(&app_listing).is_none());
        assert!(cache.get(&client_point).is_none());
    }

    #[test]
    fn test_cascade_leaves_unrelated_trees_alone() {
        let cache = new_cache(CacheConfig::default());
        let first = CacheKey::listing(ResourceType::Application, Some("c1"));
        let second = CacheKey::listing(ResourceType::Application, Some("c2"));
        cache.put(first.clone(), vec![application("a1", "c1")]);
        cache.put(second.clone(), vec![application("a2", "c2")]);

        cache.invalidate_cascade(&CacheKey::point(ResourceType::Client, None, "c1"));

        assert!(cache.get(&first).is_none());
        assert!(cache.get(&second).is_some());
    }

    #[tokio::test]
    async fn test_get_or_fetch_populates_once() {
        let cache = new_cache(CacheConfig::default());
        let key = CacheKey::listing(ResourceType::Client, None);
        let calls = AtomicU64::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_fetch(&key, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(vec![client("c1")]) }
                })
                .await
                .unwrap();
            assert_eq!(value.len(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_are_coalesced() {
        let cache = Arc::new(new_cache(CacheConfig::default()));
        let key = CacheKey::listing(ResourceType::Client, None);
        let calls = Arc::new(AtomicU64::new(0));

        let fetch = |calls: Arc<AtomicU64>| {
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(vec![client("c1")])
                }
            }
        };

        let (first, second) = tokio::join!(
            cache.get_or_fetch(&key, fetch(Arc::clone(&calls))),
            cache.get_or_fetch(&key, fetch(Arc::clone(&calls))),
        );
        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidation_beats_in_flight_fetch() {
        let cache = Arc::new(new_cache(CacheConfig::default()));
        let key = CacheKey::listing(ResourceType::Client, None);
        let (release, parked) = tokio::sync::oneshot::channel::<()>();

        let worker = {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .get_or_fetch(&key, move || async move {
                        parked.await.ok();
                        Ok(vec![client("c1")])
                    })
                    .await
            })
        };

        // Let the fetch dispatch and park, then invalidate under it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.invalidate(&key);
        release.send(()).ok();

        let result = worker.await.unwrap().unwrap();
        assert_eq!(result.len(), 1, "caller still receives the fetched data");
        assert!(
            cache.get(&key).is_none(),
            "stale result must not repopulate the cache"
        );
    }

    #[tokio::test]
    async fn test_cascade_beats_in_flight_descendant_fetch() {
        let cache = Arc::new(new_cache(CacheConfig::default()));
        cache.put(
            CacheKey::listing(ResourceType::Application, Some("c1")),
            vec![application("a1", "c1")],
        );
        let cred_key = CacheKey::listing(ResourceType::Credential, Some("a1"));
        let (release, parked) = tokio::sync::oneshot::channel::<()>();

        let worker = {
            let cache = Arc::clone(&cache);
            let key = cred_key.clone();
            tokio::spawn(async move {
                cache
                    .get_or_fetch(&key, move || async move {
                        parked.await.ok();
                        Ok(vec![credential("x1", "a1")])
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.invalidate_cascade(&CacheKey::point(ResourceType::Client, None, "c1"));
        release.send(()).ok();

        worker.await.unwrap().unwrap();
        assert!(cache.get(&cred_key).is_none());
    }

    #[tokio::test]
    async fn test_fetch_errors_are_not_cached() {
        let cache = new_cache(CacheConfig::default());
        let key = CacheKey::listing(ResourceType::Client, None);
        let calls = AtomicU64::new(0);

        let result = cache
            .get_or_fetch(&key, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::RemoteStore("boom".to_string())) }
            })
            .await;
        assert!(result.is_err());
        assert!(cache.get(&key).is_none());

        // The next read retries instead of seeing a cached error.
        let value = cache
            .get_or_fetch(&key, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(vec![client("c1")]) }
            })
            .await
            .unwrap();
        assert_eq!(value.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clear_empties_and_defeats_inflight() {
        let cache = new_cache(CacheConfig::default());
        let key = CacheKey::listing(ResourceType::Client, None);
        cache.put(key.clone(), vec![client("c1")]);
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_purge_expired_drops_only_dead_entries() {
        let cache = new_cache(
            CacheConfig::default().with_ttl(ResourceType::Client, Duration::from_millis(30)),
        );
        let short = CacheKey::listing(ResourceType::Client, None);
        let long = CacheKey::listing(ResourceType::Application, Some("c1"));
        cache.put(short.clone(), vec![client("c1")]);
        cache.put(long.clone(), vec![application("a1", "c1")]);

        std::thread::sleep(Duration::from_millis(50));
        cache.purge_expired();

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&long).is_some());
    }
}
