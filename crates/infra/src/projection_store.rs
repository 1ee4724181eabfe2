//! Read-model storage: snapshot lookup by aggregate key or external key.
//!
//! The store is the narrow interface the folding engine writes through and
//! query handlers read from. The [`SnapshotCache`] decorator keeps a
//! read-side cache that is re-populated synchronously on every write, so a
//! reader never observes a projection older than the last committed fold.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use clienthub_core::AggregateId;
use clienthub_messaging::ProjectionFold;

/// Keyed projection storage.
pub trait ProjectionStore<P>: Send + Sync {
    fn get(&self, aggregate_id: AggregateId) -> Option<P>;

    /// Snapshot lookup by the projection's external key, when it has one.
    fn get_by_external_key(&self, external_key: &str) -> Option<P>;

    fn put(&self, projection: P);

    fn invalidate(&self, aggregate_id: AggregateId);

    /// All stored projections (specification-filtered queries run over this).
    fn list(&self) -> Vec<P>;
}

impl<P, S> ProjectionStore<P> for Arc<S>
where
    S: ProjectionStore<P> + ?Sized,
{
    fn get(&self, aggregate_id: AggregateId) -> Option<P> {
        (**self).get(aggregate_id)
    }

    fn get_by_external_key(&self, external_key: &str) -> Option<P> {
        (**self).get_by_external_key(external_key)
    }

    fn put(&self, projection: P) {
        (**self).put(projection)
    }

    fn invalidate(&self, aggregate_id: AggregateId) {
        (**self).invalidate(aggregate_id)
    }

    fn list(&self) -> Vec<P> {
        (**self).list()
    }
}

#[derive(Debug)]
struct Rows<P> {
    by_aggregate: HashMap<AggregateId, P>,
    external_index: HashMap<String, AggregateId>,
}

impl<P> Default for Rows<P> {
    fn default() -> Self {
        Self {
            by_aggregate: HashMap::new(),
            external_index: HashMap::new(),
        }
    }
}

impl<P: ProjectionFold + Clone> Rows<P> {
    fn get(&self, aggregate_id: AggregateId) -> Option<P> {
        self.by_aggregate.get(&aggregate_id).cloned()
    }

    fn get_by_external_key(&self, external_key: &str) -> Option<P> {
        let aggregate_id = self.external_index.get(external_key)?;
        self.by_aggregate.get(aggregate_id).cloned()
    }

    fn put(&mut self, projection: P) {
        let aggregate_id = projection.aggregate_id();
        if let Some(key) = projection.external_key() {
            self.external_index.insert(key.to_string(), aggregate_id);
        }
        self.by_aggregate.insert(aggregate_id, projection);
    }

    fn invalidate(&mut self, aggregate_id: AggregateId) {
        self.by_aggregate.remove(&aggregate_id);
        self.external_index.retain(|_, id| *id != aggregate_id);
    }
}

/// In-memory projection store for tests/dev.
#[derive(Debug)]
pub struct InMemoryProjectionStore<P> {
    rows: RwLock<Rows<P>>,
}

impl<P> InMemoryProjectionStore<P> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Rows::default()),
        }
    }
}

impl<P> Default for InMemoryProjectionStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> InMemoryProjectionStore<P> {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Rows<P>> {
        match self.rows.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Rows<P>> {
        match self.rows.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<P: ProjectionFold + Clone> ProjectionStore<P> for InMemoryProjectionStore<P> {
    fn get(&self, aggregate_id: AggregateId) -> Option<P> {
        self.read().get(aggregate_id)
    }

    fn get_by_external_key(&self, external_key: &str) -> Option<P> {
        self.read().get_by_external_key(external_key)
    }

    fn put(&self, projection: P) {
        self.write().put(projection);
    }

    fn invalidate(&self, aggregate_id: AggregateId) {
        self.write().invalidate(aggregate_id);
    }

    fn list(&self) -> Vec<P> {
        self.read().by_aggregate.values().cloned().collect()
    }
}

/// Write-through snapshot cache in front of a backing projection store.
///
/// `put` updates the backing store and the cache in the same call, and `get`
/// misses fall through to the backing store and re-populate the cache.
#[derive(Debug)]
pub struct SnapshotCache<P, S> {
    backing: S,
    cache: RwLock<Rows<P>>,
}

impl<P, S> SnapshotCache<P, S> {
    pub fn new(backing: S) -> Self {
        Self {
            backing,
            cache: RwLock::new(Rows::default()),
        }
    }

    pub fn backing(&self) -> &S {
        &self.backing
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, Rows<P>> {
        match self.cache.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_cache(&self) -> std::sync::RwLockWriteGuard<'_, Rows<P>> {
        match self.cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<P, S> ProjectionStore<P> for SnapshotCache<P, S>
where
    P: ProjectionFold + Clone,
    S: ProjectionStore<P>,
{
    fn get(&self, aggregate_id: AggregateId) -> Option<P> {
        if let Some(hit) = self.read_cache().get(aggregate_id) {
            return Some(hit);
        }

        let loaded = self.backing.get(aggregate_id)?;
        self.write_cache().put(loaded.clone());
        Some(loaded)
    }

    fn get_by_external_key(&self, external_key: &str) -> Option<P> {
        if let Some(hit) = self.read_cache().get_by_external_key(external_key) {
            return Some(hit);
        }

        let loaded = self.backing.get_by_external_key(external_key)?;
        self.write_cache().put(loaded.clone());
        Some(loaded)
    }

    fn put(&self, projection: P) {
        self.backing.put(projection.clone());
        self.write_cache().put(projection);
    }

    fn invalidate(&self, aggregate_id: AggregateId) {
        self.write_cache().invalidate(aggregate_id);
        self.backing.invalidate(aggregate_id);
    }

    fn list(&self) -> Vec<P> {
        self.backing.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestView {
        aggregate_id: AggregateId,
        external_key: String,
        version: u64,
    }

    // Minimal fold impl so the store traits accept the type; the fold itself
    // is not exercised here.
    impl ProjectionFold for TestView {
        type Ev = TestEvent;

        fn fold(
            _current: Option<Self>,
            _envelope: &clienthub_messaging::EventEnvelope<Self::Ev>,
        ) -> Result<Self, clienthub_messaging::FoldError> {
            unimplemented!("not used by storage tests")
        }

        fn aggregate_id(&self) -> AggregateId {
            self.aggregate_id
        }

        fn external_key(&self) -> Option<&str> {
            Some(&self.external_key)
        }

        fn version(&self) -> u64 {
            self.version
        }
    }

    #[derive(Debug, Clone)]
    struct TestEvent;

    impl clienthub_messaging::DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            "test.event"
        }

        fn schema_version(&self) -> u32 {
            1
        }
    }

    fn view(external_key: &str, version: u64) -> TestView {
        TestView {
            aggregate_id: AggregateId::new(),
            external_key: external_key.to_string(),
            version,
        }
    }

    #[test]
    fn put_then_get_by_both_keys() {
        let store = InMemoryProjectionStore::new();
        let v = view("EXT-1", 1);
        store.put(v.clone());

        assert_eq!(store.get(v.aggregate_id), Some(v.clone()));
        assert_eq!(store.get_by_external_key("EXT-1"), Some(v));
        assert_eq!(store.get_by_external_key("EXT-2"), None);
    }

    #[test]
    fn put_replaces_the_existing_row() {
        let store = InMemoryProjectionStore::new();
        let mut v = view("EXT-1", 1);
        store.put(v.clone());
        v.version = 2;
        store.put(v.clone());

        assert_eq!(store.get(v.aggregate_id).unwrap().version, 2);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn invalidate_removes_row_and_external_index() {
        let store = InMemoryProjectionStore::new();
        let v = view("EXT-1", 1);
        store.put(v.clone());
        store.invalidate(v.aggregate_id);

        assert_eq!(store.get(v.aggregate_id), None);
        assert_eq!(store.get_by_external_key("EXT-1"), None);
    }

    /// Backing store that counts reads, to observe cache behavior.
    struct CountingStore {
        inner: InMemoryProjectionStore<TestView>,
        reads: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryProjectionStore::new(),
                reads: AtomicUsize::new(0),
            }
        }
    }

    impl ProjectionStore<TestView> for CountingStore {
        fn get(&self, aggregate_id: AggregateId) -> Option<TestView> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(aggregate_id)
        }

        fn get_by_external_key(&self, external_key: &str) -> Option<TestView> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_by_external_key(external_key)
        }

        fn put(&self, projection: TestView) {
            self.inner.put(projection)
        }

        fn invalidate(&self, aggregate_id: AggregateId) {
            self.inner.invalidate(aggregate_id)
        }

        fn list(&self) -> Vec<TestView> {
            self.inner.list()
        }
    }

    #[test]
    fn cache_serves_repeat_reads_without_touching_the_backing_store() {
        let cache = SnapshotCache::new(CountingStore::new());
        let v = view("EXT-1", 1);
        cache.backing().put(v.clone());

        // First read misses and populates, second is served from cache.
        assert_eq!(cache.get(v.aggregate_id), Some(v.clone()));
        assert_eq!(cache.get(v.aggregate_id), Some(v.clone()));
        assert_eq!(cache.backing().reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn write_through_put_updates_cache_synchronously() {
        let cache = SnapshotCache::new(CountingStore::new());
        let mut v = view("EXT-1", 1);
        cache.put(v.clone());

        // Served from cache without a backing read.
        assert_eq!(cache.get(v.aggregate_id).unwrap().version, 1);
        assert_eq!(cache.backing().reads.load(Ordering::SeqCst), 0);

        // A newer write is visible immediately.
        v.version = 2;
        cache.put(v.clone());
        assert_eq!(cache.get(v.aggregate_id).unwrap().version, 2);
        assert_eq!(cache.get_by_external_key("EXT-1").unwrap().version, 2);
    }

    #[test]
    fn invalidate_clears_cache_and_backing() {
        let cache = SnapshotCache::new(CountingStore::new());
        let v = view("EXT-1", 1);
        cache.put(v.clone());
        cache.invalidate(v.aggregate_id);

        assert_eq!(cache.get(v.aggregate_id), None);
        assert_eq!(cache.get_by_external_key("EXT-1"), None);
    }
}
