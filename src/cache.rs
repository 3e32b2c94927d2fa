use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::error::{Result, RosterError};
use crate::service::RecordService;
use crate::types::{Entity, Page, RecordPage};

type FetchOutput = std::result::Result<Arc<RecordPage>, String>;

/// Settled pages are dropped once this many stale periods old
const RETAIN_STALE_PERIODS: u32 = 4;
type SharedFetch = Shared<BoxFuture<'static, FetchOutput>>;

/// Identifies one cached page of one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchKey {
    pub entity: Entity,
    pub page: Page,
}

impl FetchKey {
    pub fn new(entity: Entity, page: Page) -> Self {
        Self { entity, page }
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity.path(), self.page)
    }
}

enum Slot {
    Ready {
        page: Arc<RecordPage>,
        fetched_at: Instant,
    },
    Pending {
        id: u64,
        fetch: SharedFetch,
        /// Last settled value, restored if this fetch fails
        previous: Option<(Arc<RecordPage>, Instant)>,
    },
}

#[derive(Default)]
struct Inner {
    slots: HashMap<FetchKey, Slot>,
    next_id: u64,
}

/// Page cache shared by every list view.
///
/// At most one request per key is in flight: a fetch for a key that is
/// already pending joins the pending request. The request writes its own
/// result back when it completes, no matter which caller drives it.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Mutex<Inner>>,
    stale_time: Duration,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("stale_time", &self.stale_time)
            .finish_non_exhaustive()
    }
}

enum Lookup {
    Hit(Arc<RecordPage>),
    Join(SharedFetch),
    Miss,
}

impl QueryCache {
    pub fn new(stale_time: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            stale_time,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    /// Resolve a page: fresh cached value, the pending request for the
    /// same key, or a new request. The returned future is `'static` so it
    /// can be handed to `tokio::spawn`.
    pub fn fetch(
        &self,
        key: FetchKey,
        service: Arc<dyn RecordService>,
        page_size: u32,
    ) -> BoxFuture<'static, Result<Arc<RecordPage>>> {
        let fetch = {
            let mut inner = self.lock();
            let lookup = match inner.slots.get(&key) {
                Some(Slot::Ready { page, fetched_at }) if fetched_at.elapsed() < self.stale_time => {
                    Lookup::Hit(Arc::clone(page))
                }
                Some(Slot::Pending { fetch, .. }) => Lookup::Join(fetch.clone()),
                _ => Lookup::Miss,
            };
            match lookup {
                Lookup::Hit(page) => return futures::future::ready(Ok(page)).boxed(),
                Lookup::Join(fetch) => {
                    debug!(%key, "joining in-flight fetch");
                    fetch
                }
                Lookup::Miss => self.start(&mut inner, key, service, page_size),
            }
        };

        async move { fetch.await.map_err(RosterError::Api) }.boxed()
    }

    fn start(
        &self,
        inner: &mut Inner,
        key: FetchKey,
        service: Arc<dyn RecordService>,
        page_size: u32,
    ) -> SharedFetch {
        inner.next_id += 1;
        let id = inner.next_id;
        let previous = match inner.slots.remove(&key) {
            Some(Slot::Ready { page, fetched_at }) => Some((page, fetched_at)),
            _ => None,
        };
        self.evict_expired(inner);

        let (skip, limit) = key.page.window(page_size);
        let cache = Arc::downgrade(&self.inner);
        let fetch = async move {
            debug!(%key, skip, limit, "fetching page");
            let result = service
                .list(key.entity, skip, limit)
                .await
                .map(Arc::new)
                .map_err(|e| e.to_string());
            settle(&cache, key, id, &result);
            result
        }
        .boxed()
        .shared();

        inner.slots.insert(
            key,
            Slot::Pending {
                id,
                fetch: fetch.clone(),
                previous,
            },
        );
        fetch
    }

    fn evict_expired(&self, inner: &mut Inner) {
        let retain_for = self.stale_time * RETAIN_STALE_PERIODS;
        let before = inner.slots.len();
        inner.slots.retain(|_, slot| match slot {
            Slot::Ready { fetched_at, .. } => fetched_at.elapsed() <= retain_for,
            Slot::Pending { .. } => true,
        });
        let evicted = before - inner.slots.len();
        if evicted > 0 {
            debug!(evicted, "evicted expired pages");
        }
    }

    /// Warm the cache for `key` in the background. Failures are only logged.
    pub fn prefetch(&self, key: FetchKey, service: Arc<dyn RecordService>, page_size: u32) {
        if self.is_fresh(&key) {
            return;
        }
        let fetch = self.fetch(key, service, page_size);
        tokio::spawn(async move {
            if let Err(e) = fetch.await {
                debug!(%key, error = %e, "prefetch failed");
            }
        });
    }

    /// Settled data for `key`, fresh or not. A pending refetch still
    /// reports the value it is replacing.
    pub fn peek(&self, key: &FetchKey) -> Option<Arc<RecordPage>> {
        match self.lock().slots.get(key)? {
            Slot::Ready { page, .. } => Some(Arc::clone(page)),
            Slot::Pending { previous, .. } => previous.as_ref().map(|(page, _)| Arc::clone(page)),
        }
    }

    pub fn is_fresh(&self, key: &FetchKey) -> bool {
        matches!(
            self.lock().slots.get(key),
            Some(Slot::Ready { fetched_at, .. }) if fetched_at.elapsed() < self.stale_time
        )
    }

    #[cfg(test)]
    pub fn is_pending(&self, key: &FetchKey) -> bool {
        matches!(self.lock().slots.get(key), Some(Slot::Pending { .. }))
    }

    /// Forget everything cached for `entity`. Requests already in flight
    /// still resolve for their callers but no longer write back.
    pub fn invalidate(&self, entity: Entity) {
        let mut inner = self.lock();
        let before = inner.slots.len();
        inner.slots.retain(|key, _| key.entity != entity);
        debug!(
            entity = entity.path(),
            dropped = before - inner.slots.len(),
            "invalidated cache"
        );
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Store the outcome of fetch `id`, unless the slot was invalidated or
/// taken over by a newer fetch meanwhile
fn settle(cache: &Weak<Mutex<Inner>>, key: FetchKey, id: u64, result: &FetchOutput) {
    let Some(cache) = cache.upgrade() else {
        return;
    };
    let mut inner = lock(&cache);
    let previous = match inner.slots.get_mut(&key) {
        Some(Slot::Pending {
            id: pending,
            previous,
            ..
        }) if *pending == id => previous.take(),
        _ => {
            debug!(%key, "dropping superseded fetch result");
            return;
        }
    };

    match result {
        Ok(page) => {
            inner.slots.insert(
                key,
                Slot::Ready {
                    page: Arc::clone(page),
                    fetched_at: Instant::now(),
                },
            );
        }
        Err(e) => {
            debug!(%key, error = %e, "fetch failed");
            match previous {
                Some((page, fetched_at)) => {
                    inner.slots.insert(key, Slot::Ready { page, fetched_at });
                }
                None => {
                    inner.slots.remove(&key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fake::FakeService;

    const PAGE_SIZE: u32 = 5;

    fn key(page: u32) -> FetchKey {
        FetchKey::new(Entity::Item, Page::new(page).unwrap())
    }

    fn setup(items: u64) -> (QueryCache, Arc<FakeService>) {
        (
            QueryCache::new(Duration::from_secs(60)),
            Arc::new(FakeService::with_items(items)),
        )
    }

    #[tokio::test]
    async fn concurrent_fetches_share_one_request() {
        let (cache, service) = setup(12);
        let a = cache.fetch(key(1), service.clone(), PAGE_SIZE);
        let b = cache.fetch(key(1), service.clone(), PAGE_SIZE);
        let (a, b) = tokio::join!(a, b);
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn fresh_page_served_from_cache() {
        let (cache, service) = setup(12);
        cache.fetch(key(1), service.clone(), PAGE_SIZE).await.unwrap();
        let page = cache.fetch(key(1), service.clone(), PAGE_SIZE).await.unwrap();
        assert_eq!(page.len(), 5);
        assert_eq!(service.calls(), 1);
        assert!(cache.is_fresh(&key(1)));
    }

    #[tokio::test]
    async fn stale_page_is_refetched() {
        let cache = QueryCache::new(Duration::ZERO);
        let service = Arc::new(FakeService::with_items(12));
        cache.fetch(key(1), service.clone(), PAGE_SIZE).await.unwrap();
        cache.fetch(key(1), service.clone(), PAGE_SIZE).await.unwrap();
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn window_derived_from_page() {
        let (cache, service) = setup(30);
        cache.fetch(key(1), service.clone(), PAGE_SIZE).await.unwrap();
        cache.fetch(key(3), service.clone(), PAGE_SIZE).await.unwrap();
        assert_eq!(service.windows(), vec![(0, 5), (10, 5)]);
    }

    #[tokio::test]
    async fn different_keys_fetch_independently() {
        let (cache, service) = setup(12);
        let (one, two) = tokio::join!(
            cache.fetch(key(1), service.clone(), PAGE_SIZE),
            cache.fetch(key(2), service.clone(), PAGE_SIZE),
        );
        assert_eq!(one.unwrap().data[0].id(), 1);
        assert_eq!(two.unwrap().data[0].id(), 6);
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn failed_page_leaves_other_pages_intact() {
        let (cache, service) = setup(12);
        cache.fetch(key(1), service.clone(), PAGE_SIZE).await.unwrap();
        service.fail_at(5);

        let err = cache.fetch(key(2), service.clone(), PAGE_SIZE).await;
        assert!(matches!(err, Err(RosterError::Api(_))));

        let first = cache.peek(&key(1)).unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(first.data[0].id(), 1);
        assert!(cache.peek(&key(2)).is_none());
        assert!(!cache.is_pending(&key(2)));
    }

    #[tokio::test]
    async fn failed_refetch_keeps_previous_value() {
        let cache = QueryCache::new(Duration::ZERO);
        let service = Arc::new(FakeService::with_items(12));
        cache.fetch(key(1), service.clone(), PAGE_SIZE).await.unwrap();
        service.fail_at(0);
        assert!(cache.fetch(key(1), service.clone(), PAGE_SIZE).await.is_err());
        assert_eq!(cache.peek(&key(1)).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn failed_fetch_is_retried_on_next_request() {
        let (cache, service) = setup(12);
        service.fail_at(5);
        assert!(cache.fetch(key(2), service.clone(), PAGE_SIZE).await.is_err());
        service.recover();
        let page = cache.fetch(key(2), service.clone(), PAGE_SIZE).await.unwrap();
        assert_eq!(page.data[0].id(), 6);
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn slow_failure_frees_the_slot_for_the_next_request() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let service = Arc::new(FakeService::with_items(12).delayed(Duration::from_millis(20)));
        service.fail_at(5);

        // a second caller while the request hangs joins it
        let first = cache.fetch(key(2), service.clone(), PAGE_SIZE);
        let joined = cache.fetch(key(2), service.clone(), PAGE_SIZE);
        let (first, joined) = tokio::join!(first, joined);
        assert!(first.is_err() && joined.is_err());
        assert_eq!(service.calls(), 1);
        assert!(!cache.is_pending(&key(2)));

        service.recover();
        let page = cache.fetch(key(2), service.clone(), PAGE_SIZE).await.unwrap();
        assert_eq!(page.data[0].id(), 6);
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn peek_during_refetch_reports_previous() {
        let cache = QueryCache::new(Duration::ZERO);
        let service = Arc::new(FakeService::with_items(12));
        cache.fetch(key(1), service.clone(), PAGE_SIZE).await.unwrap();
        let pending = cache.fetch(key(1), service.clone(), PAGE_SIZE);
        assert!(cache.is_pending(&key(1)));
        assert_eq!(cache.peek(&key(1)).unwrap().len(), 5);
        pending.await.unwrap();
        assert!(!cache.is_pending(&key(1)));
    }

    #[tokio::test]
    async fn invalidate_drops_entity_pages() {
        let (cache, service) = setup(12);
        cache.fetch(key(1), service.clone(), PAGE_SIZE).await.unwrap();
        let meeting_key = FetchKey::new(Entity::Meeting, Page::FIRST);
        cache.fetch(meeting_key, service.clone(), PAGE_SIZE).await.unwrap();

        cache.invalidate(Entity::Item);
        assert!(cache.peek(&key(1)).is_none());
        assert!(cache.peek(&meeting_key).is_some());

        cache.fetch(key(1), service.clone(), PAGE_SIZE).await.unwrap();
        assert_eq!(service.calls(), 3);
    }

    #[tokio::test]
    async fn fetch_started_before_invalidate_does_not_write_back() {
        let (cache, service) = setup(12);
        let in_flight = cache.fetch(key(1), service.clone(), PAGE_SIZE);
        cache.invalidate(Entity::Item);
        assert_eq!(in_flight.await.unwrap().len(), 5);
        assert!(cache.peek(&key(1)).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn expired_pages_are_evicted_on_next_fetch() {
        let cache = QueryCache::new(Duration::from_millis(5));
        let service = Arc::new(FakeService::with_items(30));
        cache.fetch(key(1), service.clone(), PAGE_SIZE).await.unwrap();
        cache.fetch(key(2), service.clone(), PAGE_SIZE).await.unwrap();
        assert_eq!(cache.len(), 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.fetch(key(3), service.clone(), PAGE_SIZE).await.unwrap();
        assert!(cache.peek(&key(1)).is_none());
        assert!(cache.peek(&key(2)).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn stale_but_retained_page_still_shown_during_refetch() {
        let cache = QueryCache::new(Duration::from_millis(20));
        let service = Arc::new(FakeService::with_items(12).delayed(Duration::from_millis(5)));
        cache.fetch(key(1), service.clone(), PAGE_SIZE).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let refetch = cache.fetch(key(1), service.clone(), PAGE_SIZE);
        assert_eq!(cache.peek(&key(1)).unwrap().len(), 5);
        refetch.await.unwrap();
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn prefetch_populates_cache() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let service = Arc::new(FakeService::with_items(12).delayed(Duration::from_millis(10)));
        cache.prefetch(key(2), service.clone(), PAGE_SIZE);
        assert!(cache.is_pending(&key(2)));

        // navigating while the prefetch is still running joins it
        let page = cache.fetch(key(2), service.clone(), PAGE_SIZE).await.unwrap();
        assert_eq!(page.data[0].id(), 6);
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn prefetch_failure_is_silent() {
        let (cache, service) = setup(12);
        service.fail_at(5);
        cache.prefetch(key(2), service.clone(), PAGE_SIZE);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.peek(&key(2)).is_none());
        assert!(!cache.is_pending(&key(2)));
    }
}
