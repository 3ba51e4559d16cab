//! Response cache in front of a [`PlacesClient`].
//!
//! Keyed on the serialized request shape. A cache hit skips the provider
//! call entirely; a miss calls through and populates the cache on success
//! only — a provider error is never cached, so a transient outage doesn't
//! poison subsequent identical requests for the TTL window.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::RestaurantResult;
use crate::places::{PlacesClient, PlacesError, PlacesRequest};

pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    results: Vec<RestaurantResult>,
    cached_at: Instant,
}

/// Wraps any [`PlacesClient`] with an in-memory, request-keyed cache.
pub struct CachedPlacesClient<C> {
    inner: C,
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl<C: PlacesClient> CachedPlacesClient<C> {
    pub fn new(inner: C) -> Self {
        Self { inner, entries: DashMap::new(), ttl: CACHE_TTL }
    }

    #[cfg(test)]
    fn with_ttl(inner: C, ttl: Duration) -> Self {
        Self { inner, entries: DashMap::new(), ttl }
    }

    fn cache_key(request: &PlacesRequest) -> String {
        serde_json::to_string(request).unwrap_or_default()
    }
}

#[async_trait]
impl<C: PlacesClient> PlacesClient for CachedPlacesClient<C> {
    async fn search(&self, request: PlacesRequest, timeout: Duration) -> Result<Vec<RestaurantResult>, PlacesError> {
        let key = Self::cache_key(&request);

        if let Some(entry) = self.entries.get(&key) {
            if entry.cached_at.elapsed() < self.ttl {
                return Ok(entry.results.clone());
            }
        }

        let results = self.inner.search(request, timeout).await?;
        self.entries.insert(key, CacheEntry { results: results.clone(), cached_at: Instant::now() });
        Ok(results)
    }
}

pub type SharedPlacesClient = Arc<dyn PlacesClient>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LatLng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PlacesClient for CountingClient {
        async fn search(&self, _request: PlacesRequest, _timeout: Duration) -> Result<Vec<RestaurantResult>, PlacesError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn request() -> PlacesRequest {
        PlacesRequest::Nearby {
            location: LatLng { lat: 1.0, lng: 2.0 },
            radius_meters: 500,
            keyword: None,
            open_now: None,
            price_level: None,
        }
    }

    #[tokio::test]
    async fn repeated_identical_request_hits_cache() {
        let client = CachedPlacesClient::new(CountingClient { calls: AtomicUsize::new(0) });
        client.search(request(), Duration::from_secs(1)).await.unwrap();
        client.search(request(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_calls_through_again() {
        let client =
            CachedPlacesClient::with_ttl(CountingClient { calls: AtomicUsize::new(0) }, Duration::from_millis(10));
        client.search(request(), Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        client.search(request(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn different_requests_have_independent_cache_entries() {
        let client = CachedPlacesClient::new(CountingClient { calls: AtomicUsize::new(0) });
        client.search(request(), Duration::from_secs(1)).await.unwrap();
        let other = PlacesRequest::TextSearch {
            query: "sushi".into(),
            region_code: None,
            open_now: None,
            price_level: None,
        };
        client.search(other, Duration::from_secs(1)).await.unwrap();
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 2);
    }
}
