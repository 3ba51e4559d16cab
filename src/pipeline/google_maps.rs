//! Google-Maps-style provider stage.
//!
//! Wraps a [`PlacesClient`] call with this pipeline's own timeout handling
//! and error classification, and fills in `distanceMeters` against the
//! user's coordinates when available — the provider itself does not return
//! distance for a text search.
//!
//! Retries once, after a short backoff, in the two cases a single retry is
//! likely to help: a `TEXT_SEARCH` that came back with too few results (the
//! provider's own ranking is noisy enough that a second attempt sometimes
//! surfaces more), and a `LANDMARK_PLAN` geocode that timed out. Same
//! "try again once, log and continue on failure" shape as the Route-LLM
//! mapper's retry.

use std::time::Duration;

use crate::model::{LatLng, RestaurantResult};
use crate::places::{PlacesClient, PlacesError, PlacesRequest};
use crate::pipeline::errors::{classify_places_error, PipelineErrorKind};

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
const LOW_RESULT_RETRY_THRESHOLD: usize = 2;
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Run the provider stage, classifying any failure into a
/// [`PipelineErrorKind`] and annotating results with distance when
/// `user_location` is known.
pub async fn run_google_maps_stage(
    client: &dyn PlacesClient,
    request: PlacesRequest,
    timeout: Duration,
    user_location: Option<LatLng>,
) -> Result<Vec<RestaurantResult>, (PipelineErrorKind, String)> {
    let is_text_search = matches!(request, PlacesRequest::TextSearch { .. });
    let is_landmark_plan = matches!(request, PlacesRequest::LandmarkPlan { .. });

    let mut attempt = 0;
    loop {
        attempt += 1;
        match client.search(request.clone(), timeout).await {
            Ok(results) if is_text_search && results.len() < LOW_RESULT_RETRY_THRESHOLD && attempt == 1 => {
                tracing::warn!(result_count = results.len(), "text search returned few results, retrying once");
                tokio::time::sleep(RETRY_BACKOFF).await;
                continue;
            }
            Ok(mut results) => {
                if let Some(origin) = user_location {
                    for result in results.iter_mut() {
                        result.distance_meters = Some(haversine_meters(origin, result.location));
                    }
                }
                return Ok(results);
            }
            Err(PlacesError::Timeout(d)) if is_landmark_plan && attempt == 1 => {
                tracing::warn!(?d, "landmark plan geocode timed out, retrying once");
                tokio::time::sleep(RETRY_BACKOFF).await;
                continue;
            }
            Err(err) => {
                let (timed_out, quota_exceeded) = match &err {
                    PlacesError::Timeout(_) => (true, false),
                    PlacesError::QuotaExceeded => (false, true),
                    PlacesError::Failed(_) => (false, false),
                };
                return Err((classify_places_error(timed_out, quota_exceeded), err.to_string()));
            }
        }
    }
}

fn haversine_meters(a: LatLng, b: LatLng) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::model::GroupKind;

    struct StubClient {
        outcome: Result<Vec<RestaurantResult>, PlacesError>,
    }

    #[async_trait]
    impl PlacesClient for StubClient {
        async fn search(&self, _request: PlacesRequest, _timeout: Duration) -> Result<Vec<RestaurantResult>, PlacesError> {
            match &self.outcome {
                Ok(results) => Ok(results.clone()),
                Err(PlacesError::Timeout(d)) => Err(PlacesError::Timeout(*d)),
                Err(PlacesError::QuotaExceeded) => Err(PlacesError::QuotaExceeded),
                Err(PlacesError::Failed(e)) => Err(PlacesError::Failed(anyhow::anyhow!(e.to_string()))),
            }
        }
    }

    struct CountingClient {
        calls: std::sync::atomic::AtomicU32,
        first: Result<Vec<RestaurantResult>, PlacesError>,
        second: Vec<RestaurantResult>,
    }

    #[async_trait]
    impl PlacesClient for CountingClient {
        async fn search(&self, _request: PlacesRequest, _timeout: Duration) -> Result<Vec<RestaurantResult>, PlacesError> {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 0 {
                match &self.first {
                    Ok(results) => Ok(results.clone()),
                    Err(PlacesError::Timeout(d)) => Err(PlacesError::Timeout(*d)),
                    Err(PlacesError::QuotaExceeded) => Err(PlacesError::QuotaExceeded),
                    Err(PlacesError::Failed(e)) => Err(PlacesError::Failed(anyhow::anyhow!(e.to_string()))),
                }
            } else {
                Ok(self.second.clone())
            }
        }
    }

    fn result_at(lat: f64, lng: f64) -> RestaurantResult {
        RestaurantResult {
            place_id: "p".into(),
            name: "n".into(),
            address: "a".into(),
            location: LatLng { lat, lng },
            rating: None,
            open_now: None,
            photo_reference: None,
            distance_meters: None,
            score: None,
            group_kind: GroupKind::Exact,
        }
    }

    #[tokio::test]
    async fn success_annotates_distance_from_user_location() {
        let client = StubClient { outcome: Ok(vec![result_at(0.001, 0.0), result_at(0.002, 0.0)]) };
        let results = run_google_maps_stage(
            &client,
            PlacesRequest::TextSearch { query: "q".into(), region_code: None, open_now: None, price_level: None },
            Duration::from_secs(1),
            Some(LatLng { lat: 0.0, lng: 0.0 }),
        )
        .await
        .unwrap();
        assert!(results[0].distance_meters.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn no_user_location_leaves_distance_none() {
        let client = StubClient { outcome: Ok(vec![result_at(0.0, 0.0), result_at(0.0, 0.001)]) };
        let results = run_google_maps_stage(
            &client,
            PlacesRequest::TextSearch { query: "q".into(), region_code: None, open_now: None, price_level: None },
            Duration::from_secs(1),
            None,
        )
        .await
        .unwrap();
        assert!(results[0].distance_meters.is_none());
    }

    #[tokio::test]
    async fn text_search_with_few_results_retries_once() {
        let client = CountingClient {
            calls: std::sync::atomic::AtomicU32::new(0),
            first: Ok(vec![result_at(0.0, 0.0)]),
            second: vec![result_at(0.0, 0.0), result_at(0.0, 0.001), result_at(0.0, 0.002)],
        };
        let results = run_google_maps_stage(
            &client,
            PlacesRequest::TextSearch { query: "q".into(), region_code: None, open_now: None, price_level: None },
            Duration::from_secs(1),
            None,
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(client.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn landmark_plan_timeout_retries_once_then_succeeds() {
        let client = CountingClient {
            calls: std::sync::atomic::AtomicU32::new(0),
            first: Err(PlacesError::Timeout(Duration::from_secs(1))),
            second: vec![result_at(0.0, 0.0), result_at(0.0, 0.001)],
        };
        let results = run_google_maps_stage(
            &client,
            PlacesRequest::LandmarkPlan { landmark: "tower".into(), query: "pizza".into() },
            Duration::from_secs(1),
            None,
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(client.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn nearby_search_does_not_retry_on_low_results() {
        let client = CountingClient {
            calls: std::sync::atomic::AtomicU32::new(0),
            first: Ok(vec![result_at(0.0, 0.0)]),
            second: vec![result_at(0.0, 0.0), result_at(0.0, 0.001), result_at(0.0, 0.002)],
        };
        let results = run_google_maps_stage(
            &client,
            PlacesRequest::Nearby { location: LatLng { lat: 0.0, lng: 0.0 }, radius_meters: 500, keyword: None, open_now: None, price_level: None },
            Duration::from_secs(1),
            None,
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(client.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_classifies_as_google_timeout() {
        let client = StubClient { outcome: Err(PlacesError::Timeout(Duration::from_secs(5))) };
        let (kind, _) = run_google_maps_stage(
            &client,
            PlacesRequest::TextSearch { query: "q".into(), region_code: None, open_now: None, price_level: None },
            Duration::from_secs(1),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(kind, PipelineErrorKind::GoogleTimeout);
    }

    #[tokio::test]
    async fn quota_exceeded_classifies_correctly() {
        let client = StubClient { outcome: Err(PlacesError::QuotaExceeded) };
        let (kind, _) = run_google_maps_stage(
            &client,
            PlacesRequest::TextSearch { query: "q".into(), region_code: None, open_now: None, price_level: None },
            Duration::from_secs(1),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(kind, PipelineErrorKind::GoogleQuotaExceeded);
    }
}
