//! Places/Google-Maps-style provider seam.

pub mod cache;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{LatLng, RestaurantResult};

/// Shape of a search issued to the provider, resolved by the Route-LLM
/// mapper stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlacesRequest {
    TextSearch {
        query: String,
        region_code: Option<String>,
        #[serde(default)]
        open_now: Option<bool>,
        #[serde(default)]
        price_level: Option<u8>,
    },
    Nearby {
        location: LatLng,
        radius_meters: u32,
        keyword: Option<String>,
        #[serde(default)]
        open_now: Option<bool>,
        #[serde(default)]
        price_level: Option<u8>,
    },
    LandmarkPlan { landmark: String, query: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PlacesError {
    #[error("places provider call timed out after {0:?}")]
    Timeout(Duration),
    #[error("places provider quota exceeded")]
    QuotaExceeded,
    #[error("places provider call failed: {0}")]
    Failed(#[from] anyhow::Error),
}

#[async_trait]
pub trait PlacesClient: Send + Sync {
    async fn search(&self, request: PlacesRequest, timeout: Duration) -> Result<Vec<RestaurantResult>, PlacesError>;
}

/// Default [`PlacesClient`] speaking a Google-Places-style HTTP API.
///
/// One `reqwest::Client` built once; the provider's own error shape is
/// translated into this crate's closed [`PlacesError`] rather than leaking
/// verbatim.
pub struct HttpPlacesClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPlacesClient {
    pub fn new(base_url: String, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), api_key })
    }

    fn endpoint(&self, request: &PlacesRequest) -> &'static str {
        match request {
            PlacesRequest::TextSearch { .. } | PlacesRequest::LandmarkPlan { .. } => "/v1/places:searchText",
            PlacesRequest::Nearby { .. } => "/v1/places:searchNearby",
        }
    }

    fn body(&self, request: &PlacesRequest) -> serde_json::Value {
        match request {
            PlacesRequest::TextSearch { query, region_code, open_now, price_level } => serde_json::json!({
                "textQuery": query,
                "regionCode": region_code,
                "openNow": open_now,
                "priceLevel": price_level,
            }),
            PlacesRequest::LandmarkPlan { landmark, query } => {
                serde_json::json!({"textQuery": format!("{query} near {landmark}")})
            }
            PlacesRequest::Nearby { location, radius_meters, keyword, open_now, price_level } => serde_json::json!({
                "locationRestriction": {"circle": {"center": {"latitude": location.lat, "longitude": location.lng}, "radius": radius_meters}},
                "keyword": keyword,
                "openNow": open_now,
                "priceLevel": price_level,
            }),
        }
    }
}

#[async_trait]
impl PlacesClient for HttpPlacesClient {
    async fn search(&self, request: PlacesRequest, timeout: Duration) -> Result<Vec<RestaurantResult>, PlacesError> {
        let url = format!("{}{}", self.base_url, self.endpoint(&request));
        let call = self.client.post(&url).header("X-Goog-Api-Key", &self.api_key).json(&self.body(&request)).send();

        let response = tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| PlacesError::Timeout(timeout))?
            .map_err(anyhow::Error::from)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PlacesError::QuotaExceeded);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlacesError::Failed(anyhow::anyhow!("provider returned HTTP {status}: {text}")));
        }

        let parsed: ProviderResponse = response.json().await.map_err(anyhow::Error::from)?;
        Ok(parsed.into_results())
    }
}

#[derive(Debug, Deserialize)]
struct ProviderPlace {
    id: String,
    #[serde(rename = "displayName")]
    display_name: ProviderDisplayName,
    #[serde(rename = "formattedAddress")]
    formatted_address: String,
    location: LatLng,
    rating: Option<f64>,
    #[serde(rename = "currentOpeningHours")]
    current_opening_hours: Option<ProviderOpeningHours>,
    photos: Option<Vec<ProviderPhoto>>,
}

#[derive(Debug, Deserialize)]
struct ProviderDisplayName {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ProviderOpeningHours {
    #[serde(rename = "openNow")]
    open_now: bool,
}

#[derive(Debug, Deserialize)]
struct ProviderPhoto {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    places: Vec<ProviderPlace>,
}

impl ProviderResponse {
    fn into_results(self) -> Vec<RestaurantResult> {
        self.places
            .into_iter()
            .map(|p| RestaurantResult {
                place_id: p.id,
                name: p.display_name.text,
                address: p.formatted_address,
                location: p.location,
                rating: p.rating,
                open_now: p.current_opening_hours.map(|h| h.open_now),
                photo_reference: p.photos.and_then(|mut ph| ph.pop()).map(|ph| ph.name),
                distance_meters: None,
                score: None,
                group_kind: crate::model::GroupKind::Exact,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_provider_body() -> serde_json::Value {
        serde_json::json!({
            "places": [{
                "id": "place-1",
                "displayName": {"text": "Tasty Place"},
                "formattedAddress": "1 Main St",
                "location": {"lat": 1.0, "lng": 2.0},
                "rating": 4.5,
                "currentOpeningHours": {"openNow": true},
                "photos": [{"name": "photos/abc"}],
            }]
        })
    }

    #[tokio::test]
    async fn text_search_maps_provider_shape_to_restaurant_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/places:searchText"))
            .and(header("X-Goog-Api-Key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_provider_body()))
            .mount(&server)
            .await;

        let client = HttpPlacesClient::new(server.uri(), "test-key".into()).unwrap();
        let results = client
            .search(
                PlacesRequest::TextSearch {
                    query: "pizza".into(),
                    region_code: None,
                    open_now: None,
                    price_level: None,
                },
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].place_id, "place-1");
        assert_eq!(results[0].open_now, Some(true));
        assert_eq!(results[0].photo_reference.as_deref(), Some("photos/abc"));
    }

    #[tokio::test]
    async fn quota_exceeded_maps_to_quota_exceeded_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/places:searchNearby"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = HttpPlacesClient::new(server.uri(), "test-key".into()).unwrap();
        let err = client
            .search(
                PlacesRequest::Nearby {
                    location: LatLng { lat: 0.0, lng: 0.0 },
                    radius_meters: 500,
                    keyword: None,
                    open_now: None,
                    price_level: None,
                },
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PlacesError::QuotaExceeded));
    }
}
