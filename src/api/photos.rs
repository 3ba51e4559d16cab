//! Public photo proxy: `GET /api/v1/photos/places/:placeId/photos/:photoId`.
//!
//! Never hands the provider API key to the client: the key is attached
//! server-side to the upstream request and the response is streamed back as
//! an opaque binary blob. This is the only place in the crate that is
//! allowed to know the provider's raw media URL shape.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::state::AppState;

const DEFAULT_MAX_WIDTH_PX: u32 = 800;
const MAX_WIDTH_PX_CEILING: u32 = 1200;
const CACHE_MAX_AGE_SECS: u32 = 604_800; // 7 days

#[derive(Deserialize)]
pub struct PhotoQuery {
    #[serde(rename = "maxWidthPx", default)]
    max_width_px: Option<u32>,
}

/// `GET /api/v1/photos/places/:place_id/photos/:photo_id?maxWidthPx=1..1200`
pub async fn get_photo(
    State(state): State<Arc<AppState>>,
    Path((place_id, photo_id)): Path<(String, String)>,
    Query(query): Query<PhotoQuery>,
) -> Response {
    let config = state.config.current();
    let Some(api_key) = config
        .google_maps
        .api_key_env
        .as_ref()
        .and_then(|env| std::env::var(env).ok())
        .filter(|k| !k.is_empty())
    else {
        return (StatusCode::SERVICE_UNAVAILABLE, "photo provider not configured").into_response();
    };

    let max_width = query
        .max_width_px
        .unwrap_or(DEFAULT_MAX_WIDTH_PX)
        .clamp(1, MAX_WIDTH_PX_CEILING);

    let upstream_url = format!(
        "https://places.googleapis.com/v1/places/{place_id}/photos/{photo_id}/media?maxWidthPx={max_width}&key={api_key}"
    );

    let client = reqwest::Client::new();
    let upstream = match client.get(&upstream_url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(error = %e, "photo proxy upstream request failed");
            return (StatusCode::BAD_GATEWAY, "photo provider unreachable").into_response();
        }
    };

    if !upstream.status().is_success() {
        return (StatusCode::BAD_GATEWAY, "photo provider returned an error").into_response();
    }

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| header::HeaderValue::from_static("image/jpeg"));

    let bytes = match upstream.bytes().await {
        Ok(b) => b,
        Err(_) => return (StatusCode::BAD_GATEWAY, "photo provider returned a malformed body").into_response(),
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CACHE_CONTROL,
                header::HeaderValue::from_str(&format!("public, max-age={CACHE_MAX_AGE_SECS}")).unwrap(),
            ),
        ],
        bytes,
    )
        .into_response()
}
