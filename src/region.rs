//! Region-code resolution for the Places-style provider stage.
//!
//! A priority chain of increasingly weak signals, each tried in turn until
//! one resolves a two-letter region code; the provider call omits region
//! biasing entirely only once all are exhausted. Recorded as an
//! implementation decision in DESIGN.md since the exact fallback order is
//! not otherwise pinned down.

use crate::model::{LatLng, Language};

/// Very small set of best-effort bounding boxes for reverse-geocoding a
/// coordinate to a region code without a live geocode call. Deliberately
/// coarse — a real reverse-geocode provider is an external collaborator
/// out of scope here.
const BOUNDING_BOXES: &[(&str, f64, f64, f64, f64)] = &[
    // (region, min_lat, max_lat, min_lng, max_lng)
    ("IL", 29.4, 33.4, 34.2, 35.9),
    ("GB", 49.8, 60.9, -8.7, 1.8),
    ("US", 24.4, 49.4, -125.0, -66.9),
];

fn reverse_geocode_region(location: Option<LatLng>) -> Option<String> {
    let location = location?;
    BOUNDING_BOXES
        .iter()
        .find(|(_, min_lat, max_lat, min_lng, max_lng)| {
            (*min_lat..=*max_lat).contains(&location.lat) && (*min_lng..=*max_lng).contains(&location.lng)
        })
        .map(|(region, ..)| region.to_string())
}

fn valid_region_candidate(candidate: Option<&str>) -> Option<String> {
    let candidate = candidate?;
    if candidate.len() == 2 && candidate.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(candidate.to_uppercase())
    } else {
        None
    }
}

fn locale_region_suffix(locale: Option<&str>) -> Option<String> {
    let (_, region) = locale?.split_once('-')?;
    if region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(region.to_uppercase())
    } else {
        None
    }
}

/// Session-level default keyed off the resolved UI language, for a query
/// with no locale region suffix and no other stronger signal.
fn session_default_region(language: Language) -> Option<String> {
    match language {
        Language::He => Some("IL".to_string()),
        Language::En | Language::Other => None,
    }
}

/// Resolve a Google-style two-letter region code, trying each signal in
/// order of how directly it reflects the user's actual location:
///
/// 1. reverse-geocoded `user_location`
/// 2. Intent's advisory `region_candidate`
/// 3. the locale's own region suffix (e.g. `en-GB` → `GB`)
/// 4. a session default keyed off resolved language
/// 5. the operator-configured fallback
pub fn resolve_region_code(
    user_location: Option<LatLng>,
    region_candidate: Option<&str>,
    locale: Option<&str>,
    language: Language,
    configured_fallback: Option<&str>,
) -> Option<String> {
    reverse_geocode_region(user_location)
        .or_else(|| valid_region_candidate(region_candidate))
        .or_else(|| locale_region_suffix(locale))
        .or_else(|| session_default_region(language))
        .or_else(|| configured_fallback.map(|s| s.to_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_location_inside_a_bounding_box_wins_over_everything_else() {
        let region = resolve_region_code(
            Some(LatLng { lat: 32.0, lng: 34.8 }),
            Some("US"),
            Some("en-GB"),
            Language::En,
            Some("FR"),
        );
        assert_eq!(region, Some("IL".to_string()));
    }

    #[test]
    fn region_candidate_wins_when_no_location_match() {
        let region = resolve_region_code(None, Some("fr"), Some("en-GB"), Language::En, Some("US"));
        assert_eq!(region, Some("FR".to_string()));
    }

    #[test]
    fn malformed_region_candidate_is_ignored_in_favor_of_locale_suffix() {
        let region = resolve_region_code(None, Some("france"), Some("en-GB"), Language::En, Some("US"));
        assert_eq!(region, Some("GB".to_string()));
    }

    #[test]
    fn locale_region_suffix_wins_over_session_default() {
        let region = resolve_region_code(None, None, Some("en-GB"), Language::He, Some("US"));
        assert_eq!(region, Some("GB".to_string()));
    }

    #[test]
    fn hebrew_session_default_applies_without_locale_or_candidate() {
        let region = resolve_region_code(None, None, None, Language::He, None);
        assert_eq!(region, Some("IL".to_string()));
    }

    #[test]
    fn configured_fallback_is_last_resort() {
        let region = resolve_region_code(None, None, None, Language::En, Some("ca"));
        assert_eq!(region, Some("CA".to_string()));
    }

    #[test]
    fn nothing_resolves_to_none() {
        let region = resolve_region_code(None, None, None, Language::En, None);
        assert_eq!(region, None);
    }
}
