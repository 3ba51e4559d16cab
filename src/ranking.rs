//! Result ranking and chip generation.
//!
//! Score blends rating, proximity, open-now status, and soft-hint matches
//! into a single sortable number; exact results (`GroupKind::Exact`) always
//! sort ahead of nearby fallbacks (`GroupKind::Nearby`) regardless of
//! score. Soft hints only ever nudge this score — they never remove a
//! result, since `sort_by`'s comparator is what finally determines order
//! regardless of how the input was pre-arranged.

use crate::model::{GroupKind, RestaurantResult};

const MAX_DISTANCE_METERS: f64 = 5_000.0;

/// Compute and assign `score` on every result, then sort in place:
/// exact-group first, then descending score. `soft_terms` are the
/// post-constraint hints (e.g. "kosher", "patio") that nudge — never
/// filter — the ranking.
pub fn rank_and_sort(results: &mut Vec<RestaurantResult>, soft_terms: &[String]) {
    for result in results.iter_mut() {
        result.score = Some(score_one(result, soft_terms));
    }
    results.sort_by(|a, b| {
        let group_order = group_rank(a.group_kind).cmp(&group_rank(b.group_kind));
        group_order.then(
            b.score
                .unwrap_or(0.0)
                .partial_cmp(&a.score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
}

fn group_rank(kind: GroupKind) -> u8 {
    match kind {
        GroupKind::Exact => 0,
        GroupKind::Nearby => 1,
    }
}

fn score_one(result: &RestaurantResult, soft_terms: &[String]) -> f64 {
    let rating_component = result.rating.unwrap_or(0.0) / 5.0;
    let distance_component = match result.distance_meters {
        Some(d) => 1.0 - (d.min(MAX_DISTANCE_METERS) / MAX_DISTANCE_METERS),
        None => 0.5,
    };
    let open_now_component = if result.open_now == Some(true) { 1.0 } else { 0.0 };
    let soft_component = if soft_terms.is_empty() { 0.0 } else { soft_match_fraction(result, soft_terms) };

    rating_component * 0.45 + distance_component * 0.3 + open_now_component * 0.15 + soft_component * 0.10
}

fn soft_match_fraction(result: &RestaurantResult, soft_terms: &[String]) -> f64 {
    let haystack = format!("{} {}", result.name, result.address).to_lowercase();
    let matched = soft_terms.iter().filter(|term| haystack.contains(&term.to_lowercase())).count();
    matched as f64 / soft_terms.len() as f64
}

/// Build the response's quick-filter chips from the result set and the
/// filter labels actually applied (`openNow`, `isKosher:soft`, etc).
/// Chips summarize what already shaped or nudged the results, plus one
/// signal computed straight from the result set itself (whether any
/// highly-rated place made the cut).
pub fn build_chips(results: &[RestaurantResult], applied_filters: &[String]) -> Vec<String> {
    let mut chips = Vec::new();

    let has = |prefix: &str| applied_filters.iter().any(|f| f.starts_with(prefix));
    if has("openNow") {
        chips.push("Open now".to_string());
    }
    if has("isKosher") {
        chips.push("Kosher".to_string());
    }
    if has("isGlutenFree") {
        chips.push("Gluten-free".to_string());
    }
    if has("priceLevel") {
        chips.push("Matches your budget".to_string());
    }
    if results.iter().any(|r| r.group_kind == GroupKind::Nearby) {
        chips.push("Expanded search area".to_string());
    }
    if results.iter().any(|r| r.rating.unwrap_or(0.0) >= 4.5) {
        chips.push("Top rated".to_string());
    }

    chips
}
