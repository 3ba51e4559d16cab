//! Near-me detection.
//!
//! A query is treated as "near me" if it matches one of a small set of
//! English/Hebrew phrases commonly used to ask for nearby results. This
//! runs ahead of the Route-LLM mapper so the guard can short-circuit with
//! `NEARME_NO_LOCATION`/`NEARME_INVALID_LOCATION` before any provider call.

use std::sync::OnceLock;

use regex::Regex;

/// English and Hebrew phrasings for "near me" / "nearby" / "close to me".
fn near_me_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(near\s*me|nearby|close\s*to\s*me|around\s*me)\b|קרוב\s*אלי|לידי|בסביבה")
            .expect("near-me regex is a fixed, valid pattern")
    })
}

pub fn is_near_me_query(query: &str) -> bool {
    near_me_pattern().is_match(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_english_phrasings() {
        assert!(is_near_me_query("sushi near me"));
        assert!(is_near_me_query("anything nearby?"));
        assert!(is_near_me_query("pizza close to me please"));
    }

    #[test]
    fn detects_hebrew_phrasings() {
        assert!(is_near_me_query("פיצה קרוב אלי"));
        assert!(is_near_me_query("מסעדה לידי"));
    }

    #[test]
    fn plain_query_without_near_me_phrasing_is_false() {
        assert!(!is_near_me_query("best pizza in rome"));
    }

    #[test]
    fn is_case_insensitive() {
        assert!(is_near_me_query("SUSHI NEAR ME"));
    }
}
