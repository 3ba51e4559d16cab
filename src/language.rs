//! Request language resolution.

use crate::model::Language;

/// Resolve the request's language from an explicit locale hint and/or the
/// raw query text. Locale wins when present and recognized; otherwise the
/// query is scanned for script ranges that unambiguously identify Hebrew.
pub fn resolve_language(locale: Option<&str>, query: &str) -> Language {
    if let Some(locale) = locale {
        let lower = locale.to_lowercase();
        if lower.starts_with("he") || lower.starts_with("iw") {
            return Language::He;
        }
        if lower.starts_with("en") {
            return Language::En;
        }
    }

    if query.chars().any(is_hebrew_letter) {
        return Language::He;
    }
    if query.chars().any(|c| c.is_ascii_alphabetic()) {
        return Language::En;
    }
    Language::Other
}

fn is_hebrew_letter(c: char) -> bool {
    ('\u{0590}'..='\u{05FF}').contains(&c)
}
