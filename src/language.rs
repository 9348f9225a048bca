//! Language code normalization.
//!
//! Callers may name a language by code or by English name. Both are folded
//! through a fixed alias table; anything else passes through lower-cased.

use std::sync::OnceLock;

/// Canonical code used when no language (or English) is requested.
pub const DEFAULT_LANGUAGE: &str = "en";

const LANGUAGE_ALIASES: &[(&str, &str)] = &[
    ("en", "en"),
    ("english", "en"),
    ("hi", "hi"),
    ("hindi", "hi"),
    ("te", "te"),
    ("telugu", "te"),
];

/// Fold a requested language through the alias table.
///
/// Empty input yields [`DEFAULT_LANGUAGE`]. Unknown values are lower-cased and
/// returned as-is.
pub fn normalize_language(lang: &str) -> String {
    let lang = lang.trim();
    if lang.is_empty() {
        return DEFAULT_LANGUAGE.to_string();
    }
    let lowered = lang.to_lowercase();
    LANGUAGE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, code)| code.to_string())
        .unwrap_or(lowered)
}

/// Returns true when `code` has the shape of a language tag (`hi`, `pt-br`).
pub fn is_language_code(code: &str) -> bool {
    static LANGUAGE_CODE_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = LANGUAGE_CODE_RE.get_or_init(|| {
        regex::Regex::new(r"^[a-z]{2,3}(-[a-z0-9]{2,8})?$").expect("static regex is valid")
    });
    re.is_match(code)
}

/// Normalize and validate in one step.
pub fn canonical_language(lang: &str) -> Option<String> {
    let code = normalize_language(lang);
    is_language_code(&code).then_some(code)
}

pub fn is_english(code: &str) -> bool {
    code == DEFAULT_LANGUAGE
}
