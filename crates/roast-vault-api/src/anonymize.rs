//! Best-effort scrub of personal references in roast text.
//!
//! Third-person pronouns (English and Vietnamese) become `[person]` and
//! company-shaped names become `[company]`. This is a basic word-level pass,
//! not a guarantee that no identifying text remains.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use roast_vault_core::RoastItem;
use tracing::error;

pub const PERSON_PLACEHOLDER: &str = "[person]";
pub const COMPANY_PLACEHOLDER: &str = "[company]";

/// Scrub patterns in application order. `\b`, `\w` and `(?i)` are ASCII-only
/// here, so Vietnamese letters are spelled out as explicit classes.
const PATTERNS: [(&str, &str); 4] = [
    (
        r#"\b[Cc]ông [Tt]y\b(?:\s+[A-ZÀ-ÝĂĐƠƯ][^\s,.;:!?()\[\]{}"']*){0,3}"#,
        COMPANY_PLACEHOLDER,
    ),
    (r"(^|[^A-Za-z0-9_À-ỹ])(?:[Aa]nh|[Cc]hị|[Ôô]ng|[Bb]à|[Cc]ô)\s+ấy\b", "${1}[person]"),
    (r"\b(?:[A-Z][A-Za-z0-9&-]*\s+){1,3}(?:Corp|Inc|Ltd|LLC|JSC)\b", COMPANY_PLACEHOLDER),
    (r"(?i)\b(?:he|she|him|her|his|hers|himself|herself)\b", PERSON_PLACEHOLDER),
];

struct ScrubRule {
    regex: Regex,
    replacement: &'static str,
}

static RULES: Lazy<Vec<ScrubRule>> = Lazy::new(|| {
    PATTERNS
        .iter()
        .filter_map(|&(pattern, replacement)| match Regex::new(pattern) {
            Ok(regex) => Some(ScrubRule { regex, replacement }),
            Err(err) => {
                error!(pattern, error = %err, "anonymization pattern failed to compile");
                None
            }
        })
        .collect()
});

#[must_use]
pub fn anonymize_item(mut item: RoastItem) -> RoastItem {
    item.content = anonymize_text(&item.content);
    item
}

#[must_use]
pub fn anonymize_text(text: &str) -> String {
    let mut result = text.to_string();
    for rule in RULES.iter() {
        result = rule.regex.replace_all(&result, rule.replacement).into_owned();
    }
    result
}
