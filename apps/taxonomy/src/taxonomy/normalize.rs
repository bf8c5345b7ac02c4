//! String normalization shared by extraction, canonicalization and resolution.
//!
//! Every lookup key in the taxonomy (canonical names, aliases, resolution
//! inputs) goes through `normalize_skill_name`, so two strings that differ
//! only in case or spacing always meet.

/// Words that never carry skill identity on their own.
const STOPWORDS: &[&str] = &["and", "or", "of", "the", "a", "an", "in", "with", "for", "to", "&"];

/// Trims and collapses internal whitespace, keeping the original casing.
pub fn clean_surface_form(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case- and whitespace-insensitive lookup key for a skill name.
pub fn normalize_skill_name(s: &str) -> String {
    clean_surface_form(s).to_lowercase()
}

/// Splits a skill name into lowercase tokens for containment checks.
///
/// Separators are whitespace, `/`, `-`, `,`, `(` and `)`. Characters that are
/// part of skill names (`.`, `+`, `#`) are kept, so "C++" and "Node.js" stay whole.
pub fn skill_tokens(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split(|c: char| c.is_whitespace() || matches!(c, '/' | '-' | ',' | '(' | ')'))
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(String::from)
        .collect()
}
