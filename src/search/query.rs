//! Fast-path query rewriting.
//!
//! Plain free text is turned into prefix queries so that typing `auth` finds
//! `authentication` through the full-text index. Anything that already uses
//! index syntax is passed through verbatim.

use std::borrow::Cow;

/// Minimum term length (in chars) that receives a trailing `*`.
pub const PREFIX_MIN_TERM_CHARS: usize = 3;

const OPERATOR_WORDS: [&str; 4] = ["AND", "OR", "NOT", "NEAR"];

/// True when the query carries quotes, `*`, parentheses, `:` or a
/// boolean/proximity keyword as a whole word.
pub fn has_special_syntax(query: &str) -> bool {
    if query
        .chars()
        .any(|c| matches!(c, '"' | '*' | '(' | ')' | ':'))
    {
        return true;
    }
    query
        .split_whitespace()
        .any(|word| OPERATOR_WORDS.contains(&word))
}

fn is_simple_term(term: &str) -> bool {
    term.chars().count() >= PREFIX_MIN_TERM_CHARS
        && term.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Rewrite free text for prefix matching. Returns the input untouched when it
/// uses special syntax or contains no term that qualifies.
pub fn rewrite_for_prefix(query: &str) -> Cow<'_, str> {
    let trimmed = query.trim();
    if trimmed.is_empty() || has_special_syntax(trimmed) {
        return Cow::Borrowed(query);
    }
    if !trimmed.split_whitespace().any(is_simple_term) {
        return Cow::Borrowed(query);
    }
    let rewritten = trimmed
        .split_whitespace()
        .map(|term| {
            if is_simple_term(term) {
                Cow::Owned(format!("{term}*"))
            } else {
                Cow::Borrowed(term)
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    Cow::Owned(rewritten)
}
