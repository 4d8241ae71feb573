//! Redaction of binary-ish payloads before text reaches the index.
//!
//! Inline images and encoded blobs make up a large share of raw transcript
//! bytes while carrying no searchable signal. Two shapes are recognized:
//!
//! - `data:<media>;base64,<payload>` URLs whose matched span is at least
//!   [`DATA_URL_MIN_CHARS`] long.
//! - Bare base64 runs of at least [`BASE64_RUN_MIN_CHARS`] characters that
//!   contain one of `+ / = - _`. Pure alphanumeric runs are kept so long
//!   identifiers and hashes in prose or code survive.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

/// Inputs shorter than this (in bytes) are returned untouched.
pub const SANITIZE_MIN_LEN: usize = 256;
pub const DATA_URL_MIN_CHARS: usize = 256;
pub const BASE64_RUN_MIN_CHARS: usize = 2048;

static DATA_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"data:([A-Za-z0-9][A-Za-z0-9.+\-]*/[A-Za-z0-9][A-Za-z0-9.+\-]*);base64,([A-Za-z0-9+/=]+)")
        .expect("data url regex")
});

static BASE64_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9+/=_\-]+").expect("base64 run regex"));

/// Replace oversized embedded payloads with short markers.
pub fn sanitize(text: &str) -> Cow<'_, str> {
    if text.len() < SANITIZE_MIN_LEN {
        return Cow::Borrowed(text);
    }
    match redact_data_urls(text) {
        Cow::Borrowed(_) => redact_base64_runs(text),
        Cow::Owned(owned) => match redact_base64_runs(&owned) {
            Cow::Borrowed(_) => Cow::Owned(owned),
            Cow::Owned(both) => Cow::Owned(both),
        },
    }
}

fn redact_data_urls(text: &str) -> Cow<'_, str> {
    if !text.contains("data:") {
        return Cow::Borrowed(text);
    }
    let mut out: Option<String> = None;
    let mut last = 0;
    for caps in DATA_URL_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.as_str().chars().count() < DATA_URL_MIN_CHARS {
            continue;
        }
        let media = caps.get(1).map_or("application/octet-stream", |m| m.as_str());
        let payload_len = caps.get(2).map_or(0, |m| m.as_str().len());
        let buf = out.get_or_insert_with(|| String::with_capacity(text.len() / 2));
        buf.push_str(&text[last..whole.start()]);
        buf.push_str(&format!(
            "[data-url omitted: {media}, approx {} KB]",
            approx_decoded_kb(payload_len)
        ));
        last = whole.end();
    }
    match out {
        Some(mut buf) => {
            buf.push_str(&text[last..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(text),
    }
}

fn redact_base64_runs(text: &str) -> Cow<'_, str> {
    if text.len() < BASE64_RUN_MIN_CHARS {
        return Cow::Borrowed(text);
    }
    let mut out: Option<String> = None;
    let mut last = 0;
    for m in BASE64_RUN_RE.find_iter(text) {
        // The class is ASCII-only, so byte length equals char length.
        if m.len() < BASE64_RUN_MIN_CHARS || !has_marker_char(m.as_str()) {
            continue;
        }
        let buf = out.get_or_insert_with(|| String::with_capacity(text.len() / 2));
        buf.push_str(&text[last..m.start()]);
        buf.push_str(&format!(
            "[base64 omitted: approx {} KB]",
            approx_decoded_kb(m.len())
        ));
        last = m.end();
    }
    match out {
        Some(mut buf) => {
            buf.push_str(&text[last..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(text),
    }
}

fn has_marker_char(run: &str) -> bool {
    run.bytes().any(|b| matches!(b, b'+' | b'/' | b'=' | b'-' | b'_'))
}

/// Decoded size of `encoded_len` base64 chars, rounded up to whole KB (at least 1).
fn approx_decoded_kb(encoded_len: usize) -> usize {
    let decoded = encoded_len * 3 / 4;
    decoded.div_ceil(1024).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_url_with_span(media: &str, span: usize) -> String {
        let prefix = format!("data:{media};base64,");
        format!("{prefix}{}", "A".repeat(span - prefix.len()))
    }

    fn padded(body: &str) -> String {
        format!("before {body} after {}", " ".repeat(300))
    }

    #[test]
    fn short_input_is_borrowed() {
        let text = "hello data:image/png;base64,AAAA";
        assert!(matches!(sanitize(text), Cow::Borrowed(_)));
    }

    #[test]
    fn long_data_url_is_replaced() {
        let url = data_url_with_span("image/png", 300);
        let input = padded(&url);
        let out = sanitize(&input);
        assert!(out.contains("[data-url omitted: image/png, approx 1 KB]"));
        assert!(!out.contains("base64,AAAA"));
        assert!(out.starts_with("before "));
        assert!(out.contains(" after "));
    }

    #[test]
    fn short_data_url_is_preserved() {
        let url = data_url_with_span("image/png", 100);
        let input = padded(&url);
        assert_eq!(sanitize(&input), input);
    }

    #[test]
    fn data_url_kb_estimate_scales() {
        let url = data_url_with_span("image/jpeg", 8_000);
        let out = sanitize(&url);
        // (8000 - 23) * 3 / 4 = 5982 bytes -> 6 KB
        assert_eq!(out, "[data-url omitted: image/jpeg, approx 6 KB]");
    }

    #[test]
    fn long_base64_run_with_marker_is_replaced() {
        let run = format!("{}+{}", "Ab1".repeat(500), "z".repeat(1499));
        assert_eq!(run.len(), 3000);
        let input = format!("payload: {run} end");
        let out = sanitize(&input);
        assert_eq!(out, "payload: [base64 omitted: approx 3 KB] end");
    }

    #[test]
    fn shorter_base64_run_is_preserved() {
        let run = format!("{}+{}", "Ab1".repeat(200), "z".repeat(399));
        assert_eq!(run.len(), 1000);
        let input = format!("payload: {run} end");
        assert_eq!(sanitize(&input), input);
    }

    #[test]
    fn clean_alphanumeric_run_is_preserved() {
        let run = "abcDEF0123".repeat(300);
        let input = format!("id {run}");
        assert_eq!(sanitize(&input), input);
    }

    #[test]
    fn both_shapes_in_one_value() {
        let url = data_url_with_span("image/gif", 400);
        let run = format!("{}/", "Q".repeat(2_100));
        let input = format!("{url} and {run}");
        let out = sanitize(&input);
        assert!(out.contains("[data-url omitted: image/gif"));
        assert!(out.contains("[base64 omitted: approx 2 KB]"));
        assert!(out.contains(" and "));
    }

    #[test]
    fn multibyte_text_survives() {
        let input = format!("{} café {}", "é".repeat(200), "naïve ".repeat(60));
        assert_eq!(sanitize(&input), input);
    }
}
