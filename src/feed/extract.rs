//! Snippet and image extraction from raw feed items.
//!
//! Each derived value can come from several places in an item. The candidate
//! locations are listed in priority order and tried with [`first_of`].

use regex::Regex;
use std::sync::OnceLock;

use super::raw::RawFeedItem;

/// Maximum snippet length in characters, ellipsis included.
pub const SNIPPET_MAX_CHARS: usize = 220;

/// Snippet used when an item carries no text at all.
pub const EMPTY_SNIPPET: &str = "No summary available.";

const ELLIPSIS: char = '…';

/// A candidate extractor: reads one possible location of a value.
pub type Candidate<T> = fn(&RawFeedItem) -> Option<T>;

/// Returns the first value produced by `candidates`, tried in order.
pub fn first_of<T>(item: &RawFeedItem, candidates: &[Candidate<T>]) -> Option<T> {
    candidates.iter().find_map(|candidate| candidate(item))
}

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"))
}

fn img_regex() -> &'static Regex {
    static IMG: OnceLock<Regex> = OnceLock::new();
    IMG.get_or_init(|| Regex::new(r#"(?i)<img[^>]+src=["']([^"'>]+)["']"#).expect("static regex"))
}

fn whitespace_regex() -> &'static Regex {
    static WS: OnceLock<Regex> = OnceLock::new();
    WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Removes all `<...>` markup. Entities are left as they are.
pub fn strip_html(value: &str) -> String {
    tag_regex().replace_all(value, "").into_owned()
}

/// Collapses whitespace runs to a single space and trims both ends.
pub fn collapse_whitespace(value: &str) -> String {
    whitespace_regex().replace_all(value, " ").trim().to_string()
}

/// Cuts `value` to `max_chars` characters, ending with an ellipsis when cut.
///
/// Counts characters, not bytes, so multi-byte text never splits mid-codepoint.
pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let kept: String = value.chars().take(max_chars.saturating_sub(1)).collect();
    let mut out = kept.trim_end().to_string();
    out.push(ELLIPSIS);
    out
}

fn collapsed(value: Option<&String>) -> Option<String> {
    value.map(|v| collapse_whitespace(v)).filter(|v| !v.is_empty())
}

fn stripped(value: Option<&String>) -> Option<String> {
    value
        .map(|v| collapse_whitespace(&strip_html(v)))
        .filter(|v| !v.is_empty())
}

const SNIPPET_CANDIDATES: &[Candidate<String>] = &[
    |item: &RawFeedItem| collapsed(item.content_snippet.as_ref()),
    |item: &RawFeedItem| collapsed(item.summary.as_ref()),
    |item: &RawFeedItem| collapsed(item.media_description.as_ref()),
    |item: &RawFeedItem| collapsed(item.media_group.as_ref()?.descriptions.first()),
    |item: &RawFeedItem| stripped(item.content_encoded.as_ref()),
    |item: &RawFeedItem| stripped(item.content.as_ref()),
];

/// Builds the plain-text snippet shown for an item.
pub fn build_snippet(item: &RawFeedItem) -> String {
    let text = first_of(item, SNIPPET_CANDIDATES).unwrap_or_else(|| EMPTY_SNIPPET.to_string());
    truncate_text(&text, SNIPPET_MAX_CHARS)
}

/// Finds the first `<img src="...">` in an HTML fragment.
pub fn first_img_src(html: &str) -> Option<String> {
    img_regex()
        .captures(html)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

fn html_body(item: &RawFeedItem) -> Option<&str> {
    [item.content_encoded.as_deref(), item.content.as_deref()]
        .into_iter()
        .flatten()
        .find(|html| !html.is_empty())
}

const IMAGE_CANDIDATES: &[Candidate<String>] = &[
    |item: &RawFeedItem| {
        item.enclosure
            .as_ref()?
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .map(str::to_string)
    },
    |item: &RawFeedItem| item.media_content.iter().find_map(|m| m.url()).map(str::to_string),
    |item: &RawFeedItem| html_body(item).and_then(first_img_src),
];

/// Finds an illustrative image URL for an item.
pub fn extract_image_url(item: &RawFeedItem) -> Option<String> {
    first_of(item, IMAGE_CANDIDATES)
}
