//! Text helpers for extracted page content.

/// Maximum characters kept in a content summary before the ellipsis.
pub const SUMMARY_CHARS: usize = 1000;

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse whitespace and truncate to `SUMMARY_CHARS`, appending `...` when cut.
pub fn summarize(text: &str) -> String {
    let collapsed = collapse_whitespace(text);
    if collapsed.chars().count() > SUMMARY_CHARS {
        let head: String = collapsed.chars().take(SUMMARY_CHARS).collect();
        format!("{}...", head)
    } else {
        collapsed
    }
}
