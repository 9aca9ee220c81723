//! Field extraction from fetched HTML: title, meta description and a short
//! text summary.

use scraper::{Html, Selector};

use crate::utils::{collapse_whitespace, summarize};

/// Fields pulled from a page for the attempt record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFields {
    pub title: String,
    pub meta_description: String,
    pub content_summary: String,
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Trimmed `<title>` text, or empty.
pub fn extract_title(document: &Html) -> String {
    selector("title")
        .and_then(|sel| document.select(&sel).next())
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default()
}

/// `content` of `<meta name="description">`, or empty.
pub fn extract_meta_description(document: &Html) -> String {
    selector(r#"meta[name="description"]"#)
        .and_then(|sel| document.select(&sel).next())
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Visible text of the body with script and style contents dropped.
pub fn extract_text(document: &Html) -> String {
    let Some(body_sel) = selector("body") else {
        return String::new();
    };
    let root = match document.select(&body_sel).next() {
        Some(body) => body,
        None => document.root_element(),
    };

    let mut parts = Vec::new();
    for node in root.descendants() {
        if let Some(text) = node.value().as_text() {
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name()))
                .is_some_and(|name| matches!(name, "script" | "style" | "noscript" | "template"));
            if !hidden {
                parts.push(text.trim().to_string());
            }
        }
    }
    collapse_whitespace(&parts.join(" "))
}

/// Parse `html` and pull the recorded fields from it.
pub fn extract_fields(html: &str) -> PageFields {
    let document = Html::parse_document(html);
    PageFields {
        title: extract_title(&document),
        meta_description: extract_meta_description(&document),
        content_summary: summarize(&extract_text(&document)),
    }
}
