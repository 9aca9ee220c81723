//! Shared utility functions.
//!
//! - `url`: URL normalization and host extraction
//! - `text`: whitespace collapsing and summary truncation

mod text;
mod url;

pub use self::text::{collapse_whitespace, summarize, SUMMARY_CHARS};
pub use self::url::{domain_of, normalize_url, same_url, screenshot_stem, site_key};
