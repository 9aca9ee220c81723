//! Transport layer: adapters for each ladder rung plus the shared HTTP
//! client, browser session, extractor and bot-wall classifier.

pub mod adapters;
pub mod browser;
pub mod classifier;
mod error;
pub mod extract;
mod http_client;

pub use adapters::{
    candidate_urls, BrowserAdapter, DomainProber, EnhancedHttpAdapter, PlainHttpAdapter,
    StrategyParams, TransportAdapter,
};
pub use browser::{BrowserOptions, BrowserSession};
pub use classifier::{classify, is_bot_wall, BlockVerdict};
pub use error::FetchError;
pub use extract::{extract_fields, PageFields};
pub use http_client::{
    HttpClient, HttpResponse, ProxyPool, UserAgentPool, ENHANCED_HEADERS,
    IMPERSONATE_USER_AGENTS, PLAIN_HEADERS, PROBE_HEADERS,
};
