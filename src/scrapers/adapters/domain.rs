//! Rung 5: look for a responding scheme/host variant of a dead URL.

use std::net::IpAddr;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use super::{StrategyParams, TransportAdapter};
use crate::models::{Attempt, ErrorKind, Strategy};
use crate::scrapers::http_client::HttpClient;
use crate::utils::normalize_url;

const ALTERNATE_TLDS: &[&str] = &["com", "net", "org"];

/// Candidate URLs for `url`, in check order, without duplicates.
pub fn candidate_urls(url: &str) -> Vec<String> {
    let parsed = match Url::parse(&normalize_url(url)) {
        Ok(parsed) => parsed,
        Err(_) => return Vec::new(),
    };
    let Some(host) = parsed.host_str() else {
        return Vec::new();
    };
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

    let mut candidates = vec![
        format!("https://{}{}", host, port),
        format!("http://{}{}", host, port),
    ];

    let is_ip = host.trim_matches(['[', ']']).parse::<IpAddr>().is_ok();
    if !is_ip {
        let bare = host.strip_prefix("www.").unwrap_or(host);
        candidates.push(format!("https://www.{}{}", bare, port));
        candidates.push(format!("http://www.{}{}", bare, port));

        let labels: Vec<&str> = bare.split('.').collect();
        if let [name, _tld] = labels.as_slice() {
            for tld in ALTERNATE_TLDS {
                candidates.push(format!("https://{}.{}{}", name, tld, port));
                candidates.push(format!("https://www.{}.{}{}", name, tld, port));
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.clone()));
    candidates
}

/// Existence check over candidate variants. Fetches no content and never
/// uses a proxy.
#[derive(Debug, Clone, Default)]
pub struct DomainProber;

#[async_trait]
impl TransportAdapter for DomainProber {
    fn strategy(&self) -> Strategy {
        Strategy::DomainVerification
    }

    async fn attempt(&self, url: &str, _proxy: Option<&str>, params: &StrategyParams) -> Attempt {
        let attempt = Attempt::new(url, Strategy::DomainVerification);
        let started = Instant::now();

        let client = match HttpClient::new(&params.user_agent, params.timeout, None) {
            Ok(client) => client,
            Err(e) => return attempt.fail(e.kind(), e.to_string()),
        };

        for candidate in candidate_urls(url) {
            let check = tokio::select! {
                biased;
                _ = params.cancel.cancelled() => None,
                result = client.head(&candidate, &[], params.timeout) => Some(result),
            };
            let Some(result) = check else {
                let mut attempt = attempt.fail(ErrorKind::Cancelled, "cancelled");
                attempt.load_time_ms = started.elapsed().as_millis() as u64;
                return attempt;
            };

            match result {
                Ok(status) if status < 400 => {
                    info!("Found alternative URL: {} for {}", candidate, url);
                    let mut attempt = attempt.succeed();
                    attempt.status_code = status;
                    attempt.content_summary =
                        format!("Domain verification found alternative URL: {}", candidate);
                    attempt.final_url = candidate;
                    attempt.load_time_ms = started.elapsed().as_millis() as u64;
                    return attempt;
                }
                Ok(status) => debug!("Candidate {} answered {}", candidate, status),
                Err(e) => debug!("Candidate {} unreachable: {}", candidate, e),
            }
        }

        let mut attempt = attempt.fail(
            ErrorKind::Transport,
            "Domain verification failed to find alternative URLs",
        );
        attempt.load_time_ms = started.elapsed().as_millis() as u64;
        attempt
    }
}
