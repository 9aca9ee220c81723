//! Rung 2: cookie priming followed by a browser-like GET.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use super::{cancellable, finish, FetchedPage, StrategyParams, TransportAdapter};
use crate::models::{Attempt, Strategy};
use crate::scrapers::http_client::{HttpClient, ENHANCED_HEADERS};
use crate::scrapers::FetchError;
use crate::utils::domain_of;

/// Enhanced HTTP fetch with session priming and a synthesized referrer.
#[derive(Debug, Clone)]
pub struct EnhancedHttpAdapter {
    priming_timeout: Duration,
}

impl Default for EnhancedHttpAdapter {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl EnhancedHttpAdapter {
    pub fn new(priming_timeout: Duration) -> Self {
        Self { priming_timeout }
    }

    /// Referrer that looks like a search for the target's domain.
    pub fn referer_for(url: &str) -> String {
        format!("https://www.google.com/search?q={}", domain_of(url))
    }

    async fn fetch(
        &self,
        url: &str,
        proxy: Option<&str>,
        params: &StrategyParams,
    ) -> Result<FetchedPage, FetchError> {
        let client = HttpClient::with_cookies(&params.user_agent, params.timeout, proxy)?;

        // Priming only collects cookies; its failure does not fail the rung
        if let Err(e) = client.head(url, ENHANCED_HEADERS, self.priming_timeout).await {
            warn!("Priming request failed for {}: {}", url, e);
        }

        let referer = [("Referer", Self::referer_for(url))];
        let response = client.get(url, ENHANCED_HEADERS, &referer).await?;
        Ok(FetchedPage::from_html(
            response.status,
            response.final_url,
            response.body,
        ))
    }
}

#[async_trait]
impl TransportAdapter for EnhancedHttpAdapter {
    fn strategy(&self) -> Strategy {
        Strategy::EnhancedHttp
    }

    async fn attempt(&self, url: &str, proxy: Option<&str>, params: &StrategyParams) -> Attempt {
        let attempt = Attempt::new(url, Strategy::EnhancedHttp).with_proxy(proxy);
        let started = Instant::now();
        let outcome = cancellable(&params.cancel, self.fetch(url, proxy, params)).await;
        finish(attempt, started, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params() -> StrategyParams {
        StrategyParams::new(Duration::from_secs(5), "Mozilla/5.0 test")
    }

    #[test]
    fn test_referer_uses_domain() {
        assert_eq!(
            EnhancedHttpAdapter::referer_for("https://shop.example.com/a/b"),
            "https://www.google.com/search?q=shop.example.com"
        );
    }

    #[tokio::test]
    async fn test_priming_cookie_and_referer_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "session=primed; Path=/"))
            .mount(&server)
            .await;
        let referer = EnhancedHttpAdapter::referer_for(&server.uri());
        Mock::given(method("GET"))
            .and(header("cookie", "session=primed"))
            .and(header("referer", referer.as_str()))
            .and(header("sec-fetch-mode", "navigate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<title>Inside</title>"))
            .mount(&server)
            .await;

        let attempt = EnhancedHttpAdapter::default()
            .attempt(&server.uri(), None, &params())
            .await;

        assert!(attempt.succeeded, "{:?}", attempt.error_message);
        assert_eq!(attempt.strategy_ordinal, 2);
        assert_eq!(attempt.title, "Inside");
    }

    #[tokio::test]
    async fn test_priming_failure_is_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<title>Fine</title>"))
            .mount(&server)
            .await;

        let adapter = EnhancedHttpAdapter::new(Duration::from_millis(100));
        let attempt = adapter.attempt(&server.uri(), None, &params()).await;
        assert!(attempt.succeeded);
    }

    #[tokio::test]
    async fn test_enhanced_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let attempt = EnhancedHttpAdapter::default()
            .attempt(&server.uri(), None, &params())
            .await;
        assert_eq!(attempt.error_kind, Some(ErrorKind::HttpStatus));
    }
}
