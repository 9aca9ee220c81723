//! Rung 1: a single GET with minimal headers.

use std::time::Instant;

use async_trait::async_trait;

use super::{cancellable, finish, FetchedPage, StrategyParams, TransportAdapter};
use crate::models::{Attempt, Strategy};
use crate::scrapers::http_client::{HttpClient, PLAIN_HEADERS};
use crate::scrapers::FetchError;

/// Plain HTTP fetch. No cookie priming; certificate errors tolerated.
#[derive(Debug, Clone, Default)]
pub struct PlainHttpAdapter;

impl PlainHttpAdapter {
    async fn fetch(
        &self,
        url: &str,
        proxy: Option<&str>,
        params: &StrategyParams,
    ) -> Result<FetchedPage, FetchError> {
        let client = HttpClient::new(&params.user_agent, params.timeout, proxy)?;
        let response = client.get(url, PLAIN_HEADERS, &[]).await?;
        Ok(FetchedPage::from_html(
            response.status,
            response.final_url,
            response.body,
        ))
    }
}

#[async_trait]
impl TransportAdapter for PlainHttpAdapter {
    fn strategy(&self) -> Strategy {
        Strategy::PlainHttp
    }

    async fn attempt(&self, url: &str, proxy: Option<&str>, params: &StrategyParams) -> Attempt {
        let attempt = Attempt::new(url, Strategy::PlainHttp).with_proxy(proxy);
        let started = Instant::now();
        let outcome = cancellable(&params.cancel, self.fetch(url, proxy, params)).await;
        finish(attempt, started, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params() -> StrategyParams {
        StrategyParams::new(Duration::from_secs(5), "Mozilla/5.0 test")
    }

    #[tokio::test]
    async fn test_plain_success_extracts_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shop"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><title>Shop</title>
                <meta name="description" content="Things"></head>
                <body><p>Buy things</p></body></html>"#,
            ))
            .mount(&server)
            .await;

        let url = format!("{}/shop", server.uri());
        let attempt = PlainHttpAdapter.attempt(&url, None, &params()).await;

        assert!(attempt.succeeded);
        assert_eq!(attempt.strategy_ordinal, 1);
        assert_eq!(attempt.status_code, 200);
        assert_eq!(attempt.title, "Shop");
        assert_eq!(attempt.meta_description, "Things");
        assert_eq!(attempt.content_summary, "Buy things");
        assert!(attempt.proxy_used.is_none());
    }

    #[tokio::test]
    async fn test_plain_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
            .mount(&server)
            .await;

        let attempt = PlainHttpAdapter.attempt(&server.uri(), None, &params()).await;
        assert!(!attempt.succeeded);
        assert_eq!(attempt.error_kind, Some(ErrorKind::HttpStatus));
        assert_eq!(attempt.status_code, 403);
    }

    #[tokio::test]
    async fn test_plain_bot_wall() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<title>Just a moment</title>Cloudflare is checking"),
            )
            .mount(&server)
            .await;

        let attempt = PlainHttpAdapter.attempt(&server.uri(), None, &params()).await;
        assert!(!attempt.succeeded);
        assert_eq!(attempt.error_kind, Some(ErrorKind::Blocked));
    }

    #[tokio::test]
    async fn test_plain_connection_refused() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{}/", port);
        let attempt = PlainHttpAdapter.attempt(&url, None, &params()).await;
        assert!(!attempt.succeeded);
        assert_eq!(attempt.error_kind, Some(ErrorKind::Transport));
        assert!(attempt.error_message.is_some());
    }
}
