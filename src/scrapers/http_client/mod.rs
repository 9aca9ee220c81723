//! HTTP client used by the plain, enhanced and domain-check rungs and the
//! plain probe.

mod proxy;
mod user_agent;

pub use proxy::ProxyPool;
pub use user_agent::{UserAgentPool, IMPERSONATE_USER_AGENTS};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::redirect::Policy;
use reqwest::{Client, Proxy, RequestBuilder};

use super::FetchError;

/// Minimal browser-like headers for the plain rung.
pub const PLAIN_HEADERS: &[(&str, &str)] = &[
    ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Cache-Control", "max-age=0"),
];

/// Extended header set for the enhanced rung.
pub const ENHANCED_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
    ),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Cache-Control", "max-age=0"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-User", "?1"),
    ("Pragma", "no-cache"),
];

/// Headers sent by the plain access probe.
pub const PROBE_HEADERS: &[(&str, &str)] = &[
    ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("Referer", "https://www.google.com/"),
    ("DNT", "1"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "cross-site"),
    ("Sec-Fetch-User", "?1"),
    ("Cache-Control", "max-age=0"),
];

/// Fully read response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub final_url: String,
    /// Header names lowercased.
    pub headers: HashMap<String, String>,
    pub body: String,
    pub content_length: u64,
    pub elapsed: Duration,
}

impl HttpResponse {
    pub fn content_type(&self) -> &str {
        self.headers
            .get("content-type")
            .map(|s| s.as_str())
            .unwrap_or("")
    }
}

/// Thin wrapper over a reqwest client configured for one attempt.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Build a client. Certificate errors are tolerated and redirects followed.
    pub fn new(user_agent: &str, timeout: Duration, proxy: Option<&str>) -> Result<Self, FetchError> {
        Self::build(user_agent, timeout, proxy, false)
    }

    /// Build a client that keeps cookies across requests.
    pub fn with_cookies(
        user_agent: &str,
        timeout: Duration,
        proxy: Option<&str>,
    ) -> Result<Self, FetchError> {
        Self::build(user_agent, timeout, proxy, true)
    }

    fn build(
        user_agent: &str,
        timeout: Duration,
        proxy: Option<&str>,
        cookies: bool,
    ) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .cookie_store(cookies)
            .danger_accept_invalid_certs(true)
            .redirect(Policy::limited(10));

        if let Some(proxy) = proxy {
            let proxy = Proxy::all(proxy)
                .map_err(|e| FetchError::Transport(format!("invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn apply_headers(mut request: RequestBuilder, headers: &[(&str, &str)]) -> RequestBuilder {
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request
    }

    /// GET and read the whole body. Any status is returned as a response.
    pub async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        extra: &[(&str, String)],
    ) -> Result<HttpResponse, FetchError> {
        let mut request = Self::apply_headers(self.client.get(url), headers);
        for (name, value) in extra {
            request = request.header(*name, value.as_str());
        }

        let start = Instant::now();
        let response = request.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut response_headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                response_headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
            }
        }

        let bytes = response.bytes().await?;
        let elapsed = start.elapsed();

        Ok(HttpResponse {
            status,
            final_url,
            headers: response_headers,
            content_length: bytes.len() as u64,
            body: String::from_utf8_lossy(&bytes).into_owned(),
            elapsed,
        })
    }

    /// HEAD with its own timeout, following redirects. Returns the final status.
    pub async fn head(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<u16, FetchError> {
        let request = Self::apply_headers(self.client.head(url), headers).timeout(timeout);
        let response = request.send().await?;
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_collects_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header("upgrade-insecure-requests", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-RateLimit-Limit", "100")
                    .set_body_raw("<html>hello</html>", "text/html"),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new("test-agent", Duration::from_secs(5), None).unwrap();
        let response = client.get(&server.uri(), PLAIN_HEADERS, &[]).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "<html>hello</html>");
        assert_eq!(response.content_length, 18);
        assert!(response.content_type().starts_with("text/html"));
        assert!(response.headers.contains_key("x-ratelimit-limit"));
    }

    #[tokio::test]
    async fn test_head_returns_status() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new("test-agent", Duration::from_secs(5), None).unwrap();
        let status = client
            .head(&server.uri(), &[], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(status, 404);
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        let result = HttpClient::new("ua", Duration::from_secs(1), Some("not a proxy url"));
        assert!(matches!(result, Err(FetchError::Transport(_))));
    }
}
