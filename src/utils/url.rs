//! URL helpers.

use url::Url;

/// Prepend `https://` when the input has no scheme.
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Host (with port when present) of a URL, or the raw input if it does not parse.
pub fn domain_of(input: &str) -> String {
    match Url::parse(&normalize_url(input)) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => input.to_string(),
        },
        Err(_) => input.to_string(),
    }
}

/// Site a URL belongs to for politeness purposes: the lowercased host
/// without port or a leading `www.`.
pub fn site_key(input: &str) -> String {
    let host = match Url::parse(&normalize_url(input)) {
        Ok(url) => url.host_str().map(str::to_ascii_lowercase),
        Err(_) => None,
    }
    .unwrap_or_else(|| input.trim().to_ascii_lowercase());
    match host.strip_prefix("www.") {
        Some(bare) if !bare.is_empty() => bare.to_string(),
        _ => host,
    }
}

/// Compare two URLs after normalization, ignoring fragments and a trailing slash.
pub fn same_url(a: &str, b: &str) -> bool {
    fn canonical(s: &str) -> String {
        match Url::parse(&normalize_url(s)) {
            Ok(mut url) => {
                url.set_fragment(None);
                url.as_str().trim_end_matches('/').to_string()
            }
            Err(_) => s.trim().trim_end_matches('/').to_string(),
        }
    }
    canonical(a) == canonical(b)
}

/// Filesystem-safe stem for a domain: dots and colons become underscores.
pub fn screenshot_stem(domain: &str) -> String {
    domain.replace(['.', ':'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url(" http://example.com "), "http://example.com");
        assert_eq!(normalize_url("https://example.com/a"), "https://example.com/a");
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("https://www.example.com/path?q=1"), "www.example.com");
        assert_eq!(domain_of("http://localhost:8080/"), "localhost:8080");
        assert_eq!(domain_of("example.org"), "example.org");
        assert_eq!(domain_of("not a url"), "not a url");
    }

    #[test]
    fn test_site_key_ignores_www_and_port() {
        assert_eq!(site_key("https://www.example.com/a"), "example.com");
        assert_eq!(site_key("http://example.com:8080/b"), "example.com");
        assert_eq!(site_key("WWW.Example.com"), "example.com");
        assert_eq!(site_key("https://shop.example.com"), "shop.example.com");
        assert_eq!(site_key("http://127.0.0.1:3000"), "127.0.0.1");
    }

    #[test]
    fn test_same_url() {
        assert!(same_url("https://example.com", "https://example.com/"));
        assert!(same_url("example.com", "https://example.com/#top"));
        assert!(!same_url("https://example.com", "https://www.example.com/"));
        assert!(!same_url("http://example.com", "https://example.com"));
    }

    #[test]
    fn test_screenshot_stem() {
        assert_eq!(screenshot_stem("www.example.com:8443"), "www_example_com_8443");
    }
}
