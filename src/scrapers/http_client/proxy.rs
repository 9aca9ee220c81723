//! Static proxy list, sampled per attempt.

use rand::Rng;

/// Read-only proxy list. Empty means direct connections.
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    proxies: Vec<String>,
}

impl ProxyPool {
    pub fn new(proxies: Vec<String>) -> Self {
        Self { proxies }
    }

    /// A uniformly random proxy, or `None` when the pool is empty.
    pub fn pick(&self) -> Option<&str> {
        if self.proxies.is_empty() {
            return None;
        }
        let idx = rand::rng().random_range(0..self.proxies.len());
        Some(&self.proxies[idx])
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pool_is_direct() {
        assert_eq!(ProxyPool::default().pick(), None);
    }

    #[test]
    fn test_pick_returns_member() {
        let pool = ProxyPool::new(vec!["http://p1:8080".into(), "socks5://p2:1080".into()]);
        for _ in 0..20 {
            let picked = pool.pick().unwrap();
            assert!(picked == "http://p1:8080" || picked == "socks5://p2:1080");
        }
    }
}
