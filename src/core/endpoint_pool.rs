//! Endpoint Pool - per-network endpoint health & selection
//!
//! Health records are created lazily the first time a network is picked and
//! live until `reset`. Failures are cumulative: an endpoint that reaches
//! `max_failures_before_disable` stays disabled even after later successes.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::models::config::{NetworkConfig, PoolConfig};
use crate::providers::rpc::mask_url;
use crate::utils::constants::{LATENCY_EWMA_ALPHA, MAX_COOLDOWN_EXPONENT};

/// Health of one (network, url) pair
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointHealth {
    pub url: String,
    /// Cumulative, never decremented
    pub failures: u32,
    pub successes: u64,
    pub last_failure: Option<Instant>,
    pub cooldown_until: Option<Instant>,
    /// EWMA of successful call latency
    pub latency_ms: Option<f64>,
    pub disabled: bool,
}

impl EndpointHealth {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            failures: 0,
            successes: 0,
            last_failure: None,
            cooldown_until: None,
            latency_ms: None,
            disabled: false,
        }
    }

    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}

#[derive(Debug)]
struct NetworkEndpoints {
    endpoints: Vec<EndpointHealth>,
    cursor: usize,
}

impl NetworkEndpoints {
    fn new(urls: &[String]) -> Self {
        let mut endpoints: Vec<EndpointHealth> = Vec::with_capacity(urls.len());
        for url in urls {
            if !endpoints.iter().any(|e| &e.url == url) {
                endpoints.push(EndpointHealth::new(url));
            }
        }
        Self { endpoints, cursor: 0 }
    }

    fn find_mut(&mut self, url: &str) -> Option<&mut EndpointHealth> {
        self.endpoints.iter_mut().find(|e| e.url == url)
    }
}

/// `base * 2^min(failures, 6)`
pub fn cooldown_for(failures: u32, base: Duration) -> Duration {
    base.saturating_mul(1u32 << failures.min(MAX_COOLDOWN_EXPONENT))
}

/// Tracks endpoint health and picks the endpoint to use next
pub struct EndpointPool {
    config: PoolConfig,
    networks: DashMap<u64, NetworkEndpoints>,
}

impl EndpointPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            networks: DashMap::new(),
        }
    }

    /// Preferred endpoint for `network`.
    ///
    /// Candidates are enabled endpoints out of cooldown; if every enabled
    /// endpoint is cooling down, all enabled endpoints are candidates.
    /// `None` only when every endpoint is disabled or none is configured.
    pub fn pick(&self, network: &NetworkConfig) -> Option<String> {
        let mut entry = self
            .networks
            .entry(network.chain_id)
            .or_insert_with(|| NetworkEndpoints::new(&network.rpc_urls));

        let now = Instant::now();
        let mut candidates: Vec<usize> = entry
            .endpoints
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.disabled && !e.in_cooldown(now))
            .map(|(i, _)| i)
            .collect();

        if candidates.is_empty() {
            candidates = entry
                .endpoints
                .iter()
                .enumerate()
                .filter(|(_, e)| !e.disabled)
                .map(|(i, _)| i)
                .collect();
        }

        if candidates.is_empty() {
            return None;
        }

        let index = if self.config.round_robin {
            let slot = entry.cursor % candidates.len();
            entry.cursor = entry.cursor.wrapping_add(1);
            candidates[slot]
        } else {
            candidates[0]
        };

        Some(entry.endpoints[index].url.clone())
    }

    /// Record a successful call with its latency
    pub fn report_success(&self, chain_id: u64, url: &str, latency_ms: f64) {
        let Some(mut entry) = self.networks.get_mut(&chain_id) else {
            return;
        };
        let Some(health) = entry.find_mut(url) else {
            return;
        };

        health.successes += 1;
        health.latency_ms = Some(match health.latency_ms {
            Some(old) => old * (1.0 - LATENCY_EWMA_ALPHA) + latency_ms * LATENCY_EWMA_ALPHA,
            None => latency_ms,
        });
    }

    /// Record a failed call: exponential cooldown, disable past the threshold
    pub fn report_failure(&self, chain_id: u64, url: &str) {
        let Some(mut entry) = self.networks.get_mut(&chain_id) else {
            return;
        };
        let Some(health) = entry.find_mut(url) else {
            return;
        };

        let now = Instant::now();
        health.failures = health.failures.saturating_add(1);
        health.last_failure = Some(now);
        let cooldown = cooldown_for(health.failures, self.config.base_cooldown());
        health.cooldown_until = Some(now + cooldown);

        if !health.disabled && health.failures >= self.config.max_failures_before_disable {
            health.disabled = true;
            warn!(
                "🚫 Endpoint disabled on chain {}: {} ({} failures)",
                chain_id,
                mask_url(url),
                health.failures
            );
        } else {
            debug!(
                "⏳ Endpoint cooling down on chain {}: {} for {}ms",
                chain_id,
                mask_url(url),
                cooldown.as_millis()
            );
        }
    }

    /// Snapshot of one endpoint's health
    pub fn health(&self, chain_id: u64, url: &str) -> Option<EndpointHealth> {
        let entry = self.networks.get(&chain_id)?;
        entry.endpoints.iter().find(|e| e.url == url).cloned()
    }

    pub fn is_disabled(&self, chain_id: u64, url: &str) -> bool {
        self.networks
            .get(&chain_id)
            .is_some_and(|entry| entry.endpoints.iter().any(|e| e.url == url && e.disabled))
    }

    /// Drop a network's health records; they are rebuilt on the next pick
    pub fn reset(&self, chain_id: u64) {
        self.networks.remove(&chain_id);
    }

    pub fn reset_all(&self) {
        self.networks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(urls: &[&str]) -> NetworkConfig {
        NetworkConfig::new(1, "Ethereum", urls.iter().map(|s| s.to_string()).collect())
    }

    fn pool(round_robin: bool) -> EndpointPool {
        EndpointPool::new(PoolConfig {
            base_cooldown_ms: 60_000,
            max_failures_before_disable: 3,
            round_robin,
        })
    }

    #[test]
    fn test_cooldown_growth_capped() {
        let base = Duration::from_millis(100);
        assert_eq!(cooldown_for(0, base), Duration::from_millis(100));
        assert_eq!(cooldown_for(1, base), Duration::from_millis(200));
        assert_eq!(cooldown_for(3, base), Duration::from_millis(800));
        assert_eq!(cooldown_for(6, base), Duration::from_millis(6_400));
        // capped at 64x
        assert_eq!(cooldown_for(7, base), Duration::from_millis(6_400));
        assert_eq!(cooldown_for(u32::MAX, base), Duration::from_millis(6_400));
    }

    #[test]
    fn test_pick_prefers_first_healthy() {
        let pool = pool(false);
        let net = network(&["https://a", "https://b"]);
        assert_eq!(pool.pick(&net).as_deref(), Some("https://a"));

        pool.report_failure(1, "https://a");
        assert_eq!(pool.pick(&net).as_deref(), Some("https://b"));
    }

    #[test]
    fn test_pick_falls_back_when_all_cooling() {
        let pool = pool(false);
        let net = network(&["https://a", "https://b"]);
        pool.pick(&net);
        pool.report_failure(1, "https://a");
        pool.report_failure(1, "https://b");
        // both cooling down, neither disabled
        assert_eq!(pool.pick(&net).as_deref(), Some("https://a"));
    }

    #[test]
    fn test_disabled_after_threshold() {
        let pool = pool(false);
        let net = network(&["https://a"]);
        pool.pick(&net);

        for _ in 0..2 {
            pool.report_failure(1, "https://a");
        }
        assert!(!pool.is_disabled(1, "https://a"));

        pool.report_failure(1, "https://a");
        assert!(pool.is_disabled(1, "https://a"));
        assert_eq!(pool.pick(&net), None);

        // successes do not revive it
        pool.report_success(1, "https://a", 10.0);
        assert_eq!(pool.pick(&net), None);
        assert_eq!(pool.health(1, "https://a").unwrap().failures, 3);
    }

    #[test]
    fn test_failure_sets_growing_cooldown() {
        let pool = pool(false);
        let net = network(&["https://a"]);
        pool.pick(&net);

        pool.report_failure(1, "https://a");
        let first = pool.health(1, "https://a").unwrap();
        pool.report_failure(1, "https://a");
        let second = pool.health(1, "https://a").unwrap();

        let span = |h: &EndpointHealth| h.cooldown_until.unwrap() - h.last_failure.unwrap();
        assert_eq!(span(&first), Duration::from_secs(120));
        assert_eq!(span(&second), Duration::from_secs(240));
    }

    #[test]
    fn test_latency_ewma() {
        let pool = pool(false);
        let net = network(&["https://a"]);
        pool.pick(&net);

        pool.report_success(1, "https://a", 100.0);
        pool.report_success(1, "https://a", 200.0);
        let health = pool.health(1, "https://a").unwrap();
        assert!((health.latency_ms.unwrap() - 120.0).abs() < 1e-9);
        assert_eq!(health.successes, 2);
    }

    #[test]
    fn test_round_robin_rotates() {
        let pool = pool(true);
        let net = network(&["https://a", "https://b", "https://c"]);
        let picks: Vec<String> = (0..4).filter_map(|_| pool.pick(&net)).collect();
        assert_eq!(picks, vec!["https://a", "https://b", "https://c", "https://a"]);
    }

    #[test]
    fn test_unknown_pairs_ignored() {
        let pool = pool(false);
        pool.report_failure(99, "https://nowhere");
        pool.report_success(99, "https://nowhere", 5.0);
        assert!(pool.health(99, "https://nowhere").is_none());

        let net = network(&["https://a"]);
        pool.pick(&net);
        pool.report_failure(1, "https://other");
        assert_eq!(pool.health(1, "https://a").unwrap().failures, 0);
    }

    #[test]
    fn test_no_endpoints_configured() {
        let pool = pool(false);
        assert_eq!(pool.pick(&network(&[])), None);
    }

    #[test]
    fn test_reset_rebuilds_lazily() {
        let pool = pool(false);
        let net = network(&["https://a"]);
        pool.pick(&net);
        for _ in 0..3 {
            pool.report_failure(1, "https://a");
        }
        assert_eq!(pool.pick(&net), None);

        pool.reset(1);
        assert!(pool.health(1, "https://a").is_none());
        assert_eq!(pool.pick(&net).as_deref(), Some("https://a"));

        pool.reset_all();
        assert!(pool.health(1, "https://a").is_none());
    }
}
