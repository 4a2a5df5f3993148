//! Resolver configuration
//!
//! Presets come from `utils/constants.rs`; environment variables and JSON
//! documents override them. The core only ever reads these values.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::models::errors::{AppError, AppResult};
use crate::utils::constants::{
    get_chain_name, get_explorer_api_url, get_explorer_url, get_native_symbol,
    get_price_feed_key, get_public_rpc_urls, get_rpc_env_key, DEFAULT_COOLDOWN_BASE_MS,
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_MAX_FAILURES_BEFORE_DISABLE, DEFAULT_OVERLOAD_COOLDOWN_MS,
    DEFAULT_PRICE_API_URL, DEFAULT_PRICE_TTL_SECS, DEFAULT_RATE_WINDOW_MS,
    DEFAULT_REQUESTS_PER_WINDOW, SUPPORTED_CHAIN_IDS,
};

/// Etherscan-compatible explorer descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Display name ("Etherscan")
    pub name: String,
    /// Browser base URL, used for source links
    pub url: String,
    /// API endpoint (`.../api`)
    pub api_url: String,
    /// API key, never logged
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl ExplorerConfig {
    /// Link to the verified source of a contract
    pub fn source_link(&self, address: &str) -> String {
        format!("{}/address/{}#code", self.url.trim_end_matches('/'), address)
    }
}

/// Immutable per-network descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub name: String,
    pub native_symbol: String,
    /// Ordered endpoint URLs, first is preferred
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub explorer: Option<ExplorerConfig>,
    /// Chain key for the price service (`ethereum`, `base`, ...)
    #[serde(default)]
    pub price_feed_key: Option<String>,
}

impl NetworkConfig {
    /// Minimal descriptor, mostly for tests and custom chains
    pub fn new(chain_id: u64, name: impl Into<String>, rpc_urls: Vec<String>) -> Self {
        Self {
            chain_id,
            name: name.into(),
            native_symbol: get_native_symbol(chain_id).to_string(),
            rpc_urls,
            explorer: None,
            price_feed_key: None,
        }
    }

    /// Built-in preset for a supported chain
    pub fn preset(chain_id: u64) -> Option<Self> {
        if !SUPPORTED_CHAIN_IDS.contains(&chain_id) {
            return None;
        }

        let explorer = match (get_explorer_url(chain_id), get_explorer_api_url(chain_id)) {
            (Some(url), Some(api_url)) => Some(ExplorerConfig {
                name: format!("{} explorer", get_chain_name(chain_id)),
                url: url.to_string(),
                api_url: api_url.to_string(),
                api_key: None,
            }),
            _ => None,
        };

        Some(Self {
            chain_id,
            name: get_chain_name(chain_id).to_string(),
            native_symbol: get_native_symbol(chain_id).to_string(),
            rpc_urls: get_public_rpc_urls(chain_id).iter().map(|s| s.to_string()).collect(),
            explorer,
            price_feed_key: get_price_feed_key(chain_id).map(String::from),
        })
    }
}

/// EndpointPool tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Cooldown base; actual cooldown is base * 2^min(failures, 6)
    pub base_cooldown_ms: u64,
    /// Cumulative failures after which an endpoint is disabled
    pub max_failures_before_disable: u32,
    /// Rotate among healthy endpoints instead of always preferring the first
    pub round_robin: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_cooldown_ms: DEFAULT_COOLDOWN_BASE_MS,
            max_failures_before_disable: DEFAULT_MAX_FAILURES_BEFORE_DISABLE,
            round_robin: false,
        }
    }
}

impl PoolConfig {
    pub fn base_cooldown(&self) -> Duration {
        Duration::from_millis(self.base_cooldown_ms)
    }
}

/// Outbound HTTP client tuning (token bucket + circuit breaker)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    pub requests_per_window: u32,
    pub window_ms: u64,
    pub overload_cooldown_ms: u64,
    pub timeout_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            requests_per_window: DEFAULT_REQUESTS_PER_WINDOW,
            window_ms: DEFAULT_RATE_WINDOW_MS,
            overload_cooldown_ms: DEFAULT_OVERLOAD_COOLDOWN_MS,
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

/// Top-level resolver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Networks to resolve against, in configuration order
    pub networks: Vec<NetworkConfig>,
    pub pool: PoolConfig,
    /// Limits for JSON-RPC endpoint clients
    pub rpc_http: HttpClientConfig,
    /// Limits for explorer and price clients
    pub api_http: HttpClientConfig,
    pub price_api_url: String,
    pub price_ttl_secs: u64,
    /// Schedule the deep (metadata + price) pass after each fresh resolve
    pub background_enrichment: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            networks: SUPPORTED_CHAIN_IDS.iter().filter_map(|&id| NetworkConfig::preset(id)).collect(),
            pool: PoolConfig::default(),
            rpc_http: HttpClientConfig::default(),
            api_http: HttpClientConfig {
                requests_per_window: 5,
                ..HttpClientConfig::default()
            },
            price_api_url: DEFAULT_PRICE_API_URL.to_string(),
            price_ttl_secs: DEFAULT_PRICE_TTL_SECS,
            background_enrichment: true,
        }
    }
}

impl ResolverConfig {
    /// Parse a JSON configuration document
    pub fn from_json_str(json: &str) -> AppResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AppError::invalid_config(format!("Invalid resolver config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Presets overridden by environment variables
    ///
    /// - `CHAINSCOPE_NETWORKS`: comma-separated chain ids to enable
    /// - `<CHAIN>_RPC_URLS`: comma-separated endpoint list (e.g. `ETH_RPC_URLS`)
    /// - `ETHERSCAN_API_KEY`: explorer API key for every preset explorer
    /// - `CHAINSCOPE_ROUND_ROBIN`: `1`/`true` enables endpoint rotation
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(list) = std::env::var("CHAINSCOPE_NETWORKS") {
            let mut networks = Vec::new();
            for raw in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let chain_id: u64 = raw
                    .parse()
                    .map_err(|_| AppError::invalid_config(format!("Invalid chain id: {}", raw)))?;
                match NetworkConfig::preset(chain_id) {
                    Some(network) => networks.push(network),
                    None => warn!("⚠️ No preset for chain {}, skipping", chain_id),
                }
            }
            config.networks = networks;
        }

        for network in &mut config.networks {
            if let Some(key) = get_rpc_env_key(network.chain_id) {
                if let Some(urls) = parse_url_list(std::env::var(key).ok()) {
                    info!("🔧 {} endpoints overridden from {}", network.name, key);
                    network.rpc_urls = urls;
                }
            }
        }

        if let Ok(key) = std::env::var("ETHERSCAN_API_KEY") {
            if !key.is_empty() {
                info!("🔑 ETHERSCAN_API_KEY configured (key hidden)");
                for explorer in config.networks.iter_mut().filter_map(|n| n.explorer.as_mut()) {
                    explorer.api_key = Some(key.clone());
                }
            }
        }

        if let Ok(flag) = std::env::var("CHAINSCOPE_ROUND_ROBIN") {
            config.pool.round_robin = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the core cannot run with
    pub fn validate(&self) -> AppResult<()> {
        let mut seen = std::collections::HashSet::new();
        for network in &self.networks {
            if !seen.insert(network.chain_id) {
                return Err(AppError::invalid_config(format!(
                    "Duplicate network id {}",
                    network.chain_id
                )));
            }
        }
        for http in [&self.rpc_http, &self.api_http] {
            if http.requests_per_window == 0 || http.window_ms == 0 {
                return Err(AppError::invalid_config("Rate limit window must be non-zero"));
            }
        }
        if self.pool.max_failures_before_disable == 0 {
            return Err(AppError::invalid_config("max_failures_before_disable must be at least 1"));
        }
        Ok(())
    }

    pub fn network(&self, chain_id: u64) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.chain_id == chain_id)
    }

    pub fn price_ttl(&self) -> Duration {
        Duration::from_secs(self.price_ttl_secs)
    }
}

fn parse_url_list(raw: Option<String>) -> Option<Vec<String>> {
    let urls: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    (!urls.is_empty()).then_some(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_all_presets() {
        let config = ResolverConfig::default();
        assert_eq!(config.networks.len(), SUPPORTED_CHAIN_IDS.len());
        assert_eq!(config.networks[0].chain_id, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_preset_contents() {
        let base = NetworkConfig::preset(8453).unwrap();
        assert_eq!(base.name, "Base");
        assert_eq!(base.native_symbol, "ETH");
        assert_eq!(base.price_feed_key.as_deref(), Some("base"));
        assert!(base.explorer.is_some());
        assert!(NetworkConfig::preset(999).is_none());
    }

    #[test]
    fn test_from_json_partial() {
        let json = r#"{
            "networks": [
                { "chain_id": 1, "name": "Ethereum", "native_symbol": "ETH",
                  "rpc_urls": ["https://a.example", "https://b.example"] }
            ],
            "pool": { "round_robin": true }
        }"#;
        let config = ResolverConfig::from_json_str(json).unwrap();
        assert_eq!(config.networks.len(), 1);
        assert!(config.pool.round_robin);
        assert_eq!(config.pool.max_failures_before_disable, DEFAULT_MAX_FAILURES_BEFORE_DISABLE);
        assert_eq!(config.price_ttl_secs, DEFAULT_PRICE_TTL_SECS);
    }

    #[test]
    fn test_duplicate_network_rejected() {
        let mut config = ResolverConfig::default();
        config.networks.push(NetworkConfig::new(1, "Dup", vec![]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_source_link() {
        let explorer = NetworkConfig::preset(1).unwrap().explorer.unwrap();
        assert_eq!(
            explorer.source_link("0xabc"),
            "https://etherscan.io/address/0xabc#code"
        );
    }

    #[test]
    fn test_parse_url_list() {
        assert_eq!(
            parse_url_list(Some(" https://a , ,https://b".to_string())),
            Some(vec!["https://a".to_string(), "https://b".to_string()])
        );
        assert_eq!(parse_url_list(Some(" , ".to_string())), None);
        assert_eq!(parse_url_list(None), None);
    }
}
