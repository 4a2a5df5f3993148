//! Resolver - per-address orchestration
//!
//! Flow for one address:
//! 1. Serve from cache unless the cached record is stale
//! 2. Per configured network, in parallel: pick endpoint, probe code with
//!    failover, run the fast pipeline
//! 3. Merge into one `AddressResolution`, persist, return
//! 4. Detached deep pass (explorer metadata, prices), persisted again

use alloy_primitives::{Address, Bytes};
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::endpoint_pool::EndpointPool;
use crate::core::enrichers::{
    AccountBasicsEnricher, ContractBasicsEnricher, MetadataEnricher, PriceEnricher, StandardDetectorEnricher,
};
use crate::core::pipeline::{EnrichmentContext, EnrichmentPipeline};
use crate::models::config::{NetworkConfig, ResolverConfig};
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{
    canonical_address, parse_address, AddressResolution, NetworkAccountInfo, ScanMode, ScanSummary,
};
use crate::providers::explorer::{ContractExplorer, ExplorerClient};
use crate::providers::prices::{PriceClient, PriceOracle};
use crate::providers::rpc::{mask_url, EndpointClient, EndpointConnector, RpcConnector};
use crate::utils::cache::{MemoryResolutionCache, ResolutionCache};

pub const NO_ENDPOINT_CONFIGURED: &str = "no endpoint configured";
pub const ALL_ENDPOINTS_DISABLED: &str = "all endpoints disabled";

// ============================================
// STANDARD PIPELINES
// ============================================

/// Synchronous pass: balances, bytecode, proxy and standard detection
pub fn standard_fast_pipeline() -> EnrichmentPipeline {
    EnrichmentPipeline::new(vec![
        Arc::new(AccountBasicsEnricher),
        Arc::new(ContractBasicsEnricher),
        Arc::new(StandardDetectorEnricher),
    ])
}

/// Background pass: explorer metadata and prices
pub fn standard_deep_pipeline(explorer: Arc<dyn ContractExplorer>, oracle: Arc<dyn PriceOracle>) -> EnrichmentPipeline {
    EnrichmentPipeline::new(vec![
        Arc::new(MetadataEnricher::new(explorer)),
        Arc::new(PriceEnricher::new(oracle)),
    ])
}

// ============================================
// PER-NETWORK OUTCOME
// ============================================

/// State kept from the fast pass so the deep pass reuses client and bytecode
struct NetworkScan {
    network: Arc<NetworkConfig>,
    client: Arc<dyn EndpointClient>,
    code: Bytes,
    info: NetworkAccountInfo,
}

enum NetworkOutcome {
    Succeeded(Box<NetworkScan>),
    Failed(String),
    /// Still in flight when the caller cancelled
    Cancelled,
}

// ============================================
// RESOLVER
// ============================================

pub struct Resolver {
    networks: Vec<Arc<NetworkConfig>>,
    pool: Arc<EndpointPool>,
    connector: Arc<dyn EndpointConnector>,
    cache: Arc<dyn ResolutionCache>,
    fast: EnrichmentPipeline,
    deep: Option<EnrichmentPipeline>,
    /// Cancels detached deep passes on shutdown
    background: CancellationToken,
}

impl Resolver {
    /// Resolver over the real JSON-RPC, explorer and price clients
    pub fn new(config: ResolverConfig) -> AppResult<Self> {
        ResolverBuilder::new(config).build()
    }

    pub fn builder(config: ResolverConfig) -> ResolverBuilder {
        ResolverBuilder::new(config)
    }

    pub fn networks(&self) -> &[Arc<NetworkConfig>] {
        &self.networks
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<dyn ResolutionCache> {
        &self.cache
    }

    /// Stop every running background pass
    pub fn shutdown(&self) {
        self.background.cancel();
    }

    /// Parse then resolve; malformed input is `InvalidAddress`
    pub async fn resolve_str(&self, input: &str, cancel: &CancellationToken) -> AppResult<Arc<AddressResolution>> {
        let address = parse_address(input)?;
        self.resolve(address, cancel).await
    }

    /// Resolve `address` across every configured network.
    ///
    /// Per-network failures are reported inside the result. The only error is
    /// `Cancelled`, when `cancel` fires before any network is attempted; later
    /// cancellation returns the partial result without caching it.
    pub async fn resolve(&self, address: Address, cancel: &CancellationToken) -> AppResult<Arc<AddressResolution>> {
        let shown = canonical_address(&address);

        if let Some(cached) = self.cache.get(&address).await {
            if !cached.is_stale(self.networks.iter().map(|n| n.chain_id)) {
                debug!("📦 Serving cached resolution for {}", shown);
                return Ok(cached);
            }
            info!("♻️ Cached resolution for {} is stale, refreshing", shown);
        }

        if cancel.is_cancelled() {
            return Err(AppError::cancelled());
        }

        info!("🔍 Resolving {} across {} networks", shown, self.networks.len());
        let started = Instant::now();

        let outcomes = join_all(
            self.networks
                .iter()
                .map(|network| self.resolve_network(address, network.clone(), cancel)),
        )
        .await;

        let mut summary = ScanSummary {
            mode: ScanMode::Fast,
            chains_attempted: self.networks.iter().map(|n| n.chain_id).collect(),
            chains_succeeded: Vec::new(),
            chains_failed: BTreeMap::new(),
        };
        let mut networks = BTreeMap::new();
        let mut scans = Vec::new();
        let mut interrupted = false;

        for (network, outcome) in self.networks.iter().zip(outcomes) {
            match outcome {
                NetworkOutcome::Succeeded(scan) => {
                    summary.chains_succeeded.push(network.chain_id);
                    networks.insert(network.chain_id, scan.info.clone());
                    scans.push(*scan);
                }
                NetworkOutcome::Failed(reason) => {
                    warn!("❌ {} on {}: {}", shown, network.name, reason);
                    summary.chains_failed.insert(network.chain_id, reason);
                }
                NetworkOutcome::Cancelled => interrupted = true,
            }
        }

        let resolution = Arc::new(AddressResolution {
            address,
            resolved_at: Utc::now(),
            summary,
            networks,
        });

        if interrupted {
            info!("🛑 Resolution of {} cancelled, returning partial result", shown);
            return Ok(resolution);
        }

        info!(
            "✅ Resolved in {}ms: {}",
            started.elapsed().as_millis(),
            resolution.summary_line()
        );
        self.cache.set(address, resolution.clone()).await;

        if let Some(deep) = &self.deep {
            if !scans.is_empty() {
                self.spawn_deep_pass(deep.clone(), resolution.clone(), scans);
            }
        }

        Ok(resolution)
    }

    /// Code probe with failover, then the fast pipeline, for one network
    async fn resolve_network(
        &self,
        address: Address,
        network: Arc<NetworkConfig>,
        cancel: &CancellationToken,
    ) -> NetworkOutcome {
        let chain_id = network.chain_id;

        let Some(preferred) = self.pool.pick(&network) else {
            let reason = if network.rpc_urls.is_empty() {
                NO_ENDPOINT_CONFIGURED
            } else {
                ALL_ENDPOINTS_DISABLED
            };
            return NetworkOutcome::Failed(reason.to_string());
        };

        let mut candidates = vec![preferred.clone()];
        candidates.extend(
            network
                .rpc_urls
                .iter()
                .filter(|url| **url != preferred && !self.pool.is_disabled(chain_id, url))
                .cloned(),
        );

        let mut last_error: Option<String> = None;

        for url in candidates {
            if cancel.is_cancelled() {
                return NetworkOutcome::Cancelled;
            }

            let client = match self.connector.connect(&network, &url) {
                Ok(client) => client,
                Err(e) => {
                    self.pool.report_failure(chain_id, &url);
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            let started = Instant::now();
            let code = match client.get_code(address, cancel).await {
                Ok(code) => code,
                Err(e) if e.is_cancelled() => return NetworkOutcome::Cancelled,
                // local short-circuit: the endpoint was not contacted
                Err(e) if e.code == ErrorCode::CircuitOpen => {
                    debug!("⛔ {} skipped {}: {}", network.name, mask_url(&url), e);
                    last_error = Some(e.to_string());
                    continue;
                }
                Err(e) => {
                    debug!("🔁 {} failed on {}: {}", network.name, mask_url(&url), e);
                    self.pool.report_failure(chain_id, &url);
                    last_error = Some(e.to_string());
                    continue;
                }
            };
            self.pool
                .report_success(chain_id, &url, started.elapsed().as_secs_f64() * 1000.0);

            let info = NetworkAccountInfo::from_code_probe(&network, &code);
            let mut ctx = EnrichmentContext::new(
                address,
                network.clone(),
                info,
                client,
                self.cache.clone(),
                code,
                cancel.clone(),
            );

            if let Err(e) = self.fast.run(&mut ctx).await {
                if e.is_cancelled() {
                    return NetworkOutcome::Cancelled;
                }
                warn!("⚠️ Fast pipeline on {}: {}", network.name, e);
            }

            return NetworkOutcome::Succeeded(Box::new(NetworkScan {
                network,
                client: ctx.client,
                code: ctx.code,
                info: ctx.info,
            }));
        }

        NetworkOutcome::Failed(last_error.unwrap_or_else(|| NO_ENDPOINT_CONFIGURED.to_string()))
    }

    /// Fire and forget: the caller already has its result
    fn spawn_deep_pass(&self, deep: EnrichmentPipeline, resolution: Arc<AddressResolution>, scans: Vec<NetworkScan>) {
        let cache = self.cache.clone();
        let cancel = self.background.child_token();

        tokio::spawn(async move {
            let address = resolution.address;
            let shown = canonical_address(&address);

            let runs = scans.into_iter().map(|scan| {
                let deep = &deep;
                let cache = cache.clone();
                let cancel = cancel.clone();
                async move {
                    let chain_id = scan.network.chain_id;
                    let mut ctx =
                        EnrichmentContext::new(address, scan.network, scan.info, scan.client, cache, scan.code, cancel);
                    deep.run(&mut ctx).await.map(|()| (chain_id, ctx.info))
                }
            });

            let mut updated = (*resolution).clone();
            for result in join_all(runs).await {
                match result {
                    Ok((chain_id, info)) => {
                        updated.networks.insert(chain_id, info);
                    }
                    Err(e) if e.is_cancelled() => {
                        debug!("🛑 Deep pass for {} cancelled", shown);
                        return;
                    }
                    Err(e) => warn!("⚠️ Deep pass for {} failed: {}", shown, e),
                }
            }

            updated.summary.mode = ScanMode::Deep;
            cache.set(address, Arc::new(updated)).await;
            debug!("🧠 Deep pass stored for {}", shown);
        });
    }
}

// ============================================
// BUILDER
// ============================================

/// Wires a `Resolver`; anything not supplied defaults to the real clients
pub struct ResolverBuilder {
    config: ResolverConfig,
    connector: Option<Arc<dyn EndpointConnector>>,
    cache: Option<Arc<dyn ResolutionCache>>,
    fast: Option<EnrichmentPipeline>,
    deep: Option<EnrichmentPipeline>,
    explorer: Option<Arc<dyn ContractExplorer>>,
    oracle: Option<Arc<dyn PriceOracle>>,
}

impl ResolverBuilder {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            connector: None,
            cache: None,
            fast: None,
            deep: None,
            explorer: None,
            oracle: None,
        }
    }

    pub fn connector(mut self, connector: Arc<dyn EndpointConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn ResolutionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn fast_pipeline(mut self, pipeline: EnrichmentPipeline) -> Self {
        self.fast = Some(pipeline);
        self
    }

    /// Replaces the standard deep pipeline
    pub fn deep_pipeline(mut self, pipeline: EnrichmentPipeline) -> Self {
        self.deep = Some(pipeline);
        self
    }

    pub fn explorer(mut self, explorer: Arc<dyn ContractExplorer>) -> Self {
        self.explorer = Some(explorer);
        self
    }

    pub fn price_oracle(mut self, oracle: Arc<dyn PriceOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn build(self) -> AppResult<Resolver> {
        let config = self.config;
        config.validate()?;

        let connector: Arc<dyn EndpointConnector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(RpcConnector::new(config.rpc_http.clone())?),
        };

        let deep = if !config.background_enrichment {
            None
        } else if let Some(deep) = self.deep {
            Some(deep)
        } else {
            let explorer: Arc<dyn ContractExplorer> = match self.explorer {
                Some(explorer) => explorer,
                None => Arc::new(ExplorerClient::new(config.api_http.clone())?),
            };
            let oracle: Arc<dyn PriceOracle> = match self.oracle {
                Some(oracle) => oracle,
                None => Arc::new(PriceClient::new(
                    config.price_api_url.clone(),
                    &config.api_http,
                    config.price_ttl(),
                )?),
            };
            Some(standard_deep_pipeline(explorer, oracle))
        };

        let cache: Arc<dyn ResolutionCache> = match self.cache {
            Some(cache) => cache,
            None => Arc::new(MemoryResolutionCache::new()),
        };

        let networks: Vec<Arc<NetworkConfig>> = config.networks.iter().cloned().map(Arc::new).collect();
        info!(
            "🚀 Resolver ready: {} networks, background enrichment {}",
            networks.len(),
            if deep.is_some() { "on" } else { "off" }
        );

        Ok(Resolver {
            networks,
            pool: Arc::new(EndpointPool::new(config.pool.clone())),
            connector,
            cache,
            fast: self.fast.unwrap_or_else(standard_fast_pipeline),
            deep,
            background: CancellationToken::new(),
        })
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        self.background.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_pipelines_order() {
        assert_eq!(
            standard_fast_pipeline().names(),
            vec!["account-basics", "contract-basics", "standard-detector"]
        );
    }

    #[test]
    fn test_builder_defaults_without_background() {
        let config = ResolverConfig {
            background_enrichment: false,
            ..ResolverConfig::default()
        };
        let resolver = ResolverBuilder::new(config).build().unwrap();
        assert!(resolver.deep.is_none());
        assert_eq!(resolver.networks().len(), ResolverConfig::default().networks.len());
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = ResolverConfig::default();
        config.pool.max_failures_before_disable = 0;
        assert!(ResolverBuilder::new(config).build().is_err());
    }

    #[tokio::test]
    async fn test_resolve_str_rejects_garbage() {
        let config = ResolverConfig {
            networks: vec![],
            background_enrichment: false,
            ..ResolverConfig::default()
        };
        let resolver = Resolver::new(config).unwrap();
        let err = resolver
            .resolve_str("not-an-address", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::models::errors::ErrorCode::InvalidAddress);
    }
}
