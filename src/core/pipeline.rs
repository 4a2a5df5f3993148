//! Enrichment Pipeline
//!
//! Ordered list of enrichers run against one network's record. Each step is
//! isolated: a failing enricher is logged and the next one runs. Only
//! cancellation stops a run early.

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::config::NetworkConfig;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::NetworkAccountInfo;
use crate::providers::rpc::EndpointClient;
use crate::utils::cache::ResolutionCache;

// ============================================
// CONTEXT
// ============================================

/// Mutable working set for one pipeline run
pub struct EnrichmentContext {
    pub address: Address,
    pub network: Arc<NetworkConfig>,
    /// Record under construction
    pub info: NetworkAccountInfo,
    /// Endpoint that answered the code probe
    pub client: Arc<dyn EndpointClient>,
    pub cache: Arc<dyn ResolutionCache>,
    pub cancel: CancellationToken,
    /// Runtime bytecode from the code probe (empty for an EOA)
    pub code: Bytes,
}

impl EnrichmentContext {
    pub fn new(
        address: Address,
        network: Arc<NetworkConfig>,
        info: NetworkAccountInfo,
        client: Arc<dyn EndpointClient>,
        cache: Arc<dyn ResolutionCache>,
        code: Bytes,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            address,
            network,
            info,
            client,
            cache,
            cancel,
            code,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.network.chain_id
    }

    pub fn check_cancelled(&self) -> AppResult<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::cancelled());
        }
        Ok(())
    }

    /// `eth_call` against the target that never fails except on cancellation.
    /// Reverts, transport errors and empty return data all read as `None`.
    pub async fn safe_call(&self, data: Bytes) -> AppResult<Option<Bytes>> {
        self.safe_call_to(self.address, data).await
    }

    /// `safe_call` against another contract (e.g. a proxy's beacon)
    pub async fn safe_call_to(&self, to: Address, data: Bytes) -> AppResult<Option<Bytes>> {
        let result = self.client.call(to, data, &self.cancel).await;
        Ok(recover(result, "eth_call")?.filter(|bytes| !bytes.is_empty()))
    }
}

/// Treat a failed probe as "unknown"; cancellation still propagates
pub fn recover<T>(result: AppResult<T>, what: &str) -> AppResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_cancelled() => Err(e),
        Err(e) => {
            debug!("🔎 {} probe failed: {}", what, e);
            Ok(None)
        }
    }
}

// ============================================
// ENRICHER CONTRACT
// ============================================

/// One independent enrichment step
#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower runs first
    fn priority(&self) -> u32;

    /// Whether this enricher applies to the current record
    fn supports(&self, ctx: &EnrichmentContext) -> bool;

    async fn enrich(&self, ctx: &mut EnrichmentContext) -> AppResult<()>;
}

// ============================================
// PIPELINE
// ============================================

#[derive(Clone, Default)]
pub struct EnrichmentPipeline {
    enrichers: Vec<Arc<dyn Enricher>>,
}

impl EnrichmentPipeline {
    /// Sorted by ascending priority once; equal priorities keep insertion order
    pub fn new(mut enrichers: Vec<Arc<dyn Enricher>>) -> Self {
        enrichers.sort_by_key(|e| e.priority());
        Self { enrichers }
    }

    pub fn len(&self) -> usize {
        self.enrichers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enrichers.is_empty()
    }

    /// Enricher names in execution order
    pub fn names(&self) -> Vec<&'static str> {
        self.enrichers.iter().map(|e| e.name()).collect()
    }

    pub async fn run(&self, ctx: &mut EnrichmentContext) -> AppResult<()> {
        for enricher in &self.enrichers {
            ctx.check_cancelled()?;

            if !enricher.supports(ctx) {
                continue;
            }

            match enricher.enrich(ctx).await {
                Ok(()) => debug!("✨ {} done on chain {}", enricher.name(), ctx.chain_id()),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => warn!(
                    "⚠️ Enricher {} failed on chain {}: {}",
                    enricher.name(),
                    ctx.chain_id(),
                    e
                ),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::TransactionReceipt;
    use crate::utils::cache::MemoryResolutionCache;
    use alloy_primitives::{B256, U256};
    use std::sync::Mutex;

    struct NullClient;

    #[async_trait]
    impl EndpointClient for NullClient {
        fn url(&self) -> &str {
            "mock://null"
        }
        async fn get_code(&self, _: Address, _: &CancellationToken) -> AppResult<Bytes> {
            Ok(Bytes::new())
        }
        async fn get_balance(&self, _: Address, _: &CancellationToken) -> AppResult<U256> {
            Ok(U256::ZERO)
        }
        async fn get_transaction_count(&self, _: Address, _: &CancellationToken) -> AppResult<u64> {
            Ok(0)
        }
        async fn call(&self, _: Address, _: Bytes, _: &CancellationToken) -> AppResult<Bytes> {
            Err(AppError::rpc_error("execution reverted"))
        }
        async fn get_storage_at(&self, _: Address, _: B256, _: &CancellationToken) -> AppResult<B256> {
            Ok(B256::ZERO)
        }
        async fn get_transaction_receipt(&self, _: B256, _: &CancellationToken) -> AppResult<Option<TransactionReceipt>> {
            Ok(None)
        }
    }

    fn context() -> EnrichmentContext {
        let network = Arc::new(NetworkConfig::new(1, "Ethereum", vec![]));
        let code = Bytes::from(vec![0x60, 0x80]);
        let info = NetworkAccountInfo::from_code_probe(&network, &code);
        EnrichmentContext::new(
            Address::repeat_byte(0xaa),
            network,
            info,
            Arc::new(NullClient),
            Arc::new(MemoryResolutionCache::new()),
            code,
            CancellationToken::new(),
        )
    }

    /// Records its name into a shared log, optionally failing
    struct Step {
        name: &'static str,
        priority: u32,
        outcome: fn() -> AppResult<()>,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Enricher for Step {
        fn name(&self) -> &'static str {
            self.name
        }
        fn priority(&self) -> u32 {
            self.priority
        }
        fn supports(&self, _: &EnrichmentContext) -> bool {
            true
        }
        async fn enrich(&self, ctx: &mut EnrichmentContext) -> AppResult<()> {
            self.log.lock().unwrap().push(self.name);
            ctx.info.add_label(self.name);
            (self.outcome)()
        }
    }

    fn step(name: &'static str, priority: u32, outcome: fn() -> AppResult<()>, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Enricher> {
        Arc::new(Step {
            name,
            priority,
            outcome,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn test_runs_in_priority_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = EnrichmentPipeline::new(vec![
            step("c", 30, || Ok(()), &log),
            step("a", 10, || Ok(()), &log),
            step("b", 20, || Ok(()), &log),
        ]);
        assert_eq!(pipeline.names(), vec!["a", "b", "c"]);

        let mut ctx = context();
        pipeline.run(&mut ctx).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = EnrichmentPipeline::new(vec![
            step("first", 10, || Err(AppError::rpc_timeout("boom")), &log),
            step("second", 20, || Ok(()), &log),
        ]);

        let mut ctx = context();
        pipeline.run(&mut ctx).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(ctx.info.labels, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn test_middle_failure_keeps_neighbours() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = EnrichmentPipeline::new(vec![
            step("third", 30, || Ok(()), &log),
            step("second", 20, || Err(AppError::invalid_response("garbled")), &log),
            step("first", 10, || Ok(()), &log),
        ]);

        let mut ctx = context();
        pipeline.run(&mut ctx).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
        assert!(ctx.info.labels.contains(&"first".to_string()));
        assert!(ctx.info.labels.contains(&"third".to_string()));
    }

    #[tokio::test]
    async fn test_cancelled_enricher_stops_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = EnrichmentPipeline::new(vec![
            step("first", 10, || Err(AppError::cancelled()), &log),
            step("second", 20, || Ok(()), &log),
        ]);

        let mut ctx = context();
        let err = pipeline.run(&mut ctx).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }

    #[tokio::test]
    async fn test_cancel_before_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = EnrichmentPipeline::new(vec![step("only", 10, || Ok(()), &log)]);

        let mut ctx = context();
        ctx.cancel.cancel();
        assert!(pipeline.run(&mut ctx).await.unwrap_err().is_cancelled());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_safe_call_swallows_revert() {
        let ctx = context();
        assert_eq!(ctx.safe_call(Bytes::from(vec![1, 2, 3, 4])).await.unwrap(), None);
    }
}
