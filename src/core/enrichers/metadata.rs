//! Explorer verification data and deployment origin

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::pipeline::{recover, EnrichmentContext, Enricher};
use crate::models::errors::AppResult;
use crate::providers::explorer::ContractExplorer;

pub const METADATA_PRIORITY: u32 = 40;

pub struct MetadataEnricher {
    explorer: Arc<dyn ContractExplorer>,
}

impl MetadataEnricher {
    pub fn new(explorer: Arc<dyn ContractExplorer>) -> Self {
        Self { explorer }
    }
}

#[async_trait]
impl Enricher for MetadataEnricher {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn priority(&self) -> u32 {
        METADATA_PRIORITY
    }

    fn supports(&self, ctx: &EnrichmentContext) -> bool {
        ctx.info.is_contract && ctx.network.explorer.is_some()
    }

    async fn enrich(&self, ctx: &mut EnrichmentContext) -> AppResult<()> {
        let Some(explorer) = ctx.network.explorer.clone() else {
            return Ok(());
        };

        let (metadata, deployment) = tokio::join!(
            self.explorer.source_code(&explorer, ctx.address, &ctx.cancel),
            self.explorer.contract_creation(&explorer, ctx.address, &ctx.cancel),
        );

        // each lookup stands on its own; only cancellation aborts
        if let Some(metadata) = recover(metadata, "explorer source")?.flatten() {
            ctx.info.contract_mut().metadata = Some(metadata);
        }

        let Some(mut deployment) = recover(deployment, "explorer creation")?.flatten() else {
            return Ok(());
        };

        if let Some(tx_hash) = deployment.tx_hash {
            let receipt = ctx.client.get_transaction_receipt(tx_hash, &ctx.cancel).await;
            deployment.block_number = recover(receipt, "creation receipt")?
                .flatten()
                .and_then(|r| r.block_number);
        }

        ctx.info.contract_mut().deployment = Some(deployment);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::enrichers::mock::{context, context_on, ScriptedClient};
    use crate::models::config::{ExplorerConfig, NetworkConfig};
    use crate::models::errors::AppError;
    use crate::models::types::{ContractMetadata, DeploymentInfo, TransactionReceipt};
    use alloy_primitives::{address, b256, Address};
    use tokio_util::sync::CancellationToken;

    const CREATION_TX: alloy_primitives::B256 =
        b256!("e7e0fe390354509cd08c9a0168536938600ddc552b3f7cb96030ebef62e75895");

    struct StaticExplorer {
        fail_source: bool,
    }

    #[async_trait]
    impl ContractExplorer for StaticExplorer {
        async fn source_code(
            &self,
            explorer: &ExplorerConfig,
            _: Address,
            _: &CancellationToken,
        ) -> AppResult<Option<ContractMetadata>> {
            if self.fail_source {
                return Err(AppError::rpc_timeout("explorer down"));
            }
            Ok(Some(ContractMetadata {
                verified: true,
                contract_name: Some("FiatTokenProxy".to_string()),
                abi: Some("[]".to_string()),
                source_url: Some(format!("{}/address/x#code", explorer.url)),
            }))
        }

        async fn contract_creation(
            &self,
            _: &ExplorerConfig,
            _: Address,
            _: &CancellationToken,
        ) -> AppResult<Option<DeploymentInfo>> {
            Ok(Some(DeploymentInfo {
                creator: Some(address!("95ba4cf87d6723ad9c0db21737d862be80e93911")),
                tx_hash: Some(CREATION_TX),
                block_number: None,
            }))
        }
    }

    fn mainnet() -> NetworkConfig {
        NetworkConfig::preset(1).unwrap()
    }

    #[tokio::test]
    async fn test_metadata_and_creation_block() {
        let mut client = ScriptedClient::default();
        client.receipts.insert(
            CREATION_TX,
            TransactionReceipt {
                transaction_hash: CREATION_TX,
                block_number: Some(6_082_465),
                contract_address: None,
                status: Some(true),
            },
        );

        let enricher = MetadataEnricher::new(Arc::new(StaticExplorer { fail_source: false }));
        let mut ctx = context_on(mainnet(), client, &[0x60, 0x80]);
        assert!(enricher.supports(&ctx));
        enricher.enrich(&mut ctx).await.unwrap();

        let contract = ctx.info.contract.as_ref().unwrap();
        let metadata = contract.metadata.as_ref().unwrap();
        assert!(metadata.verified);
        assert_eq!(metadata.contract_name.as_deref(), Some("FiatTokenProxy"));
        let deployment = contract.deployment.as_ref().unwrap();
        assert_eq!(deployment.block_number, Some(6_082_465));
        assert_eq!(deployment.tx_hash, Some(CREATION_TX));
    }

    #[tokio::test]
    async fn test_source_failure_keeps_creation() {
        let enricher = MetadataEnricher::new(Arc::new(StaticExplorer { fail_source: true }));
        let mut ctx = context_on(mainnet(), ScriptedClient::default(), &[0x60, 0x80]);
        enricher.enrich(&mut ctx).await.unwrap();

        let contract = ctx.info.contract.as_ref().unwrap();
        assert!(contract.metadata.is_none());
        let deployment = contract.deployment.as_ref().unwrap();
        assert_eq!(deployment.tx_hash, Some(CREATION_TX));
        // no receipt scripted
        assert_eq!(deployment.block_number, None);
    }

    #[test]
    fn test_requires_explorer() {
        let enricher = MetadataEnricher::new(Arc::new(StaticExplorer { fail_source: false }));
        // network without explorer
        let ctx = context(ScriptedClient::default(), &[0x60, 0x80]);
        assert!(!enricher.supports(&ctx));
    }
}
