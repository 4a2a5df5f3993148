//! Bytecode fingerprint and EIP-1967 proxy detection

use alloy_primitives::{keccak256, Address, B256};
use async_trait::async_trait;
use tracing::debug;

use crate::core::pipeline::{recover, EnrichmentContext, Enricher};
use crate::models::errors::AppResult;
use crate::models::types::{canonical_address, Classification, ProxyInfo, ProxyKind};
use crate::utils::constants::{EIP1967_ADMIN_SLOT, EIP1967_BEACON_SLOT, EIP1967_IMPLEMENTATION_SLOT};
use crate::utils::decoder::{decode_address_word, encode_call, implementationCall, word_to_address};

pub const CONTRACT_BASICS_PRIORITY: u32 = 20;

/// Slot-based detection only proves the layout, not the behaviour
pub const PROXY_CONFIDENCE: f64 = 0.7;

pub struct ContractBasicsEnricher;

impl ContractBasicsEnricher {
    async fn read_address_slot(ctx: &EnrichmentContext, slot: B256) -> AppResult<Option<Address>> {
        let word = ctx.client.get_storage_at(ctx.address, slot, &ctx.cancel).await;
        Ok(recover(word, "storage slot")?.and_then(|w| word_to_address(&w)))
    }

    async fn detect_proxy(ctx: &EnrichmentContext) -> AppResult<Option<ProxyInfo>> {
        if let Some(implementation) = Self::read_address_slot(ctx, EIP1967_IMPLEMENTATION_SLOT).await? {
            return Ok(Some(ProxyInfo {
                kind: ProxyKind::Eip1967,
                implementation: Some(implementation),
                beacon: None,
                admin: None,
            }));
        }

        let Some(beacon) = Self::read_address_slot(ctx, EIP1967_BEACON_SLOT).await? else {
            return Ok(None);
        };

        // beacon proxies delegate to whatever the beacon reports
        let implementation = ctx
            .safe_call_to(beacon, encode_call(&implementationCall {}))
            .await?
            .and_then(|data| decode_address_word(&data));

        Ok(Some(ProxyInfo {
            kind: ProxyKind::Eip1967Beacon,
            implementation,
            beacon: Some(beacon),
            admin: None,
        }))
    }
}

#[async_trait]
impl Enricher for ContractBasicsEnricher {
    fn name(&self) -> &'static str {
        "contract-basics"
    }

    fn priority(&self) -> u32 {
        CONTRACT_BASICS_PRIORITY
    }

    fn supports(&self, ctx: &EnrichmentContext) -> bool {
        ctx.info.is_contract
    }

    async fn enrich(&self, ctx: &mut EnrichmentContext) -> AppResult<()> {
        let bytecode_hash = keccak256(&ctx.code);
        let bytecode_size = ctx.code.len();
        {
            let contract = ctx.info.contract_mut();
            contract.bytecode_hash = Some(bytecode_hash);
            contract.bytecode_size = bytecode_size;
        }

        let Some(mut proxy) = Self::detect_proxy(ctx).await? else {
            return Ok(());
        };
        proxy.admin = Self::read_address_slot(ctx, EIP1967_ADMIN_SLOT).await?;

        debug!(
            "🪞 Proxy {} on chain {}: {:?} -> {}",
            canonical_address(&ctx.address),
            ctx.chain_id(),
            proxy.kind,
            proxy.implementation.as_ref().map(canonical_address).unwrap_or_else(|| "?".to_string())
        );

        ctx.info.set_classification(Classification::Proxy {
            confidence: PROXY_CONFIDENCE,
            kind: proxy.kind,
            implementation: proxy.implementation,
        });
        ctx.info.contract_mut().proxy = Some(proxy);
        ctx.info.add_label("proxy");
        Ok(())
    }
}
