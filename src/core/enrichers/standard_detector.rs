//! Token standard detection
//!
//! Order of checks:
//! 1. ERC-165 `supportsInterface` for ERC-721, then ERC-1155
//! 2. ERC-20 fields, upgraded to ERC-4626 when `asset` + `totalAssets` answer
//! 3. Nothing token-like: Uniswap-style pool, then Safe multisig
//!
//! Every probe is a safe call; a revert only means "field unknown".

use alloy_primitives::{Address, Bytes, FixedBytes, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use tracing::debug;

use crate::core::pipeline::{EnrichmentContext, Enricher};
use crate::models::errors::AppResult;
use crate::models::types::{canonical_address, Classification, TokenInfo, TokenStandard};
use crate::utils::constants::{ERC1155_INTERFACE_ID, ERC721_INTERFACE_ID};
use crate::utils::decoder::{
    assetCall, decimalsCall, decode_address_word, decode_string_candidates, encode_call,
    encode_supports_interface, getOwnersCall, getThresholdCall, nameCall, pick_string,
    supportsInterfaceCall, symbolCall, token0Call, token1Call, totalAssetsCall, totalSupplyCall,
    StringField,
};

pub const STANDARD_DETECTOR_PRIORITY: u32 = 30;

pub const NFT_CONFIDENCE: f64 = 0.9;
pub const FUNGIBLE_CONFIDENCE: f64 = 0.8;
pub const POOL_CONFIDENCE: f64 = 0.75;
pub const MULTISIG_CONFIDENCE: f64 = 0.85;
/// A contract none of the heuristics recognise
pub const UNKNOWN_CONFIDENCE: f64 = 0.0;

pub struct StandardDetectorEnricher;

// ============================================
// PROBES
// ============================================

async fn supports_interface(ctx: &EnrichmentContext, interface_id: FixedBytes<4>) -> AppResult<bool> {
    let data = ctx.safe_call(encode_supports_interface(interface_id)).await?;
    Ok(data
        .and_then(|d| supportsInterfaceCall::abi_decode_returns(&d, false).ok())
        .is_some_and(|r| r._0))
}

async fn read_string(ctx: &EnrichmentContext, data: Bytes, field: StringField) -> AppResult<Option<String>> {
    let raw = ctx.safe_call(data).await?;
    Ok(raw.and_then(|d| pick_string(decode_string_candidates(&d), field)))
}

async fn read_uint(ctx: &EnrichmentContext, data: Bytes) -> AppResult<Option<U256>> {
    let raw = ctx.safe_call(data).await?;
    // every uint256 getter shares the same return layout
    Ok(raw.and_then(|d| totalSupplyCall::abi_decode_returns(&d, false).ok()).map(|r| r._0))
}

async fn read_decimals(ctx: &EnrichmentContext) -> AppResult<Option<u8>> {
    let raw = ctx.safe_call(encode_call(&decimalsCall {})).await?;
    Ok(raw.and_then(|d| decimalsCall::abi_decode_returns(&d, false).ok()).map(|r| r._0))
}

async fn read_address(ctx: &EnrichmentContext, data: Bytes) -> AppResult<Option<Address>> {
    let raw = ctx.safe_call(data).await?;
    Ok(raw.and_then(|d| decode_address_word(&d)))
}

async fn read_owners(ctx: &EnrichmentContext) -> AppResult<Option<Vec<Address>>> {
    let raw = ctx.safe_call(encode_call(&getOwnersCall {})).await?;
    Ok(raw.and_then(|d| getOwnersCall::abi_decode_returns(&d, false).ok()).map(|r| r._0))
}

async fn read_name_symbol(ctx: &EnrichmentContext) -> AppResult<(Option<String>, Option<String>)> {
    let (name, symbol) = tokio::join!(
        read_string(ctx, encode_call(&nameCall {}), StringField::Name),
        read_string(ctx, encode_call(&symbolCall {}), StringField::Symbol),
    );
    Ok((name?, symbol?))
}

// ============================================
// DETECTORS
// ============================================

impl StandardDetectorEnricher {
    async fn detect_nft(ctx: &mut EnrichmentContext) -> AppResult<bool> {
        let (standard, classification) = if supports_interface(ctx, ERC721_INTERFACE_ID).await? {
            (TokenStandard::Erc721, Classification::NonFungibleToken { confidence: NFT_CONFIDENCE })
        } else if supports_interface(ctx, ERC1155_INTERFACE_ID).await? {
            (TokenStandard::Erc1155, Classification::MultiToken { confidence: NFT_CONFIDENCE })
        } else {
            return Ok(false);
        };

        let (name, symbol) = read_name_symbol(ctx).await?;
        let mut token = TokenInfo::new(standard);
        token.name = name;
        token.symbol = symbol;

        Self::apply(ctx, classification, Some(token), standard.label());
        Ok(true)
    }

    async fn detect_fungible(ctx: &mut EnrichmentContext) -> AppResult<bool> {
        let (name_symbol, decimals, supply, asset, total_assets) = tokio::join!(
            read_name_symbol(ctx),
            read_decimals(ctx),
            read_uint(ctx, encode_call(&totalSupplyCall {})),
            read_address(ctx, encode_call(&assetCall {})),
            read_uint(ctx, encode_call(&totalAssetsCall {})),
        );
        let (name, symbol) = name_symbol?;
        let (decimals, supply, asset, total_assets) = (decimals?, supply?, asset?, total_assets?);

        if name.is_none() && symbol.is_none() && decimals.is_none() && supply.is_none() {
            return Ok(false);
        }

        let is_vault = asset.is_some() && total_assets.is_some();
        let standard = if is_vault { TokenStandard::Erc4626 } else { TokenStandard::Erc20 };

        let mut token = TokenInfo::new(standard);
        token.name = name;
        token.symbol = symbol;
        token.decimals = decimals;
        token.total_supply = supply;
        if is_vault {
            token.asset = asset;
            token.total_assets = total_assets;
        }

        let classification = if is_vault {
            Classification::VaultToken {
                confidence: FUNGIBLE_CONFIDENCE,
                asset,
            }
        } else {
            Classification::FungibleToken {
                confidence: FUNGIBLE_CONFIDENCE,
            }
        };

        Self::apply(ctx, classification, Some(token), standard.label());
        Ok(true)
    }

    async fn detect_pool(ctx: &mut EnrichmentContext) -> AppResult<bool> {
        let (token0, token1) = tokio::join!(
            read_address(ctx, encode_call(&token0Call {})),
            read_address(ctx, encode_call(&token1Call {})),
        );
        let (Some(token0), Some(token1)) = (token0?, token1?) else {
            return Ok(false);
        };

        let classification = Classification::Pool {
            confidence: POOL_CONFIDENCE,
            token0,
            token1,
        };
        Self::apply(ctx, classification, None, "pool");
        Ok(true)
    }

    async fn detect_multisig(ctx: &mut EnrichmentContext) -> AppResult<bool> {
        let (threshold, owners) = tokio::join!(
            read_uint(ctx, encode_call(&getThresholdCall {})),
            read_owners(ctx),
        );
        let (Some(threshold), Some(owners)) = (threshold?, owners?) else {
            return Ok(false);
        };

        let classification = Classification::Multisig {
            confidence: MULTISIG_CONFIDENCE,
            threshold: u64::try_from(threshold).ok(),
            owner_count: Some(owners.len()),
        };
        Self::apply(ctx, classification, None, "multisig");
        Ok(true)
    }

    fn apply(ctx: &mut EnrichmentContext, classification: Classification, token: Option<TokenInfo>, label: &str) {
        debug!(
            "🏷️ {} on chain {}: {} ({:.2})",
            canonical_address(&ctx.address),
            ctx.chain_id(),
            classification.as_str(),
            classification.confidence()
        );
        if ctx.info.set_classification(classification) {
            if token.is_some() {
                ctx.info.token = token;
            }
            ctx.info.add_label(label);
        }
    }
}

#[async_trait]
impl Enricher for StandardDetectorEnricher {
    fn name(&self) -> &'static str {
        "standard-detector"
    }

    fn priority(&self) -> u32 {
        STANDARD_DETECTOR_PRIORITY
    }

    fn supports(&self, ctx: &EnrichmentContext) -> bool {
        ctx.info.is_contract && !ctx.info.is_proxy()
    }

    async fn enrich(&self, ctx: &mut EnrichmentContext) -> AppResult<()> {
        // a proxy may have been detected after `supports` was evaluated
        if ctx.info.is_proxy() {
            return Ok(());
        }

        if Self::detect_nft(ctx).await?
            || Self::detect_fungible(ctx).await?
            || Self::detect_pool(ctx).await?
            || Self::detect_multisig(ctx).await?
        {
            return Ok(());
        }

        ctx.info.set_classification(Classification::Unknown {
            confidence: UNKNOWN_CONFIDENCE,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::enrichers::mock::{address_word, context, string_ret, uint_word, ScriptedClient};
    use crate::models::types::ProxyKind;
    use alloy_primitives::address;

    const CODE: &[u8] = &[0x60, 0x80];
    const WETH: Address = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
    const USDC: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");

    fn bytes32(text: &str) -> Bytes {
        let mut word = [0u8; 32];
        word[..text.len()].copy_from_slice(text.as_bytes());
        Bytes::copy_from_slice(&word)
    }

    fn erc20(client: &mut ScriptedClient) {
        client
            .respond(encode_call(&nameCall {}), string_ret("Wrapped Ether"))
            .respond(encode_call(&symbolCall {}), string_ret("WETH"))
            .respond(encode_call(&decimalsCall {}), uint_word(18))
            .respond(encode_call(&totalSupplyCall {}), uint_word(1_000_000));
    }

    #[tokio::test]
    async fn test_erc721_detected() {
        let mut client = ScriptedClient::default();
        client
            .respond(encode_supports_interface(ERC721_INTERFACE_ID), uint_word(1))
            .respond(encode_call(&nameCall {}), string_ret("BoredApeYachtClub"))
            .respond(encode_call(&symbolCall {}), string_ret("BAYC"));

        let mut ctx = context(client, CODE);
        StandardDetectorEnricher.enrich(&mut ctx).await.unwrap();

        assert_eq!(
            ctx.info.classification(),
            Some(&Classification::NonFungibleToken { confidence: NFT_CONFIDENCE })
        );
        let token = ctx.info.token.as_ref().unwrap();
        assert_eq!(token.standard, TokenStandard::Erc721);
        assert_eq!(token.name.as_deref(), Some("BoredApeYachtClub"));
        assert_eq!(token.symbol.as_deref(), Some("BAYC"));
        assert_eq!(ctx.info.labels, vec!["erc721".to_string()]);
    }

    #[tokio::test]
    async fn test_erc1155_detected() {
        let mut client = ScriptedClient::default();
        client
            .respond(encode_supports_interface(ERC721_INTERFACE_ID), uint_word(0))
            .respond(encode_supports_interface(ERC1155_INTERFACE_ID), uint_word(1));

        let mut ctx = context(client, CODE);
        StandardDetectorEnricher.enrich(&mut ctx).await.unwrap();

        assert_eq!(ctx.info.classification().map(Classification::as_str), Some("MultiToken"));
        let token = ctx.info.token.as_ref().unwrap();
        assert_eq!(token.standard, TokenStandard::Erc1155);
        assert_eq!(token.name, None);
    }

    #[tokio::test]
    async fn test_erc20_detected() {
        let mut client = ScriptedClient::default();
        erc20(&mut client);

        let mut ctx = context(client, CODE);
        StandardDetectorEnricher.enrich(&mut ctx).await.unwrap();

        assert_eq!(
            ctx.info.classification(),
            Some(&Classification::FungibleToken { confidence: FUNGIBLE_CONFIDENCE })
        );
        let token = ctx.info.token.as_ref().unwrap();
        assert_eq!(token.symbol.as_deref(), Some("WETH"));
        assert_eq!(token.decimals, Some(18));
        assert_eq!(token.total_supply, Some(U256::from(1_000_000u64)));
        assert_eq!(ctx.info.labels, vec!["erc20".to_string()]);
    }

    #[tokio::test]
    async fn test_bytes32_symbol() {
        let mut client = ScriptedClient::default();
        client
            .respond(encode_call(&nameCall {}), bytes32("Maker"))
            .respond(encode_call(&symbolCall {}), bytes32("MKR"));

        let mut ctx = context(client, CODE);
        StandardDetectorEnricher.enrich(&mut ctx).await.unwrap();

        let token = ctx.info.token.as_ref().unwrap();
        assert_eq!(token.name.as_deref(), Some("Maker"));
        assert_eq!(token.symbol.as_deref(), Some("MKR"));
        assert_eq!(token.decimals, None);
    }

    #[tokio::test]
    async fn test_vault_upgrade() {
        let mut client = ScriptedClient::default();
        erc20(&mut client);
        client
            .respond(encode_call(&assetCall {}), address_word(USDC))
            .respond(encode_call(&totalAssetsCall {}), uint_word(42));

        let mut ctx = context(client, CODE);
        StandardDetectorEnricher.enrich(&mut ctx).await.unwrap();

        assert_eq!(
            ctx.info.classification(),
            Some(&Classification::VaultToken {
                confidence: FUNGIBLE_CONFIDENCE,
                asset: Some(USDC),
            })
        );
        let token = ctx.info.token.as_ref().unwrap();
        assert_eq!(token.standard, TokenStandard::Erc4626);
        assert_eq!(token.total_assets, Some(U256::from(42u64)));
        assert_eq!(ctx.info.labels, vec!["erc4626".to_string()]);
    }

    #[tokio::test]
    async fn test_pool_detected() {
        let mut client = ScriptedClient::default();
        client
            .respond(encode_call(&token0Call {}), address_word(USDC))
            .respond(encode_call(&token1Call {}), address_word(WETH));

        let mut ctx = context(client, CODE);
        StandardDetectorEnricher.enrich(&mut ctx).await.unwrap();

        assert_eq!(
            ctx.info.classification(),
            Some(&Classification::Pool {
                confidence: POOL_CONFIDENCE,
                token0: USDC,
                token1: WETH,
            })
        );
        assert!(ctx.info.token.is_none());
    }

    #[tokio::test]
    async fn test_multisig_detected() {
        let owners = vec![USDC, WETH, Address::repeat_byte(0x01)];
        let mut client = ScriptedClient::default();
        client
            .respond(encode_call(&getThresholdCall {}), uint_word(2))
            .respond(
                encode_call(&getOwnersCall {}),
                Bytes::from(getOwnersCall::abi_encode_returns(&(owners,))),
            );

        let mut ctx = context(client, CODE);
        StandardDetectorEnricher.enrich(&mut ctx).await.unwrap();

        assert_eq!(
            ctx.info.classification(),
            Some(&Classification::Multisig {
                confidence: MULTISIG_CONFIDENCE,
                threshold: Some(2),
                owner_count: Some(3),
            })
        );
        assert_eq!(ctx.info.labels, vec!["multisig".to_string()]);
    }

    #[tokio::test]
    async fn test_unrecognised_contract() {
        let mut ctx = context(ScriptedClient::default(), CODE);
        StandardDetectorEnricher.enrich(&mut ctx).await.unwrap();
        assert_eq!(
            ctx.info.classification(),
            Some(&Classification::Unknown { confidence: UNKNOWN_CONFIDENCE })
        );
        assert!(ctx.info.token.is_none());
    }

    #[tokio::test]
    async fn test_proxy_classification_kept() {
        let mut client = ScriptedClient::default();
        erc20(&mut client);

        let mut ctx = context(client, CODE);
        let proxy = Classification::Proxy {
            confidence: 0.7,
            kind: ProxyKind::Eip1967,
            implementation: Some(USDC),
        };
        ctx.info.set_classification(proxy.clone());

        assert!(!StandardDetectorEnricher.supports(&ctx));
        // enrich re-checks even when called directly
        StandardDetectorEnricher.enrich(&mut ctx).await.unwrap();
        assert_eq!(ctx.info.classification(), Some(&proxy));
        assert!(ctx.info.token.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let mut client = ScriptedClient::default();
        erc20(&mut client);
        let mut ctx = context(client, CODE);
        ctx.cancel.cancel();

        let err = StandardDetectorEnricher.enrich(&mut ctx).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
