//! USD price for fungible tokens

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::core::pipeline::{EnrichmentContext, Enricher};
use crate::models::errors::AppResult;
use crate::providers::prices::PriceOracle;

pub const PRICE_PRIORITY: u32 = 50;

pub struct PriceEnricher {
    oracle: Arc<dyn PriceOracle>,
}

impl PriceEnricher {
    pub fn new(oracle: Arc<dyn PriceOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl Enricher for PriceEnricher {
    fn name(&self) -> &'static str {
        "price"
    }

    fn priority(&self) -> u32 {
        PRICE_PRIORITY
    }

    fn supports(&self, ctx: &EnrichmentContext) -> bool {
        ctx.network.price_feed_key.is_some() && ctx.info.classification().is_some_and(|c| c.is_fungible())
    }

    async fn enrich(&self, ctx: &mut EnrichmentContext) -> AppResult<()> {
        let Some(feed_key) = ctx.network.price_feed_key.clone() else {
            return Ok(());
        };

        let Some(quote) = self.oracle.price(&feed_key, ctx.address, &ctx.cancel).await? else {
            return Ok(());
        };

        debug!("💲 {}:{} = ${}", feed_key, ctx.address, quote.price_usd);
        if let Some(token) = ctx.info.token.as_mut() {
            token.price_usd = Some(quote.price_usd);
            token.price_updated_at = quote.updated_at;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::enrichers::mock::{context, context_on, ScriptedClient};
    use crate::models::config::NetworkConfig;
    use crate::models::types::{Classification, TokenInfo, TokenStandard};
    use crate::providers::prices::{price_key, PriceQuote};
    use alloy_primitives::Address;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct FixedOracle {
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PriceOracle for FixedOracle {
        async fn price(&self, feed_key: &str, token: Address, _: &CancellationToken) -> AppResult<Option<PriceQuote>> {
            self.requested.lock().unwrap().push(price_key(feed_key, &token));
            Ok(Some(PriceQuote {
                price_usd: 3_000.5,
                updated_at: None,
            }))
        }
    }

    fn fungible_ctx(network: NetworkConfig) -> EnrichmentContext {
        let mut ctx = context_on(network, ScriptedClient::default(), &[0x60, 0x80]);
        ctx.info.set_classification(Classification::FungibleToken { confidence: 0.8 });
        ctx.info.token = Some(TokenInfo::new(TokenStandard::Erc20));
        ctx
    }

    #[tokio::test]
    async fn test_price_applied_to_token() {
        let oracle = Arc::new(FixedOracle::default());
        let enricher = PriceEnricher::new(oracle.clone());
        let mut ctx = fungible_ctx(NetworkConfig::preset(1).unwrap());

        assert!(enricher.supports(&ctx));
        enricher.enrich(&mut ctx).await.unwrap();

        assert_eq!(ctx.info.token.as_ref().unwrap().price_usd, Some(3_000.5));
        assert_eq!(
            *oracle.requested.lock().unwrap(),
            vec![price_key("ethereum", &ctx.address)]
        );
    }

    #[test]
    fn test_requires_feed_key_and_fungible() {
        let enricher = PriceEnricher::new(Arc::new(FixedOracle::default()));

        // no feed key on a custom network
        let ctx = fungible_ctx(NetworkConfig::new(1, "Ethereum", vec![]));
        assert!(!enricher.supports(&ctx));

        // not classified
        let ctx = context(ScriptedClient::default(), &[0x60, 0x80]);
        assert!(!enricher.supports(&ctx));

        let mut ctx = context_on(NetworkConfig::preset(1).unwrap(), ScriptedClient::default(), &[0x60, 0x80]);
        ctx.info.set_classification(Classification::NonFungibleToken { confidence: 0.9 });
        assert!(!enricher.supports(&ctx));
    }
}
