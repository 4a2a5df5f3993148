//! Balance and nonce for user accounts

use async_trait::async_trait;

use crate::core::pipeline::{recover, EnrichmentContext, Enricher};
use crate::models::errors::AppResult;

pub const ACCOUNT_BASICS_PRIORITY: u32 = 10;

pub struct AccountBasicsEnricher;

#[async_trait]
impl Enricher for AccountBasicsEnricher {
    fn name(&self) -> &'static str {
        "account-basics"
    }

    fn priority(&self) -> u32 {
        ACCOUNT_BASICS_PRIORITY
    }

    fn supports(&self, ctx: &EnrichmentContext) -> bool {
        !ctx.info.is_contract
    }

    async fn enrich(&self, ctx: &mut EnrichmentContext) -> AppResult<()> {
        // independent reads: either may fail without losing the other
        let (balance, nonce) = tokio::join!(
            ctx.client.get_balance(ctx.address, &ctx.cancel),
            ctx.client.get_transaction_count(ctx.address, &ctx.cancel),
        );

        ctx.info.balance = recover(balance, "balance")?;
        ctx.info.nonce = recover(nonce, "nonce")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::enrichers::mock::{context, ScriptedClient};
    use alloy_primitives::U256;

    #[tokio::test]
    async fn test_eoa_balance_and_nonce() {
        let client = ScriptedClient {
            balance: Some(U256::from(1_000u64)),
            nonce: Some(7),
            ..Default::default()
        };
        let mut ctx = context(client, &[]);
        let enricher = AccountBasicsEnricher;

        assert!(enricher.supports(&ctx));
        enricher.enrich(&mut ctx).await.unwrap();
        assert_eq!(ctx.info.balance, Some(U256::from(1_000u64)));
        assert_eq!(ctx.info.nonce, Some(7));
    }

    #[tokio::test]
    async fn test_fields_fail_independently() {
        let client = ScriptedClient {
            balance: None,
            nonce: Some(3),
            ..Default::default()
        };
        let mut ctx = context(client, &[]);
        AccountBasicsEnricher.enrich(&mut ctx).await.unwrap();
        assert_eq!(ctx.info.balance, None);
        assert_eq!(ctx.info.nonce, Some(3));
    }

    #[test]
    fn test_skips_contracts() {
        let ctx = context(ScriptedClient::default(), &[0x60, 0x80]);
        assert!(!AccountBasicsEnricher.supports(&ctx));
    }
}
