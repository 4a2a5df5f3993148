//! Price Feed Client
//!
//! DefiLlama-style current prices: `GET {base}/{feed}:{address}` returns
//! `{"coins": {"<feed>:<address>": {"price": .., "timestamp": ..}}}`.
//! No API key required. Quotes are cached for `price_ttl_secs`.

use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::config::HttpClientConfig;
use crate::models::errors::AppResult;
use crate::models::types::canonical_address;
use crate::providers::rate_limit::ThrottledClient;
use crate::utils::cache::TtlCache;

/// USD quote for a token
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceQuote {
    pub price_usd: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Token price source, used by the price enricher
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// `Ok(None)` when the token is unknown or the service misbehaves
    async fn price(&self, feed_key: &str, token: Address, cancel: &CancellationToken) -> AppResult<Option<PriceQuote>>;
}

#[derive(Debug, Deserialize)]
struct PricesResponse {
    #[serde(default)]
    coins: HashMap<String, CoinPrice>,
}

#[derive(Debug, Deserialize)]
struct CoinPrice {
    price: f64,
    #[serde(default)]
    timestamp: Option<i64>,
}

/// Cache key and path segment: `"{feed}:{address}"`
pub fn price_key(feed_key: &str, token: &Address) -> String {
    format!("{}:{}", feed_key, canonical_address(token))
}

pub struct PriceClient {
    base_url: String,
    client: ThrottledClient,
    cache: TtlCache<String, PriceQuote>,
}

impl PriceClient {
    pub fn new(base_url: impl Into<String>, http: &HttpClientConfig, ttl: Duration) -> AppResult<Self> {
        Ok(Self {
            base_url: base_url.into(),
            client: ThrottledClient::new("prices", http)?,
            cache: TtlCache::new(ttl),
        })
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl PriceOracle for PriceClient {
    async fn price(&self, feed_key: &str, token: Address, cancel: &CancellationToken) -> AppResult<Option<PriceQuote>> {
        let key = price_key(feed_key, &token);
        if let Some(quote) = self.cache.get(&key) {
            debug!("✅ PRICE CACHE HIT: {}", key);
            return Ok(Some(quote));
        }

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), key);
        let response: PricesResponse = match self.client.get_json(&url, &[], cancel).await {
            Ok(response) => response,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                debug!("💲 Price lookup {} failed: {}", key, e);
                return Ok(None);
            }
        };

        let quote = parse_quote(response, &key);
        match quote {
            Some(quote) => {
                self.cache.insert(key, quote);
                Ok(Some(quote))
            }
            None => {
                debug!("💲 No price for {}", key);
                Ok(None)
            }
        }
    }
}

fn parse_quote(mut response: PricesResponse, key: &str) -> Option<PriceQuote> {
    // the service echoes keys lowercase, but do not rely on it
    let coin = response.coins.remove(key).or_else(|| {
        let wanted = key.to_lowercase();
        let found = response.coins.keys().find(|k| k.to_lowercase() == wanted)?.clone();
        response.coins.remove(&found)
    })?;

    if !coin.price.is_finite() || coin.price < 0.0 {
        return None;
    }

    Some(PriceQuote {
        price_usd: coin.price,
        updated_at: coin.timestamp.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
    })
}
