//! RPC Client Module - per-endpoint JSON-RPC access
//!
//! - `EndpointClient`: the read-only surface the resolver and enrichers use
//! - `RpcProvider`: JSON-RPC over HTTP, one per (network, endpoint url)
//! - `EndpointConnector`: hands out clients; `RpcConnector` caches them so the
//!   token bucket and circuit breaker of an endpoint survive across resolves
//!
//! Failover across endpoints is not done here: a failing call is reported to
//! the caller, which records it in the `EndpointPool` and moves on.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::config::{HttpClientConfig, NetworkConfig};
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{canonical_address, TransactionReceipt};
use crate::providers::rate_limit::{build_http_client, ThrottledClient};
use crate::utils::constants::RPC_RATE_LIMIT_CODE;

// ============================================
// CLIENT CONTRACT
// ============================================

/// Read-only on-chain access through a single endpoint.
/// Every call honours `cancel`.
#[async_trait]
pub trait EndpointClient: Send + Sync {
    /// Endpoint URL (used as the health-record key)
    fn url(&self) -> &str;

    /// Existence/code probe (`eth_getCode`); empty bytes for an EOA
    async fn get_code(&self, address: Address, cancel: &CancellationToken) -> AppResult<Bytes>;

    async fn get_balance(&self, address: Address, cancel: &CancellationToken) -> AppResult<U256>;

    async fn get_transaction_count(&self, address: Address, cancel: &CancellationToken) -> AppResult<u64>;

    /// `eth_call` at latest block
    async fn call(&self, to: Address, data: Bytes, cancel: &CancellationToken) -> AppResult<Bytes>;

    async fn get_storage_at(&self, address: Address, slot: B256, cancel: &CancellationToken) -> AppResult<B256>;

    async fn get_transaction_receipt(
        &self,
        tx_hash: B256,
        cancel: &CancellationToken,
    ) -> AppResult<Option<TransactionReceipt>>;
}

/// Produces endpoint clients for a network
pub trait EndpointConnector: Send + Sync {
    fn connect(&self, network: &NetworkConfig, url: &str) -> AppResult<Arc<dyn EndpointClient>>;
}

// ============================================
// JSON-RPC WIRE TYPES
// ============================================

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// JSON-RPC error structure
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// Check if this is a rate limit error (code -32005 or "rate limit" message)
    pub fn is_rate_limit(&self) -> bool {
        self.code == RPC_RATE_LIMIT_CODE || self.message.to_lowercase().contains("rate limit")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    block_number: Option<String>,
    contract_address: Option<Address>,
    status: Option<String>,
}

// ============================================
// RPC PROVIDER
// ============================================

/// JSON-RPC client bound to one endpoint URL
pub struct RpcProvider {
    url: String,
    chain_id: u64,
    client: ThrottledClient,
    next_id: AtomicU64,
}

impl RpcProvider {
    pub fn new(chain_id: u64, url: impl Into<String>, client: ThrottledClient) -> Self {
        Self {
            url: url.into(),
            chain_id,
            client,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Get RPC URL (masked for logging)
    pub fn masked_url(&self) -> String {
        mask_url(&self.url)
    }

    /// Execute a single JSON-RPC call
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
        cancel: &CancellationToken,
    ) -> AppResult<Option<T>> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let response: RpcResponse<T> = self.client.post_json(&self.url, &payload, cancel).await?;

        if let Some(error) = response.error {
            if error.is_rate_limit() {
                self.client.trip_circuit();
                return Err(AppError::rpc_rate_limited());
            }
            debug!("RPC error on {} {}: {} ({})", self.masked_url(), method, error.message, error.code);
            return Err(AppError::rpc_error(format!(
                "RPC error: {} (code: {})",
                error.message, error.code
            )));
        }

        Ok(response.result)
    }

    async fn request_required<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
        cancel: &CancellationToken,
    ) -> AppResult<T> {
        self.request(method, params, cancel)
            .await?
            .ok_or_else(|| AppError::invalid_response(format!("No result in {} response", method)))
    }
}

#[async_trait]
impl EndpointClient for RpcProvider {
    fn url(&self) -> &str {
        &self.url
    }

    async fn get_code(&self, address: Address, cancel: &CancellationToken) -> AppResult<Bytes> {
        let params = serde_json::json!([canonical_address(&address), "latest"]);
        let hex: String = self.request_required("eth_getCode", params, cancel).await?;
        parse_bytes(&hex)
    }

    async fn get_balance(&self, address: Address, cancel: &CancellationToken) -> AppResult<U256> {
        let params = serde_json::json!([canonical_address(&address), "latest"]);
        let hex: String = self.request_required("eth_getBalance", params, cancel).await?;
        parse_quantity(&hex)
    }

    async fn get_transaction_count(&self, address: Address, cancel: &CancellationToken) -> AppResult<u64> {
        let params = serde_json::json!([canonical_address(&address), "latest"]);
        let hex: String = self.request_required("eth_getTransactionCount", params, cancel).await?;
        parse_u64(&hex)
    }

    async fn call(&self, to: Address, data: Bytes, cancel: &CancellationToken) -> AppResult<Bytes> {
        let params = serde_json::json!([
            { "to": canonical_address(&to), "data": data.to_string() },
            "latest"
        ]);
        let hex: String = self.request_required("eth_call", params, cancel).await?;
        parse_bytes(&hex)
    }

    async fn get_storage_at(&self, address: Address, slot: B256, cancel: &CancellationToken) -> AppResult<B256> {
        let params = serde_json::json!([canonical_address(&address), slot.to_string(), "latest"]);
        let hex: String = self.request_required("eth_getStorageAt", params, cancel).await?;
        let bytes = parse_bytes(&hex)?;
        if bytes.len() > 32 {
            return Err(AppError::invalid_response("Storage word longer than 32 bytes"));
        }
        Ok(B256::left_padding_from(&bytes))
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: B256,
        cancel: &CancellationToken,
    ) -> AppResult<Option<TransactionReceipt>> {
        let params = serde_json::json!([tx_hash.to_string()]);
        let raw: Option<RawReceipt> = self.request("eth_getTransactionReceipt", params, cancel).await?;

        raw.map(|r| {
            Ok(TransactionReceipt {
                transaction_hash: r.transaction_hash,
                block_number: r.block_number.as_deref().map(parse_u64).transpose()?,
                contract_address: r.contract_address,
                status: r.status.as_deref().map(|s| parse_u64(s).map(|v| v == 1)).transpose()?,
            })
        })
        .transpose()
    }
}

// ============================================
// CONNECTOR
// ============================================

/// Builds and caches one `RpcProvider` per (chain id, url)
pub struct RpcConnector {
    config: HttpClientConfig,
    http: reqwest::Client,
    providers: DashMap<(u64, String), Arc<RpcProvider>>,
}

impl RpcConnector {
    pub fn new(config: HttpClientConfig) -> AppResult<Self> {
        // connection pool shared by every endpoint; limits stay per endpoint
        Ok(Self {
            http: build_http_client(&config)?,
            config,
            providers: DashMap::new(),
        })
    }
}

impl EndpointConnector for RpcConnector {
    fn connect(&self, network: &NetworkConfig, url: &str) -> AppResult<Arc<dyn EndpointClient>> {
        let key = (network.chain_id, url.to_string());
        let provider = self
            .providers
            .entry(key)
            .or_insert_with(|| {
                let name = format!("rpc:{}:{}", network.chain_id, mask_url(url));
                let client = ThrottledClient::with_http(name, self.http.clone(), &self.config);
                Arc::new(RpcProvider::new(network.chain_id, url, client))
            })
            .clone();
        Ok(provider)
    }
}

// ============================================
// HEX HELPERS
// ============================================

/// Hide API keys embedded in endpoint URLs (`/v2/<key>`, `?apikey=`)
pub fn mask_url(url: &str) -> String {
    if let Some((base, _)) = url.split_once("/v2/") {
        return format!("{}/v2/***HIDDEN***", base);
    }
    if let Some((base, _)) = url.split_once('?') {
        return format!("{}?***", base);
    }
    url.to_string()
}

fn parse_bytes(hex: &str) -> AppResult<Bytes> {
    Bytes::from_str(hex).map_err(|e| AppError::invalid_response(format!("Bad hex data: {}", e)))
}

fn parse_quantity(hex: &str) -> AppResult<U256> {
    let digits = hex.strip_prefix("0x").unwrap_or(hex);
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16).map_err(|e| AppError::invalid_response(format!("Bad quantity {}: {}", hex, e)))
}

fn parse_u64(hex: &str) -> AppResult<u64> {
    let digits = hex.strip_prefix("0x").unwrap_or(hex);
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16).map_err(|e| AppError::invalid_response(format!("Bad quantity {}: {}", hex, e)))
}
