//! Explorer API Client - contract verification & deployment lookup
//!
//! Etherscan-compatible endpoints (`module=contract`):
//! - `getsourcecode`: verified flag, contract name, ABI
//! - `getcontractcreation`: creator address and creation tx
//!
//! Lookups are best effort: any failure other than cancellation is `Ok(None)`.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::config::{ExplorerConfig, HttpClientConfig};
use crate::models::errors::AppResult;
use crate::models::types::{canonical_address, ContractMetadata, DeploymentInfo};
use crate::providers::rate_limit::{build_http_client, ThrottledClient};

/// ABI placeholder Etherscan returns for unverified contracts
const UNVERIFIED_ABI: &str = "Contract source code not verified";

/// Contract verification source, used by the metadata enricher
#[async_trait]
pub trait ContractExplorer: Send + Sync {
    async fn source_code(
        &self,
        explorer: &ExplorerConfig,
        address: Address,
        cancel: &CancellationToken,
    ) -> AppResult<Option<ContractMetadata>>;

    async fn contract_creation(
        &self,
        explorer: &ExplorerConfig,
        address: Address,
        cancel: &CancellationToken,
    ) -> AppResult<Option<DeploymentInfo>>;
}

// ============================================
// WIRE TYPES
// ============================================

/// Etherscan envelope; `result` is an error string when `status` is "0"
#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SourceCodeEntry {
    #[serde(default)]
    source_code: String,
    #[serde(rename = "ABI", default)]
    abi: String,
    #[serde(default)]
    contract_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreationEntry {
    contract_creator: String,
    tx_hash: String,
}

// ============================================
// CLIENT
// ============================================

/// Explorer client with one throttled client per API host
pub struct ExplorerClient {
    config: HttpClientConfig,
    http: reqwest::Client,
    clients: DashMap<String, Arc<ThrottledClient>>,
}

impl ExplorerClient {
    pub fn new(config: HttpClientConfig) -> AppResult<Self> {
        Ok(Self {
            http: build_http_client(&config)?,
            config,
            clients: DashMap::new(),
        })
    }

    fn client_for(&self, explorer: &ExplorerConfig) -> Arc<ThrottledClient> {
        self.clients
            .entry(explorer.api_url.clone())
            .or_insert_with(|| {
                let name = format!("explorer:{}", explorer.name);
                Arc::new(ThrottledClient::with_http(name, self.http.clone(), &self.config))
            })
            .clone()
    }

    async fn query(
        &self,
        explorer: &ExplorerConfig,
        action: &str,
        address_param: &str,
        address: Address,
        cancel: &CancellationToken,
    ) -> AppResult<Option<serde_json::Value>> {
        let client = self.client_for(explorer);
        let address = canonical_address(&address);
        let mut query = vec![("module", "contract"), ("action", action), (address_param, address.as_str())];
        if let Some(key) = explorer.api_key.as_deref() {
            query.push(("apikey", key));
        }

        let response: ExplorerResponse = match soften(
            client.get_json(&explorer.api_url, &query, cancel).await,
            client.name(),
            action,
        )? {
            Some(response) => response,
            None => return Ok(None),
        };

        if response.status != "1" {
            debug!(
                "🔍 {} {} for {}: {} ({})",
                client.name(),
                action,
                address,
                response.message,
                response.result
            );
            return Ok(None);
        }

        Ok(Some(response.result))
    }
}

#[async_trait]
impl ContractExplorer for ExplorerClient {
    async fn source_code(
        &self,
        explorer: &ExplorerConfig,
        address: Address,
        cancel: &CancellationToken,
    ) -> AppResult<Option<ContractMetadata>> {
        let result = self.query(explorer, "getsourcecode", "address", address, cancel).await?;
        Ok(result.and_then(|value| parse_source_code(value, explorer, &address)))
    }

    async fn contract_creation(
        &self,
        explorer: &ExplorerConfig,
        address: Address,
        cancel: &CancellationToken,
    ) -> AppResult<Option<DeploymentInfo>> {
        let result = self
            .query(explorer, "getcontractcreation", "contractaddresses", address, cancel)
            .await?;
        Ok(result.and_then(parse_contract_creation))
    }
}

/// Swallow everything except cancellation
fn soften<T>(result: AppResult<T>, client: &str, action: &str) -> AppResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_cancelled() => Err(e),
        Err(e) => {
            debug!("🔍 {} {} failed: {}", client, action, e);
            Ok(None)
        }
    }
}

fn parse_source_code(result: serde_json::Value, explorer: &ExplorerConfig, address: &Address) -> Option<ContractMetadata> {
    let entries: Vec<SourceCodeEntry> = serde_json::from_value(result).ok()?;
    let entry = entries.into_iter().next()?;

    let verified = !entry.source_code.is_empty() && entry.abi != UNVERIFIED_ABI;
    if !verified {
        return Some(ContractMetadata::default());
    }

    Some(ContractMetadata {
        verified: true,
        contract_name: (!entry.contract_name.is_empty()).then_some(entry.contract_name),
        abi: (!entry.abi.is_empty()).then_some(entry.abi),
        source_url: Some(explorer.source_link(&canonical_address(address))),
    })
}

fn parse_contract_creation(result: serde_json::Value) -> Option<DeploymentInfo> {
    let entries: Vec<CreationEntry> = serde_json::from_value(result).ok()?;
    let entry = entries.into_iter().next()?;

    Some(DeploymentInfo {
        creator: Address::from_str(&entry.contract_creator).ok(),
        tx_hash: B256::from_str(&entry.tx_hash).ok(),
        block_number: None,
    })
}
