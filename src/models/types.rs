//! Type definitions for address resolution
//! All records produced by the resolver and its enrichers

use alloy_primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::models::config::NetworkConfig;
use crate::models::errors::{AppError, AppResult};

// ============================================
// ADDRESS
// ============================================

/// Parse user input into a canonical address.
///
/// Accepts `0x` followed by exactly 40 hex digits in any case. Checksums are
/// not enforced; everything else is rejected.
pub fn parse_address(input: &str) -> AppResult<Address> {
    let trimmed = input.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| AppError::invalid_address(format!("Missing 0x prefix: {}", trimmed)))?;

    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::invalid_address(format!("Not a 20-byte hex address: {}", trimmed)));
    }

    Address::from_str(hex_part).map_err(|e| AppError::invalid_address(e.to_string()))
}

/// Canonical text form: lowercase, `0x`-prefixed
pub fn canonical_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

// ============================================
// CLASSIFICATION
// ============================================

/// How a proxy stores its implementation pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyKind {
    /// Implementation address in the EIP-1967 implementation slot
    Eip1967,
    /// Beacon address in the EIP-1967 beacon slot
    Eip1967Beacon,
}

/// Contract classification, each variant with its own confidence in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Classification {
    FungibleToken {
        confidence: f64,
    },
    NonFungibleToken {
        confidence: f64,
    },
    MultiToken {
        confidence: f64,
    },
    VaultToken {
        confidence: f64,
        asset: Option<Address>,
    },
    Proxy {
        confidence: f64,
        kind: ProxyKind,
        implementation: Option<Address>,
    },
    Multisig {
        confidence: f64,
        threshold: Option<u64>,
        owner_count: Option<usize>,
    },
    Pool {
        confidence: f64,
        token0: Address,
        token1: Address,
    },
    Unknown {
        confidence: f64,
    },
}

impl Classification {
    pub fn confidence(&self) -> f64 {
        match self {
            Self::FungibleToken { confidence }
            | Self::NonFungibleToken { confidence }
            | Self::MultiToken { confidence }
            | Self::VaultToken { confidence, .. }
            | Self::Proxy { confidence, .. }
            | Self::Multisig { confidence, .. }
            | Self::Pool { confidence, .. }
            | Self::Unknown { confidence } => *confidence,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FungibleToken { .. } => "FungibleToken",
            Self::NonFungibleToken { .. } => "NonFungibleToken",
            Self::MultiToken { .. } => "MultiToken",
            Self::VaultToken { .. } => "VaultToken",
            Self::Proxy { .. } => "Proxy",
            Self::Multisig { .. } => "Multisig",
            Self::Pool { .. } => "Pool",
            Self::Unknown { .. } => "Unknown",
        }
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, Self::Proxy { .. })
    }

    /// Fungible in the price sense: ERC-20 and ERC-4626 shares
    pub fn is_fungible(&self) -> bool {
        matches!(self, Self::FungibleToken { .. } | Self::VaultToken { .. })
    }
}

/// Token standard detected on-chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStandard {
    Erc20,
    Erc721,
    Erc1155,
    Erc4626,
}

impl TokenStandard {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Erc20 => "erc20",
            Self::Erc721 => "erc721",
            Self::Erc1155 => "erc1155",
            Self::Erc4626 => "erc4626",
        }
    }
}

// ============================================
// SUB-RECORDS
// ============================================

/// Token fields, every one optional because every probe may fail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub standard: TokenStandard,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub total_supply: Option<U256>,
    /// ERC-4626 underlying asset
    pub asset: Option<Address>,
    pub total_assets: Option<U256>,
    pub price_usd: Option<f64>,
    pub price_updated_at: Option<DateTime<Utc>>,
}

impl TokenInfo {
    pub fn new(standard: TokenStandard) -> Self {
        Self {
            standard,
            name: None,
            symbol: None,
            decimals: None,
            total_supply: None,
            asset: None,
            total_assets: None,
            price_usd: None,
            price_updated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyInfo {
    pub kind: ProxyKind,
    pub implementation: Option<Address>,
    pub beacon: Option<Address>,
    pub admin: Option<Address>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub creator: Option<Address>,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
}

/// Explorer verification data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractMetadata {
    pub verified: bool,
    pub contract_name: Option<String>,
    pub abi: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractInfo {
    /// keccak-256 of the runtime bytecode
    pub bytecode_hash: Option<B256>,
    pub bytecode_size: usize,
    pub proxy: Option<ProxyInfo>,
    pub deployment: Option<DeploymentInfo>,
    pub classification: Option<Classification>,
    pub metadata: Option<ContractMetadata>,
}

/// Minimal view of `eth_getTransactionReceipt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub contract_address: Option<Address>,
    pub status: Option<bool>,
}

// ============================================
// PER-NETWORK RECORD
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    /// Externally owned account
    Eoa,
    Contract,
    Unknown,
}

/// Resolution output for one network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAccountInfo {
    pub chain_id: u64,
    pub network_name: String,
    pub kind: AccountKind,
    pub exists: bool,
    pub is_contract: bool,
    pub balance: Option<U256>,
    pub nonce: Option<u64>,
    pub contract: Option<ContractInfo>,
    pub token: Option<TokenInfo>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl NetworkAccountInfo {
    /// Initial record after a successful code probe
    pub fn from_code_probe(network: &NetworkConfig, code: &Bytes) -> Self {
        let is_contract = !code.is_empty();
        Self {
            chain_id: network.chain_id,
            network_name: network.name.clone(),
            kind: if is_contract { AccountKind::Contract } else { AccountKind::Eoa },
            exists: true,
            is_contract,
            balance: None,
            nonce: None,
            contract: None,
            token: None,
            labels: Vec::new(),
        }
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.contract.as_ref().and_then(|c| c.classification.as_ref())
    }

    pub fn is_proxy(&self) -> bool {
        self.classification().is_some_and(Classification::is_proxy)
    }

    /// Contract sub-record, created on first access
    pub fn contract_mut(&mut self) -> &mut ContractInfo {
        self.contract.get_or_insert_with(ContractInfo::default)
    }

    /// Set the classification unless a proxy classification is already present.
    /// Returns whether the value was written.
    pub fn set_classification(&mut self, classification: Classification) -> bool {
        if self.is_proxy() && !classification.is_proxy() {
            return false;
        }
        self.contract_mut().classification = Some(classification);
        true
    }

    pub fn add_label(&mut self, label: &str) {
        if !self.labels.iter().any(|l| l == label) {
            self.labels.push(label.to_string());
        }
    }
}

// ============================================
// TOP-LEVEL RESOLUTION
// ============================================

/// Depth of the pass that produced a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    /// Synchronous pass: existence, balances, classification
    Fast,
    /// Background pass added explorer metadata and prices
    Deep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub mode: ScanMode,
    /// Configuration order
    pub chains_attempted: Vec<u64>,
    pub chains_succeeded: Vec<u64>,
    /// Network id -> human-readable reason
    pub chains_failed: BTreeMap<u64, String>,
}

/// The cacheable artifact returned by the resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressResolution {
    pub address: Address,
    pub resolved_at: DateTime<Utc>,
    pub summary: ScanSummary,
    pub networks: BTreeMap<u64, NetworkAccountInfo>,
}

impl AddressResolution {
    /// A cached resolution must be refreshed if any network failed, or if a
    /// currently configured network is missing from it.
    pub fn is_stale<I>(&self, configured: I) -> bool
    where
        I: IntoIterator<Item = u64>,
    {
        if !self.summary.chains_failed.is_empty() {
            return true;
        }
        configured.into_iter().any(|id| !self.networks.contains_key(&id))
    }

    pub fn network(&self, chain_id: u64) -> Option<&NetworkAccountInfo> {
        self.networks.get(&chain_id)
    }

    /// One-line summary for logs
    pub fn summary_line(&self) -> String {
        let kinds: Vec<String> = self
            .networks
            .values()
            .map(|n| {
                let class = n.classification().map(Classification::as_str).unwrap_or("-");
                format!("{}:{:?}/{}", n.chain_id, n.kind, class)
            })
            .collect();
        format!(
            "{} | ok {}/{} | {}",
            canonical_address(&self.address),
            self.summary.chains_succeeded.len(),
            self.summary.chains_attempted.len(),
            kinds.join(" ")
        )
    }
}
