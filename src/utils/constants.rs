//! Constants Module - Single Source of Truth
//!
//! Chain presets, canonical storage slots and interface ids used across the
//! resolver. No other module hardcodes chain ids, URLs or magic numbers.

use alloy_primitives::{b256, fixed_bytes, FixedBytes, B256};

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// User-Agent for outbound HTTP requests
pub const USER_AGENT: &str = concat!("chainscope/", env!("CARGO_PKG_VERSION"));

// ============================================
// HTTP / RPC DEFAULTS
// ============================================

/// Default timeout for a single HTTP request (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Default price cache TTL (seconds)
pub const DEFAULT_PRICE_TTL_SECS: u64 = 300;

/// TTL caches drop expired entries once per this many inserts
pub const TTL_CACHE_SWEEP_EVERY: u64 = 64;

/// Default endpoint cooldown base (milliseconds)
pub const DEFAULT_COOLDOWN_BASE_MS: u64 = 1_000;

/// Cooldown exponent cap: cooldown never exceeds base * 2^6 = 64x base
pub const MAX_COOLDOWN_EXPONENT: u32 = 6;

/// Cumulative failures before an endpoint is disabled for good
pub const DEFAULT_MAX_FAILURES_BEFORE_DISABLE: u32 = 5;

/// EWMA smoothing factor for endpoint latency
pub const LATENCY_EWMA_ALPHA: f64 = 0.2;

/// Token bucket defaults: 10 requests per second per client
pub const DEFAULT_REQUESTS_PER_WINDOW: u32 = 10;
pub const DEFAULT_RATE_WINDOW_MS: u64 = 1_000;

/// Circuit breaker cooldown after an overload response (milliseconds)
pub const DEFAULT_OVERLOAD_COOLDOWN_MS: u64 = 30_000;

/// Upper bound on token bucket wait iterations
pub const MAX_ACQUIRE_ITERATIONS: u32 = 10_000;

/// JSON-RPC error code used by several providers for throttling
pub const RPC_RATE_LIMIT_CODE: i64 = -32005;

// ============================================
// EVM CANONICAL SLOTS & INTERFACE IDS
// ============================================

/// EIP-1967 implementation slot: bytes32(uint256(keccak256("eip1967.proxy.implementation")) - 1)
pub const EIP1967_IMPLEMENTATION_SLOT: B256 =
    b256!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// EIP-1967 beacon slot: bytes32(uint256(keccak256("eip1967.proxy.beacon")) - 1)
pub const EIP1967_BEACON_SLOT: B256 =
    b256!("a3f0ad74e5423aebfd80d3ef4346578335a9a72aeaee59ff6cb3582b35133d50");

/// EIP-1967 admin slot: bytes32(uint256(keccak256("eip1967.proxy.admin")) - 1)
pub const EIP1967_ADMIN_SLOT: B256 =
    b256!("b53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");

/// ERC-721 interface id
pub const ERC721_INTERFACE_ID: FixedBytes<4> = fixed_bytes!("80ac58cd");

/// ERC-1155 interface id
pub const ERC1155_INTERFACE_ID: FixedBytes<4> = fixed_bytes!("d9b67a26");

// ============================================
// CHAIN IDS
// ============================================

/// Ethereum Mainnet
pub const CHAIN_ID_ETHEREUM: u64 = 1;
/// BNB Smart Chain
pub const CHAIN_ID_BSC: u64 = 56;
/// Polygon
pub const CHAIN_ID_POLYGON: u64 = 137;
/// Arbitrum One
pub const CHAIN_ID_ARBITRUM: u64 = 42161;
/// Optimism
pub const CHAIN_ID_OPTIMISM: u64 = 10;
/// Avalanche C-Chain
pub const CHAIN_ID_AVALANCHE: u64 = 43114;
/// Base
pub const CHAIN_ID_BASE: u64 = 8453;

/// All chains with built-in presets, in default resolution order
pub const SUPPORTED_CHAIN_IDS: [u64; 7] = [
    CHAIN_ID_ETHEREUM,
    CHAIN_ID_BSC,
    CHAIN_ID_POLYGON,
    CHAIN_ID_ARBITRUM,
    CHAIN_ID_OPTIMISM,
    CHAIN_ID_AVALANCHE,
    CHAIN_ID_BASE,
];

// ============================================
// PUBLIC RPC ENDPOINTS
// ============================================

/// Public RPC endpoints for a chain, in preference order
pub fn get_public_rpc_urls(chain_id: u64) -> &'static [&'static str] {
    match chain_id {
        CHAIN_ID_ETHEREUM => &[
            "https://eth.llamarpc.com",
            "https://ethereum-rpc.publicnode.com",
            "https://rpc.ankr.com/eth",
        ],
        CHAIN_ID_BSC => &[
            "https://bsc-dataseed.binance.org",
            "https://bsc-rpc.publicnode.com",
        ],
        CHAIN_ID_POLYGON => &["https://polygon-rpc.com", "https://polygon-bor-rpc.publicnode.com"],
        CHAIN_ID_ARBITRUM => &["https://arb1.arbitrum.io/rpc", "https://arbitrum-one-rpc.publicnode.com"],
        CHAIN_ID_OPTIMISM => &["https://mainnet.optimism.io", "https://optimism-rpc.publicnode.com"],
        CHAIN_ID_AVALANCHE => &["https://api.avax.network/ext/bc/C/rpc", "https://avalanche-c-chain-rpc.publicnode.com"],
        CHAIN_ID_BASE => &["https://mainnet.base.org", "https://base-rpc.publicnode.com"],
        _ => &[],
    }
}

/// Environment variable holding comma-separated RPC overrides for a chain
pub fn get_rpc_env_key(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        CHAIN_ID_ETHEREUM => Some("ETH_RPC_URLS"),
        CHAIN_ID_BSC => Some("BSC_RPC_URLS"),
        CHAIN_ID_POLYGON => Some("POLYGON_RPC_URLS"),
        CHAIN_ID_ARBITRUM => Some("ARBITRUM_RPC_URLS"),
        CHAIN_ID_OPTIMISM => Some("OPTIMISM_RPC_URLS"),
        CHAIN_ID_AVALANCHE => Some("AVALANCHE_RPC_URLS"),
        CHAIN_ID_BASE => Some("BASE_RPC_URLS"),
        _ => None,
    }
}

// ============================================
// CHAIN METADATA
// ============================================

/// Get chain name
pub fn get_chain_name(chain_id: u64) -> &'static str {
    match chain_id {
        CHAIN_ID_ETHEREUM => "Ethereum",
        CHAIN_ID_BSC => "BNB Smart Chain",
        CHAIN_ID_POLYGON => "Polygon",
        CHAIN_ID_ARBITRUM => "Arbitrum One",
        CHAIN_ID_OPTIMISM => "Optimism",
        CHAIN_ID_AVALANCHE => "Avalanche C-Chain",
        CHAIN_ID_BASE => "Base",
        _ => "Unknown",
    }
}

/// Get native token symbol
pub fn get_native_symbol(chain_id: u64) -> &'static str {
    match chain_id {
        CHAIN_ID_BSC => "BNB",
        CHAIN_ID_POLYGON => "POL",
        CHAIN_ID_AVALANCHE => "AVAX",
        _ => "ETH",
    }
}

/// Block explorer (browser) URL
pub fn get_explorer_url(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        CHAIN_ID_ETHEREUM => Some("https://etherscan.io"),
        CHAIN_ID_BSC => Some("https://bscscan.com"),
        CHAIN_ID_POLYGON => Some("https://polygonscan.com"),
        CHAIN_ID_ARBITRUM => Some("https://arbiscan.io"),
        CHAIN_ID_OPTIMISM => Some("https://optimistic.etherscan.io"),
        CHAIN_ID_AVALANCHE => Some("https://snowtrace.io"),
        CHAIN_ID_BASE => Some("https://basescan.org"),
        _ => None,
    }
}

/// Etherscan-compatible API endpoint for a chain
pub fn get_explorer_api_url(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        CHAIN_ID_ETHEREUM => Some("https://api.etherscan.io/api"),
        CHAIN_ID_BSC => Some("https://api.bscscan.com/api"),
        CHAIN_ID_POLYGON => Some("https://api.polygonscan.com/api"),
        CHAIN_ID_ARBITRUM => Some("https://api.arbiscan.io/api"),
        CHAIN_ID_OPTIMISM => Some("https://api-optimistic.etherscan.io/api"),
        CHAIN_ID_AVALANCHE => Some("https://api.snowtrace.io/api"),
        CHAIN_ID_BASE => Some("https://api.basescan.org/api"),
        _ => None,
    }
}

/// Price-feed chain key (DefiLlama `coins` naming)
pub fn get_price_feed_key(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        CHAIN_ID_ETHEREUM => Some("ethereum"),
        CHAIN_ID_BSC => Some("bsc"),
        CHAIN_ID_POLYGON => Some("polygon"),
        CHAIN_ID_ARBITRUM => Some("arbitrum"),
        CHAIN_ID_OPTIMISM => Some("optimism"),
        CHAIN_ID_AVALANCHE => Some("avax"),
        CHAIN_ID_BASE => Some("base"),
        _ => None,
    }
}

/// Default price service base URL
pub const DEFAULT_PRICE_API_URL: &str = "https://coins.llama.fi/prices/current";
