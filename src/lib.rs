//! Chainscope Library
//!
//! Multi-network address resolution: given an EVM address, determine on
//! every configured network whether it is a user account or a contract,
//! which standard the contract implements, and its known metadata and price.
//!
//! - Endpoint failover with per-endpoint health, cooldown and disablement
//! - Rate-limited, circuit-broken outbound calls
//! - Ordered enrichment pipeline with per-step failure isolation
//! - Fast synchronous pass plus detached deep pass, cached per address

pub mod core;
pub mod models;
pub mod providers;
pub mod utils;

pub use crate::core::{EndpointPool, EnrichmentContext, EnrichmentPipeline, Enricher, Resolver, ResolverBuilder};
pub use models::{
    parse_address, AddressResolution, AppError, AppResult, Classification, ErrorCode, NetworkAccountInfo,
    NetworkConfig, ResolverConfig, ScanMode,
};
pub use providers::{EndpointClient, EndpointConnector};
pub use utils::{MemoryResolutionCache, ResolutionCache};
