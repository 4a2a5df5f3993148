//! Providers Module - External Data Sources
//!
//! JSON-RPC endpoints, block explorers and the price feed. Every outbound
//! call goes through `rate_limit::ThrottledClient`.

pub mod explorer;
pub mod prices;
pub mod rate_limit;
pub mod rpc;

pub use explorer::{ContractExplorer, ExplorerClient};
pub use prices::{PriceClient, PriceOracle, PriceQuote};
pub use rate_limit::{CircuitBreaker, RateLimiter, ThrottledClient};
pub use rpc::{mask_url, EndpointClient, EndpointConnector, RpcConnector, RpcProvider};
