//! Built-in enrichers, in execution order:
//!
//! | priority | enricher | applies to |
//! |---|---|---|
//! | 10 | account-basics | accounts without code |
//! | 20 | contract-basics | contracts |
//! | 30 | standard-detector | contracts not classified as proxy |
//! | 40 | metadata | contracts on networks with an explorer |
//! | 50 | price | fungible tokens on networks with a price feed |

pub mod account_basics;
pub mod contract_basics;
pub mod metadata;
pub mod price;
pub mod standard_detector;

pub use account_basics::AccountBasicsEnricher;
pub use contract_basics::ContractBasicsEnricher;
pub use metadata::MetadataEnricher;
pub use price::PriceEnricher;
pub use standard_detector::StandardDetectorEnricher;
