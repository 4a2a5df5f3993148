//! Core Module - Resolution Engine
//!
//! Endpoint health/selection, the enrichment pipeline with its built-in
//! enrichers, and the resolver that orchestrates them.

pub mod endpoint_pool;
pub mod enrichers;
pub mod pipeline;
pub mod resolver;

pub use endpoint_pool::{cooldown_for, EndpointHealth, EndpointPool};
pub use pipeline::{EnrichmentContext, EnrichmentPipeline, Enricher};
pub use resolver::{standard_deep_pipeline, standard_fast_pipeline, Resolver, ResolverBuilder};
