//! Chainscope - multi-network address resolver
//!
//! Usage: `chainscope <address> [<address> ...]`
//!
//! Configuration comes from `CHAINSCOPE_CONFIG` (JSON file) when set, else
//! from the environment (see `ResolverConfig::from_env`). Resolutions are
//! printed as JSON, one document per address.

use chainscope::{Resolver, ResolverConfig};

use eyre::{eyre, Result, WrapErr};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// How long to let background passes finish before exiting
const DEEP_PASS_GRACE: Duration = Duration::from_secs(5);

fn load_config() -> Result<ResolverConfig> {
    match std::env::var("CHAINSCOPE_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path).wrap_err_with(|| format!("reading {}", path))?;
            Ok(ResolverConfig::from_json_str(&raw)?)
        }
        Err(_) => Ok(ResolverConfig::from_env()?),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let inputs: Vec<String> = std::env::args().skip(1).collect();
    if inputs.is_empty() {
        return Err(eyre!("usage: chainscope <address> [<address> ...]"));
    }

    let config = load_config()?;
    let background = config.background_enrichment;
    let resolver = Resolver::new(config)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupted, cancelling");
            ctrl_c.cancel();
        }
    });

    let mut resolved = Vec::new();
    for input in &inputs {
        match resolver.resolve_str(input, &cancel).await {
            Ok(resolution) => resolved.push(resolution),
            Err(e) if e.is_cancelled() => break,
            Err(e) => eprintln!("❌ {}: {}", input, e),
        }
    }

    if background && !cancel.is_cancelled() {
        info!("⏳ Waiting up to {}s for background enrichment", DEEP_PASS_GRACE.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(DEEP_PASS_GRACE) => {}
            _ = cancel.cancelled() => {}
        }
    }

    for fast in resolved {
        // prefer the deep record if the background pass stored one
        let resolution = resolver.cache().get(&fast.address).await.unwrap_or(fast);
        println!("{}", serde_json::to_string_pretty(resolution.as_ref())?);
    }

    resolver.shutdown();
    Ok(())
}
