use anyhow::Result;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::SourcesConfig;
use crate::data::cache::SourceCache;
use crate::data::types::{SourceBatches, SourceKind};

/// Gather the three input batches concurrently, each under its own timeout.
///
/// A source that fails or times out falls back to its last cached batch;
/// if none is cached it is recorded as degraded and the run proceeds with
/// an empty batch. Gathering never fails the run.
pub async fn gather_inputs<C, M, P>(
    climate: C,
    market: M,
    price_series: P,
    config: &SourcesConfig,
    cache: &SourceCache,
) -> SourceBatches
where
    C: Future<Output = Result<Value>>,
    M: Future<Output = Result<Value>>,
    P: Future<Output = Result<Value>>,
{
    let timeout = Duration::from_secs(config.fetch_timeout_secs);

    let (climate_outcome, market_outcome, series_outcome) = tokio::join!(
        tokio::time::timeout(timeout, climate),
        tokio::time::timeout(timeout, market),
        tokio::time::timeout(timeout, price_series),
    );

    let mut degraded = Vec::new();
    let climate = resolve(SourceKind::Climate, climate_outcome, cache, &mut degraded);
    let market = resolve(SourceKind::Market, market_outcome, cache, &mut degraded);
    let price_series = resolve(SourceKind::PriceSeries, series_outcome, cache, &mut degraded);

    info!(
        "Gathered inputs: climate={}, market={}, price_series={}, degraded={}",
        climate.is_some(),
        market.is_some(),
        price_series.is_some(),
        degraded.len()
    );

    SourceBatches {
        climate,
        market,
        price_series,
        degraded,
    }
}

fn resolve(
    kind: SourceKind,
    outcome: Result<Result<Value>, tokio::time::error::Elapsed>,
    cache: &SourceCache,
    degraded: &mut Vec<SourceKind>,
) -> Option<Value> {
    match outcome {
        Ok(Ok(payload)) => {
            cache.store(kind, payload.clone());
            Some(payload)
        }
        Ok(Err(e)) => {
            warn!("{} source failed: {:#}", kind, e);
            fall_back(kind, cache, degraded)
        }
        Err(_) => {
            warn!("{} source timed out", kind);
            fall_back(kind, cache, degraded)
        }
    }
}

fn fall_back(
    kind: SourceKind,
    cache: &SourceCache,
    degraded: &mut Vec<SourceKind>,
) -> Option<Value> {
    // A stale batch still counts as degraded: the confidence ceiling drops.
    degraded.push(kind);
    match cache.get(kind) {
        Some(payload) => {
            warn!("{} source: serving stale cached batch", kind);
            Some(payload)
        }
        None => None,
    }
}
