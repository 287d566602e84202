pub mod rank;
pub mod report;
pub mod risk;
pub mod spread;
pub mod types;

use tracing::info;

use crate::config::EngineConfig;
use crate::data::normalize::{normalize_climate, normalize_market, normalize_price_series};
use crate::data::types::{ClimateBatch, SourceBatches, SourceKind};
use crate::engine::rank::rank_opportunities;
use crate::engine::report::{build_report, OpportunityReport};
use crate::engine::types::{Confidence, EngineWarning, Opportunity};

/// Primary result plus the warning side channel. Warnings never abort a
/// run; the engine always produces some valid (possibly empty) report.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: OpportunityReport,
    pub warnings: Vec<EngineWarning>,
}

/// One engine run: normalize, spread, risk-adjust, rank, format.
///
/// Pure and single-threaded: a run is a function of the gathered batches
/// and the configuration, so re-running with cached inputs is idempotent.
pub fn run(batches: &SourceBatches, config: &EngineConfig) -> RunOutput {
    let mut warnings: Vec<EngineWarning> = Vec::new();

    // An absent batch degrades the run; it never fails it.
    let mut degraded: Vec<SourceKind> = batches.degraded.clone();
    for (kind, present) in [
        (SourceKind::Climate, batches.climate.is_some()),
        (SourceKind::Market, batches.market.is_some()),
        (SourceKind::PriceSeries, batches.price_series.is_some()),
    ] {
        if !present && !degraded.contains(&kind) {
            degraded.push(kind);
        }
    }
    for kind in &degraded {
        warnings.push(EngineWarning::DegradedInput { kind: *kind });
    }

    let climate = match &batches.climate {
        Some(payload) => {
            let (batch, batch_warnings) = normalize_climate(payload);
            warnings.extend(batch_warnings.into_iter().map(EngineWarning::from));
            batch
        }
        None => ClimateBatch::default(),
    };

    let snapshot = match &batches.market {
        Some(payload) => {
            let (snapshot, batch_warnings) = normalize_market(payload);
            warnings.extend(batch_warnings.into_iter().map(EngineWarning::from));
            snapshot
        }
        None => None,
    };

    let series = match &batches.price_series {
        Some(payload) => {
            let (series, batch_warnings) = normalize_price_series(payload);
            warnings.extend(batch_warnings.into_iter().map(EngineWarning::from));
            series
        }
        None => Vec::new(),
    };

    let pairs = spread::compute_spreads(snapshot.as_ref(), &series, config);

    let mut opportunities: Vec<Opportunity> = pairs
        .iter()
        .map(|pair| risk::adjust(pair, &climate.events, config))
        .collect();

    // A degraded run cannot assert high confidence in anything.
    if !degraded.is_empty() {
        for opportunity in &mut opportunities {
            opportunity.confidence = opportunity.confidence.cap(Confidence::Medium);
        }
    }

    let ranked = rank_opportunities(opportunities, config);
    let report = build_report(&ranked, &climate, snapshot.as_ref());

    info!(
        "Engine run complete: {} opportunities ({} headline), {} warnings",
        report.opportunities.len(),
        report.narrative_brief.top_opportunities.len(),
        warnings.len()
    );

    RunOutput { report, warnings }
}
