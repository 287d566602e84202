use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::data::types::{
    ClimateBatch, EventType, MarketSnapshot, OperationalImpact, ReservoirLevel, Timeline,
};
use crate::engine::rank::RankedOpportunities;
use crate::engine::types::{Confidence, Opportunity};

/// Machine-readable run output: the full ranked set plus the risk context
/// it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityReport {
    pub timestamp: DateTime<Utc>,
    pub opportunities: Vec<Opportunity>,
    pub risk_summary: RiskSummary,
    pub narrative_brief: NarrativeBrief,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub event_count: usize,
    pub max_severity: Option<u8>,
    pub dominant_impact: Option<OperationalImpact>,
    pub reservoirs: Vec<ReservoirLevel>,
}

/// Compact structured brief handed to an external text generator. The
/// engine never fabricates numbers not present in the ranked set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeBrief {
    pub top_opportunities: Vec<BriefOpportunity>,
    pub risk_factors: Vec<String>,
    pub timing: Option<Timeline>,
    pub margin_range: Option<MarginRange>,
    pub key_insights: Vec<String>,
    /// Upstream summary text and raw conditions block, carried verbatim
    /// for the generator; the engine never interprets them.
    pub climate_summary: Option<String>,
    pub weather_conditions: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefOpportunity {
    pub buy: String,
    pub sell: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub adjusted_margin_percent: f64,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginRange {
    pub low: f64,
    pub high: f64,
}

/// Seam for the external text-generation collaborator. The deterministic
/// engine only ever produces the structured brief.
pub trait NarrativeGenerator {
    fn generate_narrative(&self, brief: &NarrativeBrief) -> Result<String>;
}

fn event_type_label(event_type: EventType) -> &'static str {
    match event_type {
        EventType::Drought => "drought",
        EventType::Wildfire => "wildfire",
        EventType::Precipitation => "precipitation",
        EventType::WeatherPattern => "weather pattern",
        EventType::Other => "climate event",
    }
}

/// Render the ranked set into the structured report. Pure formatting:
/// re-running on the same ranked set yields a byte-identical report.
pub fn build_report(
    ranked: &RankedOpportunities,
    climate: &ClimateBatch,
    snapshot: Option<&MarketSnapshot>,
) -> OpportunityReport {
    // Report time comes from the inputs, never the wall clock, so a re-run
    // with cached batches reproduces the exact same bytes.
    let timestamp = snapshot
        .map(|s| s.timestamp)
        .or_else(|| climate.events.iter().map(|e| e.timestamp).max())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let risk_summary = RiskSummary {
        event_count: climate.events.len(),
        max_severity: climate.events.iter().map(|e| e.severity).max(),
        dominant_impact: climate.events.iter().map(|e| e.operational_impact).max(),
        reservoirs: snapshot.map(|s| s.reservoirs.clone()).unwrap_or_default(),
    };

    let top_opportunities: Vec<BriefOpportunity> = ranked
        .headline
        .iter()
        .map(|o| BriefOpportunity {
            buy: o.buy.clone(),
            sell: o.sell.clone(),
            buy_price: o.buy_price,
            sell_price: o.sell_price,
            adjusted_margin_percent: o.adjusted_margin_percent,
            confidence: o.confidence,
        })
        .collect();

    // Risk factors drawn from the headline's supporting events, deduped
    // and ordered for reproducibility.
    let risk_factors: Vec<String> = ranked
        .headline
        .iter()
        .flat_map(|o| o.supporting_events.iter())
        .map(|e| {
            format!(
                "{} in {} (severity {}/10, {:?} impact)",
                event_type_label(e.event_type),
                e.location,
                e.severity,
                e.operational_impact
            )
        })
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect();

    let timing = ranked
        .headline
        .iter()
        .flat_map(|o| o.supporting_events.iter())
        .map(|e| e.timeline)
        .max();

    let margin_range = margin_range_of(&ranked.headline);

    let narrative_brief = NarrativeBrief {
        top_opportunities,
        risk_factors,
        timing,
        margin_range,
        key_insights: snapshot.map(|s| s.key_insights.clone()).unwrap_or_default(),
        climate_summary: climate.summary.clone(),
        weather_conditions: snapshot.and_then(|s| s.weather_conditions.clone()),
    };

    OpportunityReport {
        timestamp,
        opportunities: ranked.all.clone(),
        risk_summary,
        narrative_brief,
    }
}

fn margin_range_of(headline: &[Opportunity]) -> Option<MarginRange> {
    let first = headline.first()?;
    let mut low = first.adjusted_margin_percent;
    let mut high = first.adjusted_margin_percent;
    for o in &headline[1..] {
        low = low.min(o.adjusted_margin_percent);
        high = high.max(o.adjusted_margin_percent);
    }
    Some(MarginRange { low, high })
}
