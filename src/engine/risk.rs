use std::cmp::Ordering;
use tracing::debug;

use crate::config::EngineConfig;
use crate::data::types::ClimateEvent;
use crate::engine::types::{Confidence, Opportunity, SpreadPair};

/// Case-insensitive, substring-tolerant location match in both directions.
fn location_matches(event_location: &str, side: &str) -> bool {
    let event_location = event_location.to_lowercase();
    let side = side.to_lowercase();
    if event_location.is_empty() || side.is_empty() {
        return false;
    }
    event_location.contains(&side) || side.contains(&event_location)
}

/// Deterministic event ordering: severity first, then operational impact,
/// then location as the final tiebreak.
fn by_risk_rank(a: &ClimateEvent, b: &ClimateEvent) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then(b.operational_impact.cmp(&a.operational_impact))
        .then(a.location.cmp(&b.location))
}

/// Apply the climate-derived risk weight to one spread pair.
///
/// Weight formula: `1 + (max_matched_severity / 10) * impact_multiplier`.
/// The adjustment is asymmetric by design: risk never improves a positive
/// margin (`raw / weight`) and never softens a non-positive one
/// (`raw * weight`).
pub fn adjust(pair: &SpreadPair, events: &[ClimateEvent], config: &EngineConfig) -> Opportunity {
    let mut matched: Vec<ClimateEvent> = events
        .iter()
        .filter(|e| location_matches(&e.location, &pair.buy) || location_matches(&e.location, &pair.sell))
        .cloned()
        .collect();
    matched.sort_by(by_risk_rank);

    let (risk_weight, confidence, supporting_events) = if let Some(top) = matched.first() {
        let weight = risk_weight_for(top, config);
        (weight, Confidence::High, matched.clone())
    } else if let Some(global) = events.iter().min_by(|a, b| by_risk_rank(a, b)) {
        // No location match for this pair: the batch's highest-severity
        // event acts as a market-wide risk factor, with weaker evidence.
        let weight = risk_weight_for(global, config);
        (weight, Confidence::Low, vec![global.clone()])
    } else {
        // No climate evidence at all: neutral weight, capped trust.
        (1.0, Confidence::Medium, Vec::new())
    };

    let adjusted_margin_percent = adjust_margin(pair.raw_margin_percent, risk_weight);

    debug!(
        "Adjusted {} -> {}: raw={:.2}%, weight={:.2}, adjusted={:.2}%",
        pair.buy, pair.sell, pair.raw_margin_percent, risk_weight, adjusted_margin_percent
    );

    Opportunity {
        buy: pair.buy.clone(),
        sell: pair.sell.clone(),
        buy_price: pair.buy_price,
        sell_price: pair.sell_price,
        raw_margin_percent: pair.raw_margin_percent,
        risk_weight,
        adjusted_margin_percent,
        confidence,
        supporting_events,
        rank: 0,
    }
}

fn risk_weight_for(event: &ClimateEvent, config: &EngineConfig) -> f64 {
    let multiplier = config.impact_multipliers.for_impact(event.operational_impact);
    1.0 + (event.severity as f64 / 10.0) * multiplier
}

/// Pure function of raw margin and risk weight; no hidden randomness.
pub fn adjust_margin(raw_margin_percent: f64, risk_weight: f64) -> f64 {
    if raw_margin_percent > 0.0 {
        raw_margin_percent / risk_weight
    } else {
        raw_margin_percent * risk_weight
    }
}
