use std::collections::HashSet;
use tracing::debug;

use crate::config::EngineConfig;
use crate::engine::types::Opportunity;

/// Full ranked set plus the headline subset surfaced to end users.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedOpportunities {
    pub all: Vec<Opportunity>,
    pub headline: Vec<Opportunity>,
}

/// Deduplicate, order, and rank one run's risk-adjusted opportunities.
///
/// Ordering is total: adjusted margin descending, then confidence, then
/// supporting-event count, then the buy key lexicographically. Rank is
/// assigned 1..N over the sorted sequence. The headline keeps at most
/// `top_k` entries and never includes a non-positive adjusted margin
/// (those are risk warnings, not trades).
pub fn rank_opportunities(
    opportunities: Vec<Opportunity>,
    config: &EngineConfig,
) -> RankedOpportunities {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut all: Vec<Opportunity> = opportunities
        .into_iter()
        .filter(|o| seen.insert((o.buy.clone(), o.sell.clone())))
        .collect();

    all.sort_by(|a, b| {
        b.adjusted_margin_percent
            .total_cmp(&a.adjusted_margin_percent)
            .then(b.confidence.cmp(&a.confidence))
            .then(b.supporting_events.len().cmp(&a.supporting_events.len()))
            .then(a.buy.cmp(&b.buy))
    });

    for (i, opportunity) in all.iter_mut().enumerate() {
        opportunity.rank = i + 1;
    }

    let headline: Vec<Opportunity> = all
        .iter()
        .filter(|o| o.adjusted_margin_percent > 0.0)
        .take(config.top_k)
        .cloned()
        .collect();

    debug!(
        "Ranked {} opportunities, {} in headline",
        all.len(),
        headline.len()
    );

    RankedOpportunities { all, headline }
}
