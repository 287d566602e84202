use std::collections::BTreeMap;
use tracing::debug;

use crate::config::EngineConfig;
use crate::data::types::{MarketSnapshot, PriceSeries};
use crate::engine::types::SpreadPair;

/// Label used for the spot side of spot-vs-futures pairs.
pub const SPOT_LABEL: &str = "NQH2O";

fn is_index_instrument(name: &str) -> bool {
    name.to_lowercase().contains("nqh2o")
}

pub fn raw_margin_percent(buy_price: f64, sell_price: f64) -> f64 {
    (sell_price - buy_price) / buy_price * 100.0
}

/// Compute the full directed spread set from the most recent snapshot plus
/// price-series context.
///
/// Locations are iterated in lexicographic order and futures in payload
/// order, so the output is bit-reproducible for a fixed input.
pub fn compute_spreads(
    snapshot: Option<&MarketSnapshot>,
    series: &[PriceSeries],
    config: &EngineConfig,
) -> Vec<SpreadPair> {
    // Location price table: snapshot observations first, then series
    // backfill for locations the snapshot lacks.
    let mut locations: BTreeMap<String, f64> = BTreeMap::new();
    if let Some(snapshot) = snapshot {
        for quote in &snapshot.locations {
            locations.insert(quote.name.clone(), quote.observed_price);
        }
    }
    for s in series {
        if is_index_instrument(&s.instrument) {
            continue;
        }
        let already_known = locations
            .keys()
            .any(|name| name.eq_ignore_ascii_case(&s.instrument));
        if already_known {
            continue;
        }
        if let Some(point) = s.latest() {
            locations.insert(s.instrument.clone(), point.price);
        }
    }

    // Spot index: snapshot quote, else the latest index series point.
    let spot_price = snapshot
        .and_then(|s| s.index.as_ref())
        .map(|index| index.spot_price)
        .or_else(|| {
            series
                .iter()
                .find(|s| is_index_instrument(&s.instrument))
                .and_then(|s| s.latest())
                .map(|point| point.price)
        });

    let mut pairs = Vec::new();

    for (buy, &buy_price) in &locations {
        for (sell, &sell_price) in &locations {
            if buy == sell {
                continue;
            }
            if let Some(pair) = make_pair(buy, sell, buy_price, sell_price, config) {
                pairs.push(pair);
            }
        }
    }

    if let (Some(spot), Some(snapshot)) = (spot_price, snapshot) {
        for quote in &snapshot.futures {
            let sell_price = match quote.price.or(quote.spread_to_index.map(|s| spot + s)) {
                Some(p) => p,
                None => continue,
            };
            if let Some(pair) = make_pair(SPOT_LABEL, &quote.contract, spot, sell_price, config) {
                pairs.push(pair);
            }
        }
    }

    debug!("Computed {} candidate spread pairs", pairs.len());
    pairs
}

fn make_pair(
    buy: &str,
    sell: &str,
    buy_price: f64,
    sell_price: f64,
    config: &EngineConfig,
) -> Option<SpreadPair> {
    // Division guard: a non-positive or non-finite buy side is excluded
    // silently, not surfaced as a warning.
    if !buy_price.is_finite() || buy_price <= 0.0 || !sell_price.is_finite() {
        debug!("Excluding pair {} -> {}: unusable buy/sell price", buy, sell);
        return None;
    }
    let raw = raw_margin_percent(buy_price, sell_price);
    if raw.abs() < config.min_margin_percent {
        return None;
    }
    Some(SpreadPair {
        buy: buy.to_string(),
        sell: sell.to_string(),
        buy_price,
        sell_price,
        raw_margin_percent: raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::{FuturesQuote, IndexQuote, LocationQuote, PricePoint};
    use chrono::{DateTime, NaiveDate, Utc};

    fn snapshot_with_locations(locations: Vec<(&str, f64)>) -> MarketSnapshot {
        MarketSnapshot {
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            report_date: NaiveDate::from_ymd_opt(2025, 7, 28).unwrap(),
            index: None,
            futures: Vec::new(),
            locations: locations
                .into_iter()
                .map(|(name, observed_price)| LocationQuote {
                    name: name.to_string(),
                    observed_price,
                })
                .collect(),
            reservoirs: Vec::new(),
            weather_conditions: None,
            key_insights: Vec::new(),
        }
    }

    fn series(instrument: &str, price: f64) -> PriceSeries {
        PriceSeries {
            instrument: instrument.to_string(),
            points: vec![PricePoint {
                date: NaiveDate::from_ymd_opt(2025, 7, 28).unwrap(),
                price,
            }],
        }
    }

    #[test]
    fn test_directed_pairs_both_directions() {
        let snapshot = snapshot_with_locations(vec![("A", 341.73), ("B", 385.50)]);
        let pairs = compute_spreads(Some(&snapshot), &[], &EngineConfig::default());

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].buy, "A");
        assert_eq!(pairs[0].sell, "B");
        assert!((pairs[0].raw_margin_percent - 12.8084).abs() < 0.001);
        assert_eq!(pairs[1].buy, "B");
        assert!(pairs[1].raw_margin_percent < 0.0);
    }

    #[test]
    fn test_non_positive_buy_price_excluded() {
        let snapshot = snapshot_with_locations(vec![("A", 0.0), ("B", 385.50)]);
        let pairs = compute_spreads(Some(&snapshot), &[], &EngineConfig::default());

        // A -> B is excluded by the guard; B -> A survives (only the buy
        // side divides).
        assert!(pairs.iter().all(|p| p.buy_price > 0.0));
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].buy, "B");
    }

    #[test]
    fn test_noise_threshold_filters_small_margins() {
        let snapshot = snapshot_with_locations(vec![("A", 100.0), ("B", 100.5)]);
        let pairs = compute_spreads(Some(&snapshot), &[], &EngineConfig::default());
        assert!(pairs.is_empty());

        let loose = EngineConfig {
            min_margin_percent: 0.1,
            ..EngineConfig::default()
        };
        let pairs = compute_spreads(Some(&snapshot), &[], &loose);
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_spot_futures_pairs() {
        let mut snapshot = snapshot_with_locations(vec![]);
        snapshot.index = Some(IndexQuote {
            spot_price: 341.73,
            week_change_percent: None,
            currency: "USD".to_string(),
        });
        snapshot.futures = vec![
            FuturesQuote {
                contract: "NQH2O Sep25".to_string(),
                price: Some(335.01),
                spread_to_index: Some(-6.72),
            },
            FuturesQuote {
                contract: "NQH2O Dec25".to_string(),
                price: None,
                spread_to_index: Some(12.27),
            },
        ];

        let pairs = compute_spreads(Some(&snapshot), &[], &EngineConfig::default());
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].buy, SPOT_LABEL);
        assert_eq!(pairs[0].sell, "NQH2O Sep25");
        assert!(pairs[0].raw_margin_percent < 0.0);
        // Dec25 price derived from spot + spread.
        assert!((pairs[1].sell_price - 354.0).abs() < 1e-9);
    }

    #[test]
    fn test_series_backfills_missing_locations_and_spot() {
        let snapshot = snapshot_with_locations(vec![("Central Valley", 450.0)]);
        let context = vec![
            series("Southern CA", 680.0),
            series("central valley", 999.0), // already known, must not override
            series("NQH2O Index", 341.73),   // index, not a location
        ];

        let pairs = compute_spreads(Some(&snapshot), &context, &EngineConfig::default());
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.buy != "NQH2O Index"));
        let cv_to_sc = pairs.iter().find(|p| p.buy == "Central Valley").unwrap();
        assert_eq!(cv_to_sc.buy_price, 450.0);
        assert_eq!(cv_to_sc.sell_price, 680.0);
    }

    #[test]
    fn test_no_snapshot_degrades_to_series_only() {
        let context = vec![series("A", 100.0), series("B", 120.0)];
        let pairs = compute_spreads(None, &context, &EngineConfig::default());
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_deterministic_output_order() {
        let snapshot = snapshot_with_locations(vec![("C", 300.0), ("A", 100.0), ("B", 200.0)]);
        let first = compute_spreads(Some(&snapshot), &[], &EngineConfig::default());
        let second = compute_spreads(Some(&snapshot), &[], &EngineConfig::default());
        assert_eq!(first, second);
        assert_eq!(first[0].buy, "A");
        assert_eq!(first[0].sell, "B");
    }
}
