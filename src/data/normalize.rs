use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::data::types::{
    ClimateBatch, ClimateEvent, EventType, FuturesQuote, IndexQuote, LocationQuote,
    MarketSnapshot, OperationalImpact, PricePoint, PriceSeries, ReservoirLevel, SourceKind,
    Timeline,
};

/// A single record (or field) that failed schema checks and was dropped.
/// Warnings are accumulated in a side channel; they never abort a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} payload: {field}: {reason}")]
pub struct NormalizationWarning {
    pub kind: SourceKind,
    pub field: String,
    pub reason: String,
}

impl NormalizationWarning {
    fn new(kind: SourceKind, field: &str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Extract a date from free-form report text. The weekly report carries
/// dates as ISO, US-style, or "Month DD, YYYY".
pub fn extract_date(text: &str) -> Option<NaiveDate> {
    if let Ok(re) = Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})") {
        if let Some(cap) = re.captures(text) {
            let year: i32 = cap[1].parse().ok()?;
            let month: u32 = cap[2].parse().ok()?;
            let day: u32 = cap[3].parse().ok()?;
            return NaiveDate::from_ymd_opt(year, month, day);
        }
    }
    if let Ok(re) = Regex::new(r"(\d{1,2})[/-](\d{1,2})[/-](\d{4})") {
        if let Some(cap) = re.captures(text) {
            let month: u32 = cap[1].parse().ok()?;
            let day: u32 = cap[2].parse().ok()?;
            let year: i32 = cap[3].parse().ok()?;
            return NaiveDate::from_ymd_opt(year, month, day);
        }
    }
    if let Ok(re) = Regex::new(r"(?i)([a-z]+)\s+(\d{1,2}),?\s+(\d{4})") {
        if let Some(cap) = re.captures(text) {
            let composed = format!("{} {} {}", &cap[1], &cap[2], &cap[3]);
            return NaiveDate::parse_from_str(&composed, "%B %d %Y").ok();
        }
    }
    None
}

/// Normalize a climate-events payload (`agent_type: "climate_events"`).
/// Malformed records are dropped individually; the batch survives.
pub fn normalize_climate(payload: &Value) -> (ClimateBatch, Vec<NormalizationWarning>) {
    let source = SourceKind::Climate;
    let mut warnings = Vec::new();

    if let Some(agent_type) = payload.get("agent_type").and_then(Value::as_str) {
        if agent_type != "climate_events" {
            warnings.push(NormalizationWarning::new(
                source,
                "agent_type",
                format!("expected climate_events, got {}", agent_type),
            ));
        }
    }

    let batch_timestamp =
        parse_timestamp(&payload["timestamp"]).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let summary = payload
        .get("summary")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let raw_events = match payload.get("events").and_then(Value::as_array) {
        Some(events) => events,
        None => {
            warnings.push(NormalizationWarning::new(
                source,
                "events",
                "missing or not an array",
            ));
            return (ClimateBatch { events: Vec::new(), summary }, warnings);
        }
    };

    let mut events: Vec<ClimateEvent> = Vec::new();
    for raw in raw_events {
        if let Some(event) = climate_event_from_value(raw, batch_timestamp, &mut warnings) {
            // Duplicate (location, timestamp): last-write-wins within a batch.
            let key = (event.location.to_lowercase(), event.timestamp);
            match events
                .iter()
                .position(|e| (e.location.to_lowercase(), e.timestamp) == key)
            {
                Some(idx) => events[idx] = event,
                None => events.push(event),
            }
        }
    }

    debug!("Normalized {} climate events", events.len());
    (ClimateBatch { events, summary }, warnings)
}

fn climate_event_from_value(
    raw: &Value,
    batch_timestamp: DateTime<Utc>,
    warnings: &mut Vec<NormalizationWarning>,
) -> Option<ClimateEvent> {
    let source = SourceKind::Climate;

    let location = match raw.get("location").and_then(Value::as_str) {
        Some(loc) if !loc.trim().is_empty() => loc.trim().to_string(),
        _ => {
            warnings.push(NormalizationWarning::new(
                source,
                "events.location",
                "missing or not a string",
            ));
            return None;
        }
    };

    let event_type = match raw.get("event_type").and_then(Value::as_str) {
        Some(t) => EventType::from_raw(t),
        None => {
            warnings.push(NormalizationWarning::new(
                source,
                "events.event_type",
                "missing or not a string",
            ));
            return None;
        }
    };

    let severity = match raw.get("severity").and_then(Value::as_i64) {
        Some(s) if (1..=10).contains(&s) => s as u8,
        Some(s) => {
            warnings.push(NormalizationWarning::new(
                source,
                "events.severity",
                format!("{} out of range 1-10, clamped", s),
            ));
            s.clamp(1, 10) as u8
        }
        None => {
            warnings.push(NormalizationWarning::new(
                source,
                "events.severity",
                "missing or not an integer",
            ));
            return None;
        }
    };

    let operational_impact = match raw
        .get("operational_impact")
        .and_then(Value::as_str)
        .and_then(OperationalImpact::from_raw)
    {
        Some(impact) => impact,
        None => {
            warnings.push(NormalizationWarning::new(
                source,
                "events.operational_impact",
                "missing or not one of low|medium|high",
            ));
            return None;
        }
    };

    // Timeline defaults to short_term when absent; it only steers the
    // timing recommendation, not the risk arithmetic.
    let timeline = raw
        .get("timeline")
        .and_then(Value::as_str)
        .and_then(Timeline::from_raw)
        .unwrap_or(Timeline::ShortTerm);

    let timestamp = parse_timestamp(&raw["timestamp"]).unwrap_or(batch_timestamp);
    let details = raw
        .get("details")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let recommended_actions = raw
        .get("recommended_actions")
        .and_then(Value::as_array)
        .map(|actions| {
            actions
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    Some(ClimateEvent {
        timestamp,
        event_type,
        location,
        severity,
        operational_impact,
        timeline,
        details,
        recommended_actions,
    })
}

/// Normalize a weekly market report payload (`agent_type: "veles_water_report"`).
pub fn normalize_market(payload: &Value) -> (Option<MarketSnapshot>, Vec<NormalizationWarning>) {
    let source = SourceKind::Market;
    let mut warnings = Vec::new();

    if let Some(agent_type) = payload.get("agent_type").and_then(Value::as_str) {
        if agent_type != "veles_water_report" {
            warnings.push(NormalizationWarning::new(
                source,
                "agent_type",
                format!("expected veles_water_report, got {}", agent_type),
            ));
        }
    }

    let timestamp = match parse_timestamp(&payload["timestamp"]) {
        Some(ts) => ts,
        None => {
            warnings.push(NormalizationWarning::new(
                source,
                "timestamp",
                "missing or not RFC 3339",
            ));
            DateTime::<Utc>::UNIX_EPOCH
        }
    };

    let report_date = match payload
        .get("report_date")
        .and_then(Value::as_str)
        .and_then(extract_date)
    {
        Some(date) => date,
        None => {
            warnings.push(NormalizationWarning::new(
                source,
                "report_date",
                "missing or unparseable, falling back to payload timestamp",
            ));
            timestamp.date_naive()
        }
    };

    let water_market = &payload["water_market"];

    let index = match water_market.get("nqh2o_index") {
        Some(raw_index) => match raw_index.get("spot_price").and_then(Value::as_f64) {
            Some(spot_price) if spot_price.is_finite() => Some(IndexQuote {
                spot_price,
                week_change_percent: raw_index
                    .get("week_change_percent")
                    .and_then(Value::as_f64),
                currency: raw_index
                    .get("price_currency")
                    .and_then(Value::as_str)
                    .unwrap_or("USD")
                    .to_string(),
            }),
            _ => {
                warnings.push(NormalizationWarning::new(
                    source,
                    "water_market.nqh2o_index.spot_price",
                    "missing or not a finite number",
                ));
                None
            }
        },
        None => None,
    };

    let mut futures = Vec::new();
    if let Some(raw_futures) = water_market.get("futures").and_then(Value::as_array) {
        for raw in raw_futures {
            let contract = match raw.get("contract").and_then(Value::as_str) {
                Some(c) if !c.trim().is_empty() => c.trim().to_string(),
                _ => {
                    warnings.push(NormalizationWarning::new(
                        source,
                        "water_market.futures.contract",
                        "missing or not a string",
                    ));
                    continue;
                }
            };
            let price = raw.get("price").and_then(Value::as_f64).filter(|p| p.is_finite());
            let spread_to_index = raw
                .get("spread_to_index")
                .and_then(Value::as_f64)
                .filter(|s| s.is_finite());
            if price.is_none() && spread_to_index.is_none() {
                warnings.push(NormalizationWarning::new(
                    source,
                    "water_market.futures.price",
                    format!("{}: neither price nor spread_to_index present", contract),
                ));
                continue;
            }
            futures.push(FuturesQuote { contract, price, spread_to_index });
        }
    }

    let mut locations: Vec<LocationQuote> = Vec::new();
    if let Some(raw_locations) = water_market.get("locations").and_then(Value::as_array) {
        for raw in raw_locations {
            let name = match raw.get("name").and_then(Value::as_str) {
                Some(n) if !n.trim().is_empty() => n.trim().to_string(),
                _ => {
                    warnings.push(NormalizationWarning::new(
                        source,
                        "water_market.locations.name",
                        "missing or not a string",
                    ));
                    continue;
                }
            };
            let observed_price = match raw
                .get("observed_price")
                .and_then(Value::as_f64)
                .filter(|p| p.is_finite())
            {
                Some(p) => p,
                None => {
                    warnings.push(NormalizationWarning::new(
                        source,
                        "water_market.locations.observed_price",
                        format!("{}: missing or not a finite number", name),
                    ));
                    continue;
                }
            };
            // Same location twice in one payload: keep the later entry.
            match locations
                .iter()
                .position(|l| l.name.eq_ignore_ascii_case(&name))
            {
                Some(idx) => locations[idx] = LocationQuote { name, observed_price },
                None => locations.push(LocationQuote { name, observed_price }),
            }
        }
    }

    let mut reservoirs = Vec::new();
    if let Some(raw_reservoirs) = payload.get("reservoir_storage").and_then(Value::as_array) {
        for raw in raw_reservoirs {
            let name = match raw.get("name").and_then(Value::as_str) {
                Some(n) if !n.trim().is_empty() => n.trim().to_string(),
                _ => {
                    warnings.push(NormalizationWarning::new(
                        source,
                        "reservoir_storage.name",
                        "missing or not a string",
                    ));
                    continue;
                }
            };
            let capacity_percent = match raw
                .get("capacity_percent")
                .and_then(Value::as_f64)
                .filter(|p| p.is_finite())
            {
                Some(p) => p,
                None => {
                    warnings.push(NormalizationWarning::new(
                        source,
                        "reservoir_storage.capacity_percent",
                        format!("{}: missing or not a finite number", name),
                    ));
                    continue;
                }
            };
            reservoirs.push(ReservoirLevel {
                name,
                capacity_percent,
                historical_percent: raw.get("historical_percent").and_then(Value::as_f64),
            });
        }
    }

    let weather_conditions = payload.get("weather_conditions").cloned();
    let key_insights = match payload.get("key_insights") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    };

    debug!(
        "Normalized market snapshot: {} futures, {} locations, {} reservoirs",
        futures.len(),
        locations.len(),
        reservoirs.len()
    );

    (
        Some(MarketSnapshot {
            timestamp,
            report_date,
            index,
            futures,
            locations,
            reservoirs,
            weather_conditions,
            key_insights,
        }),
        warnings,
    )
}

/// Normalize a price-series payload: one series object or an array of them,
/// each tagged with an instrument identifier.
pub fn normalize_price_series(payload: &Value) -> (Vec<PriceSeries>, Vec<NormalizationWarning>) {
    let source = SourceKind::PriceSeries;
    let mut warnings = Vec::new();

    let raw_series: Vec<&Value> = match payload {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.get("series").and_then(Value::as_array) {
            Some(items) => items.iter().collect(),
            None => vec![payload],
        },
        _ => {
            warnings.push(NormalizationWarning::new(
                source,
                "payload",
                "expected an object or array",
            ));
            return (Vec::new(), warnings);
        }
    };

    let mut series: Vec<PriceSeries> = Vec::new();
    for raw in raw_series {
        let instrument = match raw.get("instrument").and_then(Value::as_str) {
            Some(i) if !i.trim().is_empty() => i.trim().to_string(),
            _ => {
                warnings.push(NormalizationWarning::new(
                    source,
                    "instrument",
                    "missing or not a string",
                ));
                continue;
            }
        };

        let raw_points = raw
            .get("points")
            .or_else(|| raw.get("prices"))
            .and_then(Value::as_array);
        let raw_points = match raw_points {
            Some(p) => p,
            None => {
                warnings.push(NormalizationWarning::new(
                    source,
                    "points",
                    format!("{}: missing or not an array", instrument),
                ));
                continue;
            }
        };

        let mut points: Vec<PricePoint> = Vec::new();
        for raw_point in raw_points {
            match price_point_from_value(raw_point) {
                Some(point) => {
                    // Same date twice: last-write-wins.
                    match points.iter().position(|p| p.date == point.date) {
                        Some(idx) => points[idx] = point,
                        None => points.push(point),
                    }
                }
                None => warnings.push(NormalizationWarning::new(
                    source,
                    "points",
                    format!("{}: dropped malformed point", instrument),
                )),
            }
        }
        points.sort_by_key(|p| p.date);

        // Whole series repeated for the same instrument: later one wins.
        let entry = PriceSeries { instrument, points };
        match series
            .iter()
            .position(|s| s.instrument.eq_ignore_ascii_case(&entry.instrument))
        {
            Some(idx) => series[idx] = entry,
            None => series.push(entry),
        }
    }

    (series, warnings)
}

fn price_point_from_value(raw: &Value) -> Option<PricePoint> {
    // Accept {date, price} objects or [date, price] pairs.
    let (raw_date, raw_price) = match raw {
        Value::Object(map) => (map.get("date")?, map.get("price")?),
        Value::Array(pair) if pair.len() == 2 => (&pair[0], &pair[1]),
        _ => return None,
    };
    let date = raw_date.as_str().and_then(extract_date)?;
    let price = raw_price.as_f64().filter(|p| p.is_finite())?;
    Some(PricePoint { date, price })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        assert_eq!(extract_date("2025-08-01"), Some(expected));
        assert_eq!(extract_date("08/01/2025"), Some(expected));
        assert_eq!(extract_date("08-01-2025"), Some(expected));
        assert_eq!(extract_date("August 1, 2025"), Some(expected));
        assert_eq!(extract_date("no date here"), None);
    }

    #[test]
    fn test_normalize_climate_happy_path() {
        let payload = json!({
            "timestamp": "2025-08-01T12:00:00Z",
            "agent_type": "climate_events",
            "summary": "Drought intensifying across the basin",
            "events": [{
                "event_type": "drought",
                "location": "Central Valley",
                "severity": 8,
                "operational_impact": "high",
                "timeline": "immediate",
                "details": "Exceptional drought conditions",
                "recommended_actions": ["Monitor conditions", "Implement conservation measures"]
            }]
        });
        let (batch, warnings) = normalize_climate(&payload);
        assert!(warnings.is_empty());
        assert_eq!(batch.events.len(), 1);
        let event = &batch.events[0];
        assert_eq!(event.event_type, EventType::Drought);
        assert_eq!(event.severity, 8);
        assert_eq!(event.operational_impact, OperationalImpact::High);
        assert_eq!(event.timeline, Timeline::Immediate);
        assert_eq!(event.recommended_actions.len(), 2);
        assert_eq!(batch.summary.as_deref(), Some("Drought intensifying across the basin"));
    }

    #[test]
    fn test_climate_bad_record_dropped_batch_survives() {
        let payload = json!({
            "timestamp": "2025-08-01T12:00:00Z",
            "agent_type": "climate_events",
            "events": [
                { "event_type": "drought", "severity": 8, "operational_impact": "high" },
                {
                    "event_type": "wildfire",
                    "location": "Imperial Valley",
                    "severity": 6,
                    "operational_impact": "medium"
                }
            ]
        });
        let (batch, warnings) = normalize_climate(&payload);
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].location, "Imperial Valley");
        assert!(warnings.iter().any(|w| w.field == "events.location"));
    }

    #[test]
    fn test_climate_severity_clamped_with_warning() {
        let payload = json!({
            "agent_type": "climate_events",
            "events": [{
                "event_type": "drought",
                "location": "Imperial Valley",
                "severity": 14,
                "operational_impact": "high"
            }]
        });
        let (batch, warnings) = normalize_climate(&payload);
        assert_eq!(batch.events[0].severity, 10);
        assert!(warnings.iter().any(|w| w.field == "events.severity"));
    }

    #[test]
    fn test_climate_duplicate_last_write_wins() {
        let payload = json!({
            "timestamp": "2025-08-01T12:00:00Z",
            "agent_type": "climate_events",
            "events": [
                {
                    "event_type": "drought",
                    "location": "Imperial Valley",
                    "severity": 5,
                    "operational_impact": "low"
                },
                {
                    "event_type": "drought",
                    "location": "imperial valley",
                    "severity": 9,
                    "operational_impact": "high"
                }
            ]
        });
        let (batch, _) = normalize_climate(&payload);
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].severity, 9);
    }

    #[test]
    fn test_normalize_market_happy_path() {
        let payload = json!({
            "timestamp": "2025-08-01T12:00:00Z",
            "agent_type": "veles_water_report",
            "report_date": "July 28, 2025",
            "water_market": {
                "nqh2o_index": {
                    "spot_price": 341.73,
                    "week_change_percent": -1.2,
                    "price_currency": "USD"
                },
                "futures": [
                    { "contract": "NQH2O Sep25", "price": 335.01, "spread_to_index": -6.72 }
                ],
                "locations": [
                    { "name": "Central Valley", "observed_price": 341.73 },
                    { "name": "Southern CA", "observed_price": 385.50 }
                ]
            },
            "reservoir_storage": [
                { "name": "Shasta", "capacity_percent": 62.0, "historical_percent": 98.0 }
            ],
            "key_insights": ["Spot index softened for a second week"]
        });
        let (snapshot, warnings) = normalize_market(&payload);
        assert!(warnings.is_empty());
        let snapshot = snapshot.unwrap();
        assert_eq!(snapshot.report_date, NaiveDate::from_ymd_opt(2025, 7, 28).unwrap());
        assert_eq!(snapshot.index.as_ref().unwrap().spot_price, 341.73);
        assert_eq!(snapshot.futures.len(), 1);
        assert_eq!(snapshot.locations.len(), 2);
        assert_eq!(snapshot.reservoirs.len(), 1);
        assert_eq!(snapshot.key_insights.len(), 1);
    }

    #[test]
    fn test_market_bad_location_dropped() {
        let payload = json!({
            "timestamp": "2025-08-01T12:00:00Z",
            "water_market": {
                "locations": [
                    { "name": "Central Valley", "observed_price": "not a number" },
                    { "name": "Southern CA", "observed_price": 385.50 }
                ]
            }
        });
        let (snapshot, warnings) = normalize_market(&payload);
        let snapshot = snapshot.unwrap();
        assert_eq!(snapshot.locations.len(), 1);
        assert_eq!(snapshot.locations[0].name, "Southern CA");
        assert!(warnings
            .iter()
            .any(|w| w.field == "water_market.locations.observed_price"));
    }

    #[test]
    fn test_normalize_price_series_sorted_and_deduped() {
        let payload = json!([{
            "instrument": "Central Valley",
            "points": [
                { "date": "2025-07-08", "price": 455.0 },
                { "date": "2025-07-01", "price": 450.0 },
                { "date": "2025-07-08", "price": 462.5 }
            ]
        }]);
        let (series, warnings) = normalize_price_series(&payload);
        assert!(warnings.is_empty());
        assert_eq!(series.len(), 1);
        let points = &series[0].points;
        assert_eq!(points.len(), 2);
        assert!(points[0].date < points[1].date);
        assert_eq!(points[1].price, 462.5);
    }

    #[test]
    fn test_price_series_pair_format() {
        let payload = json!({
            "instrument": "NQH2O",
            "points": [["2025-07-01", 348.2], ["2025-07-08", 341.73]]
        });
        let (series, warnings) = normalize_price_series(&payload);
        assert!(warnings.is_empty());
        assert_eq!(series[0].latest().unwrap().price, 341.73);
    }

    #[test]
    fn test_wrong_agent_type_warns_but_proceeds() {
        let payload = json!({
            "timestamp": "2025-08-01T12:00:00Z",
            "agent_type": "news_headlines",
            "events": []
        });
        let (batch, warnings) = normalize_climate(&payload);
        assert!(batch.events.is_empty());
        assert!(warnings.iter().any(|w| w.field == "agent_type"));
    }

    #[test]
    fn test_warning_display_names_source_kind() {
        let warning = NormalizationWarning::new(
            SourceKind::Climate,
            "severity",
            "out of range",
        );
        assert_eq!(warning.kind, SourceKind::Climate);
        assert_eq!(
            warning.to_string(),
            "climate payload: severity: out of range"
        );
    }
}
