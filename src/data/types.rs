use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Which upstream collaborator a payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Climate,
    Market,
    PriceSeries,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Climate => write!(f, "climate"),
            SourceKind::Market => write!(f, "market"),
            SourceKind::PriceSeries => write!(f, "price_series"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Drought,
    Wildfire,
    Precipitation,
    WeatherPattern,
    Other,
}

impl EventType {
    /// Map the climate agent's free-form event labels onto our buckets.
    pub fn from_raw(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "drought" => EventType::Drought,
            "wildfire" | "fire" => EventType::Wildfire,
            "precipitation" | "flood" | "rain" | "snow" | "snowpack" => EventType::Precipitation,
            "weather_pattern" | "storm" | "heatwave" | "weather" => EventType::WeatherPattern,
            _ => EventType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationalImpact {
    Low,
    Medium,
    High,
}

impl OperationalImpact {
    pub fn from_raw(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "low" => Some(OperationalImpact::Low),
            "medium" => Some(OperationalImpact::Medium),
            "high" => Some(OperationalImpact::High),
            _ => None,
        }
    }
}

/// Ordered by urgency: `Immediate` is the most time-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeline {
    LongTerm,
    ShortTerm,
    Immediate,
}

impl Timeline {
    pub fn from_raw(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "immediate" => Some(Timeline::Immediate),
            "short_term" => Some(Timeline::ShortTerm),
            "long_term" => Some(Timeline::LongTerm),
            _ => None,
        }
    }
}

/// A single normalized climate event. Immutable after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub location: String,
    /// 1-10, clamped during normalization.
    pub severity: u8,
    pub operational_impact: OperationalImpact,
    pub timeline: Timeline,
    pub details: String,
    pub recommended_actions: Vec<String>,
}

/// Normalized climate batch: the events plus the agent's executive summary,
/// which is passed through opaquely to the narrative brief.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClimateBatch {
    pub events: Vec<ClimateEvent>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexQuote {
    pub spot_price: f64,
    pub week_change_percent: Option<f64>,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuturesQuote {
    pub contract: String,
    pub price: Option<f64>,
    pub spread_to_index: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationQuote {
    pub name: String,
    pub observed_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirLevel {
    pub name: String,
    pub capacity_percent: f64,
    pub historical_percent: Option<f64>,
}

/// One reporting period of the weekly water market report. Never mutated
/// after normalization, only superseded by a newer snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub timestamp: DateTime<Utc>,
    pub report_date: NaiveDate,
    pub index: Option<IndexQuote>,
    pub futures: Vec<FuturesQuote>,
    pub locations: Vec<LocationQuote>,
    pub reservoirs: Vec<ReservoirLevel>,
    pub weather_conditions: Option<serde_json::Value>,
    pub key_insights: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Historical price series for one instrument, ascending by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub instrument: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Most recent observation, if any.
    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }
}

/// Raw payloads as gathered from the three collaborators, before
/// normalization. A `None` batch means the source was unavailable this run.
#[derive(Debug, Clone, Default)]
pub struct SourceBatches {
    pub climate: Option<serde_json::Value>,
    pub market: Option<serde_json::Value>,
    pub price_series: Option<serde_json::Value>,
    /// Sources that failed, timed out, or were served stale from cache.
    pub degraded: Vec<SourceKind>,
}
