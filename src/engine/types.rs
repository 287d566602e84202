use serde::{Deserialize, Serialize};

use crate::data::normalize::NormalizationWarning;
use crate::data::types::{ClimateEvent, SourceKind};

/// How much an opportunity should be trusted, gated by the presence of
/// supporting climate evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Lower the confidence to at most `ceiling`.
    pub fn cap(self, ceiling: Confidence) -> Confidence {
        self.min(ceiling)
    }
}

/// A directed price spread between two locations or between the spot index
/// and a futures contract, before risk adjustment.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadPair {
    pub buy: String,
    pub sell: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub raw_margin_percent: f64,
}

/// A ranked, risk-adjusted arbitrage candidate. Created fresh on every run,
/// never persisted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub buy: String,
    pub sell: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub raw_margin_percent: f64,
    pub risk_weight: f64,
    pub adjusted_margin_percent: f64,
    pub confidence: Confidence,
    pub supporting_events: Vec<ClimateEvent>,
    /// 1..N over the sorted run output; 0 means not yet ranked.
    pub rank: usize,
}

/// Non-fatal problems surfaced alongside the primary result. Nothing in
/// this taxonomy aborts a run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineWarning {
    #[error("{0}")]
    Validation(#[from] NormalizationWarning),

    #[error("{kind} source unavailable or stale; proceeding with degraded inputs")]
    DegradedInput { kind: SourceKind },
}
