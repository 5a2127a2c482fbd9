//! Rule identifiers and the observations rules emit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    Velocity,
    AmountAnomaly,
    ImpossibleTravel,
    MerchantRisk,
    NewEntity,
    OffHours,
    LocationAnomaly,
    UserRiskProfile,
}

impl RuleId {
    pub const ALL: [RuleId; 8] = [
        RuleId::Velocity,
        RuleId::AmountAnomaly,
        RuleId::ImpossibleTravel,
        RuleId::MerchantRisk,
        RuleId::NewEntity,
        RuleId::OffHours,
        RuleId::LocationAnomaly,
        RuleId::UserRiskProfile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::Velocity => "velocity",
            RuleId::AmountAnomaly => "amount_anomaly",
            RuleId::ImpossibleTravel => "impossible_travel",
            RuleId::MerchantRisk => "merchant_risk",
            RuleId::NewEntity => "new_entity",
            RuleId::OffHours => "off_hours",
            RuleId::LocationAnomaly => "location_anomaly",
            RuleId::UserRiskProfile => "user_risk_profile",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        RuleId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| format!("unknown rule id '{}'", needle))
    }
}

/// Weights and scores are kept to four decimal places.
pub fn round_score(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}

/// A single rule's observation about a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: RuleId,
    pub reason: String,
    /// Contribution in [0, 1].
    pub weight: f64,
    /// Raw measurement behind the finding, kept for audit.
    pub signal: f64,
}

impl Finding {
    pub fn new(rule_id: RuleId, weight: f64, signal: f64, reason: impl Into<String>) -> Self {
        Self {
            rule_id,
            reason: reason.into(),
            weight: round_score(weight),
            signal,
        }
    }
}
