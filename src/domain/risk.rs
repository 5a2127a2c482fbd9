//! Risk tiers and the cut points that map a fraud score onto them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Discrete risk bucket. Ordered by escalation, so `Low < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub const ALL: [RiskTier; 4] = [
        RiskTier::Low,
        RiskTier::Medium,
        RiskTier::High,
        RiskTier::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
            RiskTier::Critical => "CRITICAL",
        }
    }

    pub fn from_score(score: f64, cutpoints: &TierCutpoints) -> Self {
        cutpoints.tier_for(score)
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            RiskTier::Low => 0,
            RiskTier::Medium => 1,
            RiskTier::High => 2,
            RiskTier::Critical => 3,
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(RiskTier::Low),
            "MEDIUM" => Ok(RiskTier::Medium),
            "HIGH" => Ok(RiskTier::High),
            "CRITICAL" => Ok(RiskTier::Critical),
            other => Err(format!("unknown risk tier '{}'", other)),
        }
    }
}

/// Three strictly increasing cut points inside (0, 1).
///
/// A score below the first is `Low`, below the second `Medium`, below the
/// third `High`, anything else `Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 3]", into = "[f64; 3]")]
pub struct TierCutpoints([f64; 3]);

impl TierCutpoints {
    pub fn new(points: [f64; 3]) -> Result<Self, ConfigError> {
        if points.iter().any(|p| !p.is_finite() || *p <= 0.0 || *p >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "tier cut points must lie strictly between 0 and 1, got {:?}",
                points
            )));
        }
        if !(points[0] < points[1] && points[1] < points[2]) {
            return Err(ConfigError::Invalid(format!(
                "tier cut points must be strictly increasing, got {:?}",
                points
            )));
        }
        Ok(Self(points))
    }

    pub fn points(&self) -> [f64; 3] {
        self.0
    }

    /// Lower bound of the score range that maps to `tier`.
    pub fn lower_bound(&self, tier: RiskTier) -> f64 {
        match tier {
            RiskTier::Low => 0.0,
            other => self.0[other.index() - 1],
        }
    }

    pub fn tier_for(&self, score: f64) -> RiskTier {
        let [medium, high, critical] = self.0;
        if score >= critical {
            RiskTier::Critical
        } else if score >= high {
            RiskTier::High
        } else if score >= medium {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }
}

impl Default for TierCutpoints {
    fn default() -> Self {
        Self([0.3, 0.6, 0.85])
    }
}

impl TryFrom<[f64; 3]> for TierCutpoints {
    type Error = ConfigError;

    fn try_from(points: [f64; 3]) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<TierCutpoints> for [f64; 3] {
    fn from(cutpoints: TierCutpoints) -> Self {
        cutpoints.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cutpoints_map_scores() {
        let cuts = TierCutpoints::default();
        assert_eq!(cuts.tier_for(0.0), RiskTier::Low);
        assert_eq!(cuts.tier_for(0.2999), RiskTier::Low);
        assert_eq!(cuts.tier_for(0.3), RiskTier::Medium);
        assert_eq!(cuts.tier_for(0.6), RiskTier::High);
        assert_eq!(cuts.tier_for(0.8499), RiskTier::High);
        assert_eq!(cuts.tier_for(0.85), RiskTier::Critical);
        assert_eq!(cuts.tier_for(1.0), RiskTier::Critical);
    }

    #[test]
    fn test_tier_mapping_is_monotonic() {
        let cuts = TierCutpoints::new([0.2, 0.5, 0.9]).unwrap();
        let mut previous = RiskTier::Low;
        for step in 0..=1000 {
            let tier = cuts.tier_for(step as f64 / 1000.0);
            assert!(tier >= previous, "tier dropped at step {}", step);
            // contiguous: never skips a tier
            assert!(tier.index() <= previous.index() + 1);
            previous = tier;
        }
        assert_eq!(previous, RiskTier::Critical);
    }

    #[test]
    fn test_rejects_unordered_cutpoints() {
        assert!(TierCutpoints::new([0.6, 0.3, 0.85]).is_err());
        assert!(TierCutpoints::new([0.3, 0.3, 0.85]).is_err());
        assert!(TierCutpoints::new([0.0, 0.5, 0.85]).is_err());
        assert!(TierCutpoints::new([0.3, 0.5, 1.0]).is_err());
        assert!(TierCutpoints::new([0.3, f64::NAN, 0.9]).is_err());
    }

    #[test]
    fn test_cutpoints_deserialize_validates() {
        let ok: TierCutpoints = serde_json::from_str("[0.25, 0.5, 0.75]").unwrap();
        assert_eq!(ok.points(), [0.25, 0.5, 0.75]);
        assert!(serde_json::from_str::<TierCutpoints>("[0.75, 0.5, 0.25]").is_err());
    }

    #[test]
    fn test_lower_bounds() {
        let cuts = TierCutpoints::default();
        assert_eq!(cuts.lower_bound(RiskTier::Low), 0.0);
        assert_eq!(cuts.lower_bound(RiskTier::High), 0.6);
        assert_eq!(cuts.tier_for(cuts.lower_bound(RiskTier::Critical)), RiskTier::Critical);
    }

    #[test]
    fn test_tier_round_trips_through_str() {
        for tier in RiskTier::ALL {
            assert_eq!(tier.as_str().parse::<RiskTier>().unwrap(), tier);
        }
        assert!("SEVERE".parse::<RiskTier>().is_err());
    }
}
