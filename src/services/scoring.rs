//! Combines rule findings into one score and tier.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::finding::round_score;
use crate::domain::{Finding, RiskTier, RuleId, TierCutpoints};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedScore {
    pub fraud_score: f64,
    pub tier: RiskTier,
    /// Deduplicated, ordered by rule id.
    pub findings: Vec<Finding>,
}

impl AggregatedScore {
    pub fn rule_ids(&self) -> Vec<RuleId> {
        self.findings.iter().map(|f| f.rule_id).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScoreAggregator {
    cutpoints: TierCutpoints,
}

impl ScoreAggregator {
    pub fn new(cutpoints: TierCutpoints) -> Self {
        Self { cutpoints }
    }

    /// `1 - Π(1 - w)` over one finding per rule.
    ///
    /// The result does not depend on the order of `findings`, never decreases
    /// when a finding is added, and stays inside [0, 1].
    pub fn aggregate(&self, findings: Vec<Finding>) -> AggregatedScore {
        let mut strongest: BTreeMap<RuleId, Finding> = BTreeMap::new();
        for finding in findings {
            if finding.weight <= 0.0 {
                continue;
            }
            match strongest.get(&finding.rule_id) {
                Some(kept) if !outranks(&finding, kept) => {}
                _ => {
                    strongest.insert(finding.rule_id, finding);
                }
            }
        }

        let findings: Vec<Finding> = strongest.into_values().collect();
        let miss = findings
            .iter()
            .fold(1.0_f64, |acc, f| acc * (1.0 - f.weight.clamp(0.0, 1.0)));
        let fraud_score = round_score(1.0 - miss);

        AggregatedScore {
            fraud_score,
            tier: self.cutpoints.tier_for(fraud_score),
            findings,
        }
    }
}

fn outranks(candidate: &Finding, kept: &Finding) -> bool {
    candidate
        .weight
        .total_cmp(&kept.weight)
        .then_with(|| kept.reason.cmp(&candidate.reason))
        .is_gt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(rule: RuleId, weight: f64) -> Finding {
        Finding::new(rule, weight, 0.0, format!("{} fired", rule))
    }

    #[test]
    fn test_no_findings_is_zero_and_low() {
        let score = ScoreAggregator::default().aggregate(vec![]);
        assert_eq!(score.fraud_score, 0.0);
        assert_eq!(score.tier, RiskTier::Low);
        assert!(score.findings.is_empty());
    }

    #[test]
    fn test_weighted_union() {
        let score = ScoreAggregator::default().aggregate(vec![
            f(RuleId::Velocity, 0.4167),
            f(RuleId::AmountAnomaly, 0.6),
        ]);
        assert_eq!(score.fraud_score, 0.7667);
        assert_eq!(score.tier, RiskTier::High);
        assert_eq!(score.rule_ids(), vec![RuleId::Velocity, RuleId::AmountAnomaly]);
    }

    #[test]
    fn test_duplicate_rule_keeps_strongest() {
        let score = ScoreAggregator::default().aggregate(vec![
            f(RuleId::Velocity, 0.2),
            f(RuleId::Velocity, 0.5),
            f(RuleId::Velocity, 0.3),
        ]);
        assert_eq!(score.findings.len(), 1);
        assert_eq!(score.fraud_score, 0.5);
    }

    #[test]
    fn test_order_does_not_matter() {
        let findings = vec![
            f(RuleId::OffHours, 0.3),
            f(RuleId::MerchantRisk, 0.2),
            f(RuleId::ImpossibleTravel, 0.7),
            f(RuleId::NewEntity, 0.125),
        ];
        let aggregator = ScoreAggregator::default();
        let forward = aggregator.aggregate(findings.clone());
        let mut reversed = findings;
        reversed.reverse();
        assert_eq!(forward, aggregator.aggregate(reversed));
    }

    #[test]
    fn test_adding_a_finding_never_lowers_the_score() {
        let aggregator = ScoreAggregator::default();
        let mut findings = Vec::new();
        let mut last = 0.0;
        for (rule, weight) in [
            (RuleId::NewEntity, 0.25),
            (RuleId::OffHours, 0.3),
            (RuleId::Velocity, 0.5),
            (RuleId::ImpossibleTravel, 0.7),
            (RuleId::AmountAnomaly, 1.0),
        ] {
            findings.push(f(rule, weight));
            let score = aggregator.aggregate(findings.clone()).fraud_score;
            assert!(score >= last);
            assert!((0.0..=1.0).contains(&score));
            last = score;
        }
        assert_eq!(last, 1.0);
        assert_eq!(aggregator.aggregate(findings).tier, RiskTier::Critical);
    }

    #[test]
    fn test_custom_cutpoints() {
        let aggregator = ScoreAggregator::new(TierCutpoints::new([0.1, 0.2, 0.3]).unwrap());
        assert_eq!(aggregator.aggregate(vec![f(RuleId::OffHours, 0.25)]).tier, RiskTier::High);
    }
}
