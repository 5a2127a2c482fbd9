use super::{AnalysisContext, Rule, RuleResult};
use crate::config::EngineConfig;
use crate::domain::{Finding, MerchantRiskLevel, RuleId, Transaction};

pub struct MerchantRiskRule;

impl Rule for MerchantRiskRule {
    fn id(&self) -> RuleId {
        RuleId::MerchantRisk
    }

    fn evaluate(&self, _tx: &Transaction, ctx: &AnalysisContext, config: &EngineConfig) -> RuleResult {
        let merchant = match &ctx.merchant {
            Some(m) => m,
            None => return Ok(None),
        };
        let w = config.weight(self.id());
        let (weight, signal) = match merchant.risk_level {
            MerchantRiskLevel::Low => return Ok(None),
            MerchantRiskLevel::Medium => (w * config.merchant_medium_factor, 1.0),
            MerchantRiskLevel::High => (w, 2.0),
        };
        Ok(Some(Finding::new(
            self.id(),
            weight,
            signal,
            format!("merchant {} is rated {}", merchant.merchant_id, merchant.risk_level),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rules::fixtures::*;

    fn rated(level: MerchantRiskLevel) -> AnalysisContext {
        let mut ctx = context(vec![]);
        ctx.merchant = ctx.merchant.map(|m| m.with_risk_level(level));
        ctx
    }

    #[test]
    fn test_levels_map_to_weights() {
        let config = EngineConfig::default();
        let t = tx("t", "20", noon());
        assert!(MerchantRiskRule.evaluate(&t, &rated(MerchantRiskLevel::Low), &config).unwrap().is_none());
        let medium = MerchantRiskRule.evaluate(&t, &rated(MerchantRiskLevel::Medium), &config).unwrap().unwrap();
        assert_eq!(medium.weight, 0.2);
        let high = MerchantRiskRule.evaluate(&t, &rated(MerchantRiskLevel::High), &config).unwrap().unwrap();
        assert_eq!(high.weight, 0.4);
    }

    #[test]
    fn test_unknown_merchant_is_left_to_new_entity() {
        let finding = MerchantRiskRule
            .evaluate(&tx("t", "20", noon()), &AnalysisContext::default(), &EngineConfig::default())
            .unwrap();
        assert!(finding.is_none());
    }
}
