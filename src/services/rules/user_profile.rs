use super::{AnalysisContext, Rule, RuleResult};
use crate::config::EngineConfig;
use crate::domain::{Finding, RiskProfile, RuleId, Transaction};

/// Operator-assigned risk profile of the cardholder.
pub struct UserRiskProfileRule;

impl Rule for UserRiskProfileRule {
    fn id(&self) -> RuleId {
        RuleId::UserRiskProfile
    }

    fn evaluate(&self, _tx: &Transaction, ctx: &AnalysisContext, config: &EngineConfig) -> RuleResult {
        let user = match &ctx.user {
            Some(u) => u,
            None => return Ok(None),
        };
        let w = config.weight(self.id());
        let factor = match user.risk_profile {
            RiskProfile::Normal => return Ok(None),
            RiskProfile::Watch => 0.5,
            RiskProfile::HighRisk => 1.0,
        };
        Ok(Some(Finding::new(
            self.id(),
            w * factor,
            factor,
            format!("user {} has risk profile {}", user.user_id, user.risk_profile),
        )))
    }
}
